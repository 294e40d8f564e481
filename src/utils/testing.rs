/// In-memory executor used by unit tests to script command results
use std::sync::{Arc, Mutex};

use super::command::{CommandBuilder, CommandOutput, Executor};
use crate::error::Result;

pub const KIND_KUBECONFIG: &str = "apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: LS0tLS1CRUdJTg==
    server: https://127.0.0.1:39417
  name: kind-east
contexts:
- context:
    cluster: kind-east
    user: kind-east
  name: kind-east
current-context: kind-east
kind: Config
preferences: {}
users:
- name: kind-east
  user:
    client-certificate-data: LS0tLS1CRUdJTg==
";

/// A command seen by the executor
#[derive(Debug, Clone)]
pub struct Recorded {
    pub command: CommandBuilder,
    /// Contents of the file referenced by `KUBECONFIG` at execution time
    pub kubeconfig: Option<String>,
}

struct Rule {
    needle: String,
    output: CommandOutput,
}

#[derive(Default)]
struct Inner {
    rules: Vec<Rule>,
    calls: Vec<Recorded>,
}

/// Executor returning scripted results; unmatched commands succeed with empty output
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor preloaded with the answers a healthy kind installation gives
    pub fn kind() -> Self {
        let executor = Self::new();
        executor.respond("kind get kubeconfig", 0, KIND_KUBECONFIG);
        executor.respond("docker container inspect", 0, "172.18.0.2\n");
        executor
    }

    /// Commands whose rendered line contains `needle` return `status` and `stdout`.
    /// Rules added later take precedence.
    pub fn respond(&self, needle: &str, status: i32, stdout: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.rules.insert(
            0,
            Rule {
                needle: needle.to_string(),
                output: CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    status: Some(status),
                },
            },
        );
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| {
                let mut line = call.command.program().to_string();
                for arg in call.command.get_args() {
                    line.push(' ');
                    line.push_str(arg);
                }
                line
            })
            .collect()
    }

    /// Number of executed commands whose program and arguments contain `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl Executor for ScriptedExecutor {
    async fn execute(&self, command: &CommandBuilder) -> Result<CommandOutput> {
        let kubeconfig = command
            .get_env("KUBECONFIG")
            .and_then(|path| std::fs::read_to_string(path).ok());

        let mut inner = self.inner.lock().unwrap();
        let line = command.to_string();
        let output = inner
            .rules
            .iter()
            .find(|rule| line.contains(&rule.needle))
            .map(|rule| rule.output.clone())
            .unwrap_or(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                status: Some(0),
            });

        inner.calls.push(Recorded {
            command: command.clone(),
            kubeconfig,
        });

        Ok(output)
    }
}
