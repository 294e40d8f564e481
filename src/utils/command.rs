/// Command execution utilities shared by the kind, docker and make steps
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Result from command execution with captured output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was terminated by a signal
    pub status: Option<i32>,
}

impl CommandOutput {
    /// Create from process output
    pub fn from_output(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        if self.stdout.is_empty() {
            return self.stderr.clone();
        }
        format!("{}\n{}", self.stdout.trim_end(), self.stderr)
    }

    /// Return stdout if successful, otherwise a `StepFailed` error for `cluster`
    pub fn into_result(self, cluster: &str, step: &str) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(HarnessError::StepFailed {
                cluster: cluster.to_string(),
                step: step.to_string(),
                status: self.status,
                output: self.combined(),
            })
        }
    }
}

/// Description of an external command: program, arguments and an environment overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    context_msg: Option<String>,
}

impl CommandBuilder {
    /// Create a new command builder
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            context_msg: None,
        }
    }

    /// Add a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable, replacing an earlier value for the same key
    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        let key = key.into();
        let val = val.into();
        match self.envs.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = val,
            None => self.envs.push((key, val)),
        }
        self
    }

    /// Set KUBECONFIG environment variable
    pub fn kubeconfig(self, path: &Path) -> Self {
        self.env("KUBECONFIG", path.to_string_lossy())
    }

    /// Set context message for error reporting
    pub fn context(mut self, msg: impl Into<String>) -> Self {
        self.context_msg = Some(msg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Value of an overlaid environment variable
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Execute with the given executor and return raw output
    pub async fn output<E: Executor + ?Sized>(&self, executor: &E) -> Result<CommandOutput> {
        executor.execute(self).await
    }
}

impl fmt::Display for CommandBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, val) in &self.envs {
            write!(f, "{}={} ", key, val)?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs external commands.
///
/// A non-zero exit status is reported through [`CommandOutput::status`], never as an
/// error. Errors are reserved for commands that could not be started at all.
#[allow(async_fn_in_trait)]
pub trait Executor {
    async fn execute(&self, command: &CommandBuilder) -> Result<CommandOutput>;
}

/// Executor spawning real processes with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    async fn execute(&self, command: &CommandBuilder) -> Result<CommandOutput> {
        debug!("Running: {}", command);

        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| HarnessError::Spawn {
                program: command
                    .context_msg
                    .clone()
                    .unwrap_or_else(|| command.program.clone()),
                source,
            })?;

        Ok(CommandOutput::from_output(output))
    }
}

/// Check if a command-line tool is installed
pub async fn check_tool_installed<E: Executor>(
    executor: &E,
    tool_name: &str,
    version_args: &[&str],
    install_url: &str,
) -> Result<()> {
    let output = CommandBuilder::new(tool_name)
        .args(version_args.iter().copied())
        .output(executor)
        .await;

    match output {
        Ok(out) if out.success() => Ok(()),
        _ => Err(HarnessError::Config(format!(
            "{} is not installed or not in PATH. Please install from {}",
            tool_name, install_url
        ))),
    }
}
