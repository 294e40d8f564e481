/// `make` invocations used to install and deploy Primaza components
use std::path::Path;
use tracing::info;

use crate::config::BuildConfig;
use crate::error::{HarnessError, Result};
use crate::utils::command::{CommandBuilder, Executor};

/// Builds `make` commands sharing a kubeconfig and the build-cache environment
#[derive(Debug, Clone, Copy)]
pub struct MakeCommand<'a> {
    build: &'a BuildConfig,
    kubeconfig: &'a Path,
    host_identity: bool,
}

impl<'a> MakeCommand<'a> {
    pub fn new(build: &'a BuildConfig, kubeconfig: &'a Path) -> Self {
        Self {
            build,
            kubeconfig,
            host_identity: false,
        }
    }

    /// Also pass `HOME` and `USER`, which the controller build needs
    pub fn with_host_identity(mut self) -> Self {
        self.host_identity = true;
        self
    }

    /// `make <targets>` with only `KUBECONFIG` set
    pub fn bare(&self, targets: &[&str]) -> CommandBuilder {
        CommandBuilder::new("make")
            .args(targets.iter().copied())
            .kubeconfig(self.kubeconfig)
    }

    /// `make <targets>` with the full build environment and `IMG=<image>`
    pub fn with_image(&self, targets: &[&str], image: &str) -> CommandBuilder {
        let mut command = CommandBuilder::new("make").args(targets.iter().copied());

        if self.host_identity {
            if let Some(home) = &self.build.home {
                command = command.env("HOME", home);
            }
            if let Some(user) = &self.build.user {
                command = command.env("USER", user);
            }
        }

        command
            .kubeconfig(self.kubeconfig)
            .env("GOCACHE", &self.build.gocache)
            .env("GOPATH", &self.build.gopath)
            .env("IMG", image)
    }

    /// Like [`with_image`](Self::with_image), deploying into `namespace`
    pub fn deploy(&self, targets: &[&str], image: &str, namespace: &str) -> CommandBuilder {
        self.with_image(targets, image).env("NAMESPACE", namespace)
    }
}

/// Run one workflow step, logging its output and failing on a non-zero exit status
pub async fn run_step<E: Executor + ?Sized>(
    executor: &E,
    cluster: &str,
    step: &str,
    command: &CommandBuilder,
) -> Result<()> {
    info!("[{}] {}: {}", cluster, step, command);

    let output = command.output(executor).await?;
    let text = output.combined();
    if !text.trim().is_empty() {
        info!("{}", text.trim_end());
    }

    if !output.success() {
        return Err(HarnessError::StepFailed {
            cluster: cluster.to_string(),
            step: step.to_string(),
            status: output.status,
            output: text,
        });
    }

    Ok(())
}
