/// Lifecycle of a single kind cluster
use std::time::Duration;
use tracing::{info, warn};

use super::{config, kubeconfig};
use crate::error::{HarnessError, Result};
use crate::utils::command::{CommandBuilder, CommandOutput, Executor};
use crate::utils::scoped::ScopedFile;

const IP_ADDRESS_FORMAT: &str = "{{.NetworkSettings.Networks.kind.IPAddress}}";

/// Lifecycle operations for one named cluster.
///
/// Implementations are bound to a single cluster identity at construction and every
/// operation targets only that cluster.
#[allow(async_fn_in_trait)]
pub trait ClusterProvisioner {
    type Executor: Executor;

    fn cluster_name(&self) -> &str;

    fn version(&self) -> Option<&str>;

    /// Executor used for this cluster's commands
    fn executor(&self) -> &Self::Executor;

    /// Create the cluster and wait up to `timeout` for its nodes to be Ready.
    /// A non-zero status in the returned output signals failure.
    async fn start(&self, timeout: Duration) -> Result<CommandOutput>;

    async fn delete(&self) -> Result<CommandOutput>;

    /// Kubeconfig for host access, or for access from other clusters when `internal`
    async fn kubeconfig(&self, internal: bool) -> Result<String>;

    /// Address of the control-plane node on the cluster network
    async fn ipaddress(&self) -> Result<String>;

    /// Make a local container image available to the cluster nodes
    async fn load_image(&self, image: &str) -> Result<()>;
}

/// kind-backed cluster provisioner
#[derive(Debug, Clone)]
pub struct KindProvisioner<E> {
    cluster_name: String,
    version: Option<String>,
    executor: E,
}

impl<E: Executor> KindProvisioner<E> {
    pub fn new(cluster_name: impl Into<String>, version: Option<String>, executor: E) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            version,
            executor,
        }
    }

    /// Name of the control-plane container kind creates for this cluster
    pub fn control_plane_container(&self) -> String {
        format!("{}-control-plane", self.cluster_name)
    }

    /// kubectl context kind registers for this cluster
    pub fn context_name(&self) -> String {
        format!("kind-{}", self.cluster_name)
    }

    async fn exec(&self, command: CommandBuilder) -> Result<CommandOutput> {
        let output = command.output(&self.executor).await?;
        let text = output.combined();
        if !text.trim().is_empty() {
            info!("{}", text.trim_end());
        }
        Ok(output)
    }
}

impl<E: Executor> ClusterProvisioner for KindProvisioner<E> {
    type Executor = E;

    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn executor(&self) -> &E {
        &self.executor
    }

    async fn start(&self, timeout: Duration) -> Result<CommandOutput> {
        info!("Creating kind cluster {}...", self.cluster_name);

        let kind_config = config::render(&self.cluster_name, self.version.as_deref())?;
        info!("{}", kind_config);

        let config_file =
            ScopedFile::write(&format!("kind-config-{}-", self.cluster_name), &kind_config)?;

        let created = self
            .exec(
                CommandBuilder::new("kind")
                    .args(["create", "cluster", "--config"])
                    .arg(config_file.path().to_string_lossy()),
            )
            .await?;

        if !created.success() {
            warn!("kind create cluster {} failed", self.cluster_name);
            return Ok(created);
        }

        let ready = self
            .exec(
                CommandBuilder::new("kubectl")
                    .args(["wait", "--context"])
                    .arg(self.context_name())
                    .args(["--for", "condition=Ready", "nodes", "--all"])
                    .arg(format!("--timeout={}s", timeout.as_secs())),
            )
            .await?;

        if ready.success() {
            info!("✓ Cluster {} is ready", self.cluster_name);
        }

        Ok(CommandOutput {
            stdout: format!("{}{}", created.stdout, ready.stdout),
            stderr: format!("{}{}", created.stderr, ready.stderr),
            status: ready.status,
        })
    }

    async fn delete(&self) -> Result<CommandOutput> {
        info!("Deleting kind cluster {}...", self.cluster_name);

        self.exec(
            CommandBuilder::new("kind")
                .args(["delete", "cluster", "--name"])
                .arg(&self.cluster_name),
        )
        .await
    }

    async fn kubeconfig(&self, internal: bool) -> Result<String> {
        let kubeconfig = CommandBuilder::new("kind")
            .args(["get", "kubeconfig", "--name"])
            .arg(&self.cluster_name)
            .output(&self.executor)
            .await?
            .into_result(&self.cluster_name, "retrieving kubeconfig")?;

        if !internal {
            return Ok(kubeconfig);
        }

        let address = self.ipaddress().await?;
        Ok(kubeconfig::to_internal(&kubeconfig, &address))
    }

    async fn ipaddress(&self) -> Result<String> {
        let address = CommandBuilder::new("docker")
            .args(["container", "inspect"])
            .arg(self.control_plane_container())
            .args(["--format", IP_ADDRESS_FORMAT])
            .output(&self.executor)
            .await?
            .into_result(&self.cluster_name, "retrieving internal IP address")?;

        Ok(address.trim().to_string())
    }

    async fn load_image(&self, image: &str) -> Result<()> {
        info!("Loading image {} into kind cluster {}", image, self.cluster_name);

        let output = self
            .exec(
                CommandBuilder::new("kind")
                    .args(["load", "docker-image", image, "--name"])
                    .arg(&self.cluster_name),
            )
            .await?;

        if !output.success() {
            return Err(HarnessError::ImageLoad {
                image: image.to_string(),
                cluster: self.cluster_name.clone(),
                output: output.combined(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::{ScriptedExecutor, KIND_KUBECONFIG};

    #[tokio::test]
    async fn test_start_creates_then_waits() {
        let executor = ScriptedExecutor::new();
        let provisioner = KindProvisioner::new("ci-east", Some("1.27.3".into()), executor.clone());

        let output = provisioner.start(Duration::from_secs(600)).await.unwrap();
        assert!(output.success());

        let lines = executor.command_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("kind create cluster --config "));
        assert!(lines[0].contains("kind-config-ci-east-"));
        assert_eq!(
            lines[1],
            "kubectl wait --context kind-ci-east --for condition=Ready nodes --all --timeout=600s"
        );

        let config_path = executor.calls()[0].command.get_args()[3].clone();
        assert!(!std::path::Path::new(&config_path).exists());
    }

    #[tokio::test]
    async fn test_start_failure_skips_wait() {
        let executor = ScriptedExecutor::new();
        executor.respond("kind create cluster", 1, "node(s) already exist");
        let provisioner = KindProvisioner::new("east", None, executor.clone());

        let output = provisioner.start(Duration::from_secs(60)).await.unwrap();
        assert_eq!(output.status, Some(1));
        assert_eq!(executor.count("kubectl wait"), 0);
    }

    #[tokio::test]
    async fn test_wait_timeout_is_reported() {
        let executor = ScriptedExecutor::new();
        executor.respond("kubectl wait", 1, "timed out waiting for the condition");
        let provisioner = KindProvisioner::new("east", None, executor.clone());

        let output = provisioner.start(Duration::from_secs(1)).await.unwrap();
        assert!(!output.success());
        assert!(output.stdout.contains("timed out"));
    }

    #[tokio::test]
    async fn test_delete_surfaces_status() {
        let executor = ScriptedExecutor::new();
        executor.respond("kind delete cluster", 2, "");
        let provisioner = KindProvisioner::new("east", None, executor.clone());

        let output = provisioner.delete().await.unwrap();
        assert_eq!(output.status, Some(2));
        assert_eq!(executor.command_lines(), vec!["kind delete cluster --name east"]);
    }

    #[tokio::test]
    async fn test_external_kubeconfig_passthrough() {
        let executor = ScriptedExecutor::kind();
        let provisioner = KindProvisioner::new("east", None, executor.clone());

        let kubeconfig = provisioner.kubeconfig(false).await.unwrap();
        assert_eq!(kubeconfig, KIND_KUBECONFIG);
        assert_eq!(executor.count("docker"), 0);
    }

    #[tokio::test]
    async fn test_internal_kubeconfig_has_no_loopback() {
        let executor = ScriptedExecutor::kind();
        let provisioner = KindProvisioner::new("east", None, executor.clone());

        let kubeconfig = provisioner.kubeconfig(true).await.unwrap();
        assert!(!kubeconfig.contains("127.0.0.1"));
        assert!(kubeconfig.contains("server: https://172.18.0.2:6443"));
        assert_eq!(
            executor.command_lines()[1],
            format!(
                "docker container inspect east-control-plane --format {}",
                IP_ADDRESS_FORMAT
            )
        );
    }

    #[tokio::test]
    async fn test_kubeconfig_failure_names_cluster() {
        let executor = ScriptedExecutor::new();
        executor.respond("kind get kubeconfig", 1, "");
        let provisioner = KindProvisioner::new("ci-west", None, executor);

        let err = provisioner.kubeconfig(false).await.unwrap_err();
        assert!(matches!(err, HarnessError::StepFailed { .. }));
        assert!(err.to_string().contains("ci-west"));
    }

    #[tokio::test]
    async fn test_load_image_failure_names_image() {
        let executor = ScriptedExecutor::new();
        executor.respond("kind load docker-image", 1, "image not present locally");
        let provisioner = KindProvisioner::new("east", None, executor);

        let err = provisioner.load_image("agentapp:dev").await.unwrap_err();
        match err {
            HarnessError::ImageLoad { image, cluster, .. } => {
                assert_eq!(image, "agentapp:dev");
                assert_eq!(cluster, "east");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
