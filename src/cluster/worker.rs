/// Cluster hosting Primaza agents in tenant namespaces
use std::sync::Arc;
use tracing::{debug, info};

use super::agent::AgentRole;
use super::make::{run_step, MakeCommand};
use super::namespace::TenantNamespace;
use super::ProvisionedCluster;
use crate::config::{BuildConfig, ImageRefs};
use crate::error::Result;
use crate::kind::ClusterProvisioner;
use crate::utils::scoped::ScopedFile;

/// Which agent images have been loaded into the cluster.
///
/// Flags are only ever set, after a successful load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerState {
    pub agentapp_loaded: bool,
    pub agentsvc_loaded: bool,
}

impl WorkerState {
    fn loaded(&self, role: AgentRole) -> bool {
        match role {
            AgentRole::Application => self.agentapp_loaded,
            AgentRole::Service => self.agentsvc_loaded,
        }
    }

    fn mark_loaded(&mut self, role: AgentRole) {
        match role {
            AgentRole::Application => self.agentapp_loaded = true,
            AgentRole::Service => self.agentsvc_loaded = true,
        }
    }
}

/// A provisioned cluster whose namespaces host the application and service agents
pub struct WorkerCluster<P> {
    provisioner: P,
    images: Arc<ImageRefs>,
    build: Arc<BuildConfig>,
    identity: String,
    state: WorkerState,
}

impl<P: ClusterProvisioner> ProvisionedCluster for WorkerCluster<P> {
    type Provisioner = P;

    fn provisioner(&self) -> &P {
        &self.provisioner
    }
}

impl<P: ClusterProvisioner> WorkerCluster<P> {
    pub fn new(
        provisioner: P,
        images: Arc<ImageRefs>,
        build: Arc<BuildConfig>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            provisioner,
            images,
            build,
            identity: identity.into(),
            state: WorkerState::default(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Load the Application Agent image, once per cluster
    pub async fn configure_application_cluster(&mut self) -> Result<()> {
        self.ensure_image_loaded(AgentRole::Application).await
    }

    /// Load the Service Agent image, once per cluster
    pub async fn configure_service_cluster(&mut self) -> Result<()> {
        self.ensure_image_loaded(AgentRole::Service).await
    }

    /// Create a namespace for applications; `kubeconfig` lets its agent reach Primaza
    pub async fn create_application_namespace(
        &mut self,
        namespace: &str,
        tenant: &str,
        cluster_environment: &str,
        kubeconfig: &str,
    ) -> Result<()> {
        self.configure_application_cluster().await?;
        self.create_namespace(
            AgentRole::Application,
            namespace,
            tenant,
            cluster_environment,
            kubeconfig,
        )
        .await
    }

    /// Create a namespace for services; `kubeconfig` lets its agent reach Primaza
    pub async fn create_service_namespace(
        &mut self,
        namespace: &str,
        tenant: &str,
        cluster_environment: &str,
        kubeconfig: &str,
    ) -> Result<()> {
        self.configure_service_cluster().await?;
        self.create_namespace(
            AgentRole::Service,
            namespace,
            tenant,
            cluster_environment,
            kubeconfig,
        )
        .await
    }

    /// Deploy the Service Agent into a namespace of this cluster
    pub async fn deploy_agentsvc(&mut self, namespace: &str) -> Result<()> {
        self.deploy_agent(AgentRole::Service, namespace).await
    }

    /// Deploy the Application Agent into a namespace of this cluster
    pub async fn deploy_agentapp(&mut self, namespace: &str) -> Result<()> {
        self.deploy_agent(AgentRole::Application, namespace).await
    }

    async fn ensure_image_loaded(&mut self, role: AgentRole) -> Result<()> {
        if self.state.loaded(role) {
            debug!(
                "{} image already loaded into cluster {}",
                role,
                self.cluster_name()
            );
            return Ok(());
        }

        let image = role.image(&self.images).to_string();
        self.provisioner.load_image(&image).await?;

        self.state.mark_loaded(role);
        Ok(())
    }

    async fn create_namespace(
        &self,
        role: AgentRole,
        namespace: &str,
        tenant: &str,
        cluster_environment: &str,
        primaza_kubeconfig: &str,
    ) -> Result<()> {
        info!(
            "Creating {} namespace {} in cluster {}...",
            role,
            namespace,
            self.cluster_name()
        );

        let kubeconfig = self.provisioner.kubeconfig(false).await?;
        let kubeconfig = ScopedFile::kubeconfig(self.cluster_name(), &kubeconfig)?;

        TenantNamespace {
            namespace,
            tenant,
            cluster_environment,
            role,
            primaza_kubeconfig,
            identity: &self.identity,
        }
        .apply(
            self.provisioner.executor(),
            self.cluster_name(),
            kubeconfig.path(),
        )
        .await
    }

    async fn deploy_agent(&mut self, role: AgentRole, namespace: &str) -> Result<()> {
        info!(
            "Deploying {} into namespace {} of cluster {}...",
            role,
            namespace,
            self.cluster_name()
        );

        let image = role.image(&self.images).to_string();
        let kubeconfig = self.provisioner.kubeconfig(false).await?;
        let kubeconfig = ScopedFile::kubeconfig(self.cluster_name(), &kubeconfig)?;

        run_step(
            self.provisioner.executor(),
            self.cluster_name(),
            &format!("installing manifests for the {}", role),
            &MakeCommand::new(&self.build, kubeconfig.path())
                .with_image(&[role.make_target(), "install"], &image),
        )
        .await?;

        self.ensure_image_loaded(role).await?;

        run_step(
            self.provisioner.executor(),
            self.cluster_name(),
            &format!("deploying the {} controller", role),
            &MakeCommand::new(&self.build, kubeconfig.path()).deploy(
                &[role.make_target(), "deploy"],
                &image,
                namespace,
            ),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use crate::kind::KindProvisioner;
    use crate::utils::testing::ScriptedExecutor;

    fn worker(executor: &ScriptedExecutor) -> WorkerCluster<KindProvisioner<ScriptedExecutor>> {
        let images = ImageRefs {
            controller: "ctrl:dev".into(),
            agentapp: "app:dev".into(),
            agentsvc: "svc:dev".into(),
        };
        let build = BuildConfig {
            home: Some("/home/dev".into()),
            user: Some("dev".into()),
            ..BuildConfig::default()
        };
        WorkerCluster::new(
            KindProvisioner::new("ci-worker", None, executor.clone()),
            Arc::new(images),
            Arc::new(build),
            "primaza",
        )
    }

    #[tokio::test]
    async fn test_configure_application_cluster_loads_once() {
        let executor = ScriptedExecutor::kind();
        let mut worker = worker(&executor);

        worker.configure_application_cluster().await.unwrap();
        worker.configure_application_cluster().await.unwrap();

        assert_eq!(executor.count("kind load docker-image app:dev"), 1);
        assert_eq!(
            worker.state(),
            WorkerState {
                agentapp_loaded: true,
                agentsvc_loaded: false,
            }
        );
    }

    #[tokio::test]
    async fn test_roles_tracked_independently() {
        let executor = ScriptedExecutor::kind();
        let mut worker = worker(&executor);

        worker.configure_service_cluster().await.unwrap();
        worker.configure_application_cluster().await.unwrap();
        worker.configure_service_cluster().await.unwrap();

        assert_eq!(executor.count("kind load docker-image svc:dev"), 1);
        assert_eq!(executor.count("kind load docker-image app:dev"), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_next_time() {
        let executor = ScriptedExecutor::kind();
        executor.respond("kind load docker-image", 1, "");
        let mut worker = worker(&executor);

        let err = worker.configure_service_cluster().await.unwrap_err();
        assert!(matches!(err, HarnessError::ImageLoad { .. }));
        assert!(!worker.state().agentsvc_loaded);

        executor.respond("kind load docker-image", 0, "");
        worker.configure_service_cluster().await.unwrap();
        assert_eq!(executor.count("kind load docker-image svc:dev"), 2);
    }

    #[tokio::test]
    async fn test_deploy_agentapp_twice_loads_image_once() {
        let executor = ScriptedExecutor::kind();
        let mut worker = worker(&executor);

        worker.deploy_agentapp("tenant-a").await.unwrap();
        worker.deploy_agentapp("tenant-b").await.unwrap();

        assert_eq!(
            executor.command_lines(),
            vec![
                "kind get kubeconfig --name ci-worker",
                "make agentapp install",
                "kind load docker-image app:dev --name ci-worker",
                "make agentapp deploy",
                "kind get kubeconfig --name ci-worker",
                "make agentapp install",
                "make agentapp deploy",
            ]
        );

        let calls = executor.calls();
        assert_eq!(calls[3].command.get_env("NAMESPACE"), Some("tenant-a"));
        assert_eq!(calls[6].command.get_env("NAMESPACE"), Some("tenant-b"));
    }

    #[tokio::test]
    async fn test_worker_deploy_has_no_host_identity() {
        let executor = ScriptedExecutor::kind();
        let mut worker = worker(&executor);

        worker.deploy_agentsvc("services").await.unwrap();

        for call in executor.calls().iter().filter(|c| c.command.program() == "make") {
            assert_eq!(call.command.get_env("HOME"), None);
            assert_eq!(call.command.get_env("USER"), None);
            assert_eq!(call.command.get_env("IMG"), Some("svc:dev"));
        }
    }

    #[tokio::test]
    async fn test_deploy_failure_stops_workflow() {
        let executor = ScriptedExecutor::kind();
        executor.respond("agentsvc install", 1, "");
        let mut worker = worker(&executor);

        let err = worker.deploy_agentsvc("services").await.unwrap_err();

        assert!(err.to_string().contains("ci-worker"));
        assert_eq!(executor.count("kind load"), 0);
        assert_eq!(executor.count("agentsvc deploy"), 0);
        assert!(!worker.state().agentsvc_loaded);
    }

    #[tokio::test]
    async fn test_create_application_namespace() {
        let executor = ScriptedExecutor::kind();
        let mut worker = worker(&executor);

        worker
            .create_application_namespace("applications", "acme", "dev", "primaza-kubeconfig")
            .await
            .unwrap();
        worker
            .create_application_namespace("applications-2", "acme", "dev", "primaza-kubeconfig")
            .await
            .unwrap();

        assert_eq!(executor.count("kind load docker-image app:dev"), 1);
        assert_eq!(executor.count("kubectl apply -f"), 2);

        let apply = executor
            .calls()
            .into_iter()
            .find(|c| c.command.program() == "kubectl")
            .unwrap();
        let manifest = &apply.command.get_args()[2];
        assert!(manifest.contains("manifest-applications-"));
        assert!(!std::path::Path::new(manifest).exists());
        assert!(apply.kubeconfig.unwrap().contains("kind-east"));
    }

    #[tokio::test]
    async fn test_namespace_failure_names_cluster() {
        let executor = ScriptedExecutor::kind();
        executor.respond("kubectl apply", 1, "forbidden");
        let mut worker = worker(&executor);

        let err = worker
            .create_service_namespace("services", "acme", "dev", "primaza-kubeconfig")
            .await
            .unwrap_err();

        assert_eq!(err.cluster(), Some("ci-worker"));
        assert!(worker.state().agentsvc_loaded);
    }
}
