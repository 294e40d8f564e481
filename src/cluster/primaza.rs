/// Cluster hosting the Primaza controller
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::agent::AgentRole;
use super::make::{run_step, MakeCommand};
use super::ProvisionedCluster;
use crate::config::{BuildConfig, ImageRefs};
use crate::error::Result;
use crate::kind::ClusterProvisioner;
use crate::utils::scoped::ScopedFile;

/// Namespace the Primaza controller is deployed into
pub const PRIMAZA_NAMESPACE: &str = "primaza-system";

/// A provisioned cluster running the Primaza controller and, optionally, its agents
pub struct PrimazaCluster<P> {
    provisioner: P,
    images: Arc<ImageRefs>,
    build: Arc<BuildConfig>,
}

impl<P: ClusterProvisioner> ProvisionedCluster for PrimazaCluster<P> {
    type Provisioner = P;

    fn provisioner(&self) -> &P {
        &self.provisioner
    }
}

impl<P: ClusterProvisioner> PrimazaCluster<P> {
    pub fn new(provisioner: P, images: Arc<ImageRefs>, build: Arc<BuildConfig>) -> Self {
        Self {
            provisioner,
            images,
            build,
        }
    }

    /// Install cert-manager, load the controller image and deploy the controller
    pub async fn install_primaza(&self) -> Result<()> {
        info!("Installing Primaza into cluster {}...", self.cluster_name());

        let kubeconfig = self.provisioner.kubeconfig(false).await?;
        let kubeconfig = ScopedFile::kubeconfig(self.cluster_name(), &kubeconfig)?;

        self.install_dependencies(kubeconfig.path()).await?;
        self.provisioner.load_image(&self.images.controller).await?;
        self.deploy_controller(kubeconfig.path()).await?;

        info!("✓ Primaza installed into cluster {}", self.cluster_name());
        Ok(())
    }

    /// Deploy the Service Agent into a namespace of this cluster
    pub async fn deploy_agentsvc(&self, namespace: &str) -> Result<()> {
        self.deploy_agent(AgentRole::Service, namespace).await
    }

    /// Deploy the Application Agent into a namespace of this cluster
    pub async fn deploy_agentapp(&self, namespace: &str) -> Result<()> {
        self.deploy_agent(AgentRole::Application, namespace).await
    }

    async fn deploy_agent(&self, role: AgentRole, namespace: &str) -> Result<()> {
        info!(
            "Deploying {} into namespace {} of cluster {}...",
            role,
            namespace,
            self.cluster_name()
        );

        let image = role.image(&self.images);
        let kubeconfig = self.provisioner.kubeconfig(false).await?;
        let kubeconfig = ScopedFile::kubeconfig(self.cluster_name(), &kubeconfig)?;
        let make = self.make(kubeconfig.path());
        let executor = self.provisioner.executor();

        run_step(
            executor,
            self.cluster_name(),
            &format!("installing manifests for the {}", role),
            &make.with_image(&[role.make_target(), "install"], image),
        )
        .await?;

        self.provisioner.load_image(image).await?;

        run_step(
            executor,
            self.cluster_name(),
            &format!("deploying the {} controller", role),
            &make.deploy(&[role.make_target(), "deploy"], image, namespace),
        )
        .await
    }

    async fn install_dependencies(&self, kubeconfig: &Path) -> Result<()> {
        run_step(
            self.provisioner.executor(),
            self.cluster_name(),
            "installing dependencies",
            &self.make(kubeconfig).bare(&["deploy-cert-manager"]),
        )
        .await
    }

    async fn deploy_controller(&self, kubeconfig: &Path) -> Result<()> {
        run_step(
            self.provisioner.executor(),
            self.cluster_name(),
            "deploying Primaza's controller",
            &self.make(kubeconfig).deploy(
                &["primaza", "deploy"],
                &self.images.controller,
                PRIMAZA_NAMESPACE,
            ),
        )
        .await
    }

    fn make<'a>(&'a self, kubeconfig: &'a Path) -> MakeCommand<'a> {
        MakeCommand::new(&self.build, kubeconfig).with_host_identity()
    }
}
