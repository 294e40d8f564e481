/// Role-specific clusters and the provider that builds them
pub mod agent;
pub mod make;
pub mod namespace;
pub mod primaza;
pub mod worker;

use std::sync::Arc;
use tracing::debug;

use crate::config::{BuildConfig, HarnessConfig, ImageRefs, KindConfig};
use crate::error::Result;
use crate::kind::{ClusterProvisioner, KindProvisioner};
use crate::utils::command::{Executor, SystemExecutor};

pub use agent::AgentRole;
pub use primaza::PrimazaCluster;
pub use worker::{WorkerCluster, WorkerState};

/// A role-specific cluster backed by a provisioner
pub trait ProvisionedCluster {
    type Provisioner: ClusterProvisioner;

    fn provisioner(&self) -> &Self::Provisioner;

    fn cluster_name(&self) -> &str {
        self.provisioner().cluster_name()
    }
}

/// Builds Primaza and worker clusters on a provisioning backend
#[allow(async_fn_in_trait)]
pub trait ClusterProvider {
    type Provisioner: ClusterProvisioner;

    fn build_primaza_cluster(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> PrimazaCluster<Self::Provisioner>;

    fn build_worker_cluster(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> WorkerCluster<Self::Provisioner>;

    /// Make the two clusters reachable from each other
    async fn join_networks<C1, C2>(&self, cluster1: &C1, cluster2: &C2) -> Result<()>
    where
        C1: ProvisionedCluster<Provisioner = Self::Provisioner>,
        C2: ProvisionedCluster<Provisioner = Self::Provisioner>;
}

/// Provider creating kind clusters, optionally sharing a name prefix
pub struct KindProvider<E = SystemExecutor> {
    kind: KindConfig,
    images: Arc<ImageRefs>,
    build: Arc<BuildConfig>,
    executor: E,
}

impl KindProvider<SystemExecutor> {
    /// Provider spawning real processes, configured from `config`
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Self::with_executor(config, SystemExecutor)
    }
}

impl<E: Executor + Clone> KindProvider<E> {
    /// Image references are resolved here so a missing one fails before any cluster work
    pub fn with_executor(config: &HarnessConfig, executor: E) -> Result<Self> {
        Ok(Self {
            kind: config.kind.clone(),
            images: Arc::new(config.image_refs()?),
            build: Arc::new(config.build.clone()),
            executor,
        })
    }

    /// Name of the kind cluster backing `name`
    pub fn cluster_name(&self, name: &str) -> String {
        self.kind.cluster_name(name)
    }

    fn provisioner(&self, name: &str, version: Option<&str>) -> KindProvisioner<E> {
        KindProvisioner::new(
            self.cluster_name(name),
            version.map(str::to_string),
            self.executor.clone(),
        )
    }
}

impl<E: Executor + Clone> ClusterProvider for KindProvider<E> {
    type Provisioner = KindProvisioner<E>;

    fn build_primaza_cluster(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> PrimazaCluster<Self::Provisioner> {
        PrimazaCluster::new(
            self.provisioner(name, version),
            self.images.clone(),
            self.build.clone(),
        )
    }

    fn build_worker_cluster(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> WorkerCluster<Self::Provisioner> {
        WorkerCluster::new(
            self.provisioner(name, version),
            self.images.clone(),
            self.build.clone(),
            self.kind.primaza_identity.clone(),
        )
    }

    /// kind clusters share the `kind` docker network, so they can always communicate
    async fn join_networks<C1, C2>(&self, cluster1: &C1, cluster2: &C2) -> Result<()>
    where
        C1: ProvisionedCluster<Provisioner = Self::Provisioner>,
        C2: ProvisionedCluster<Provisioner = Self::Provisioner>,
    {
        debug!(
            "Clusters {} and {} already share the kind network",
            cluster1.cluster_name(),
            cluster2.cluster_name()
        );
        Ok(())
    }
}
