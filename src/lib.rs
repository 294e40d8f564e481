/// Primaza kind harness
///
/// Provisions local Kubernetes clusters with kind and deploys the Primaza controller
/// and its application and service agents into them through `make`.
pub mod cluster;
pub mod config;
pub mod error;
pub mod kind;
pub mod utils;

pub use cluster::{
    ClusterProvider, KindProvider, PrimazaCluster, ProvisionedCluster, WorkerCluster,
};
pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use kind::{ClusterProvisioner, KindProvisioner};
