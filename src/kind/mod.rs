/// kind cluster provisioning
pub mod config;
pub mod kubeconfig;
pub mod provisioner;

pub use provisioner::{ClusterProvisioner, KindProvisioner};
