/// primaza-kind - kind clusters for Primaza acceptance tests
///
/// Creates kind clusters and deploys the Primaza controller and agents into them.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use primaza_kind::cluster::AgentRole;
use primaza_kind::utils::command::{check_tool_installed, SystemExecutor};
use primaza_kind::config::KindConfig;
use primaza_kind::{
    ClusterProvider, ClusterProvisioner, HarnessConfig, KindProvider, KindProvisioner,
};

#[derive(Parser)]
#[command(name = "primaza-kind")]
#[command(about = "Provision kind clusters and deploy Primaza into them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (image references may also come from the environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prefix prepended to every cluster name
    #[arg(short, long)]
    prefix: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate example configuration file
    Init {
        #[arg(default_value = "primaza-kind.yaml")]
        path: PathBuf,
    },

    /// Create a kind cluster and wait for its nodes
    Create {
        name: String,

        /// Kubernetes version of the kindest/node image
        #[arg(long)]
        kubernetes_version: Option<String>,
    },

    /// Delete a kind cluster
    Delete { name: String },

    /// Print a cluster's kubeconfig
    Kubeconfig {
        name: String,

        /// Use the address reachable from other kind clusters
        #[arg(long)]
        internal: bool,
    },

    /// Print the control-plane address on the kind network
    Ip { name: String },

    /// Install cert-manager and the Primaza controller
    InstallPrimaza { name: String },

    /// Deploy an agent into a namespace
    DeployAgent {
        name: String,

        #[arg(long, value_enum)]
        agent: AgentArg,

        #[arg(long)]
        namespace: String,

        /// Role the target cluster plays
        #[arg(long, value_enum, default_value = "worker")]
        on: ClusterRoleArg,
    },

    /// Create a tenant namespace in a worker cluster
    CreateNamespace {
        name: String,

        #[arg(long, value_enum)]
        agent: AgentArg,

        #[arg(long)]
        namespace: String,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        environment: String,

        /// Kubeconfig file the agent uses to reach the Primaza cluster
        #[arg(long)]
        primaza_kubeconfig: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AgentArg {
    Application,
    Service,
}

#[derive(Clone, Copy, ValueEnum)]
enum ClusterRoleArg {
    Primaza,
    Worker,
}

impl From<AgentArg> for AgentRole {
    fn from(arg: AgentArg) -> Self {
        match arg {
            AgentArg::Application => AgentRole::Application,
            AgentArg::Service => AgentRole::Service,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("primaza_kind={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(&cli).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load configuration and execute the requested command
async fn run(cli: &Cli) -> Result<()> {
    let command = &cli.command;
    if let Commands::Init { path } = command {
        return init_config(path).await;
    }

    let mut config =
        HarnessConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(prefix) = &cli.prefix {
        config.kind.prefix = Some(prefix.clone());
    }

    check_prerequisites(command).await?;

    match command {
        Commands::Create { .. }
        | Commands::Delete { .. }
        | Commands::Kubeconfig { .. }
        | Commands::Ip { .. } => run_lifecycle(command, &config.kind).await,
        _ => {
            config.validate().context("Invalid configuration")?;
            run_deploy(command, &KindProvider::from_config(&config)?).await
        }
    }
}

/// Cluster lifecycle commands, which only need the kind options
async fn run_lifecycle(command: &Commands, kind: &KindConfig) -> Result<()> {
    kind.validate().context("Invalid configuration")?;
    let provisioner = |name: &str, version: Option<&String>| {
        KindProvisioner::new(kind.cluster_name(name), version.cloned(), SystemExecutor)
    };

    match command {
        Commands::Create {
            name,
            kubernetes_version,
        } => {
            let provisioner = provisioner(name, kubernetes_version.as_ref());
            let output = provisioner
                .start(Duration::from_secs(kind.start_timeout_secs))
                .await?;
            if !output.success() {
                anyhow::bail!(
                    "error creating kind cluster {}:\n{}",
                    provisioner.cluster_name(),
                    output.combined()
                );
            }
        }
        Commands::Delete { name } => {
            let provisioner = provisioner(name, None);
            let output = provisioner.delete().await?;
            if !output.success() {
                anyhow::bail!(
                    "error deleting kind cluster {}:\n{}",
                    provisioner.cluster_name(),
                    output.combined()
                );
            }
            info!("✓ Cluster {} deleted", provisioner.cluster_name());
        }
        Commands::Kubeconfig { name, internal } => {
            let kubeconfig = provisioner(name, None).kubeconfig(*internal).await?;
            print!("{}", kubeconfig);
        }
        Commands::Ip { name } => {
            println!("{}", provisioner(name, None).ipaddress().await?);
        }
        _ => {}
    }

    Ok(())
}

/// Primaza and agent deployment commands, which need every image reference
async fn run_deploy(command: &Commands, provider: &KindProvider) -> Result<()> {
    match command {
        Commands::InstallPrimaza { name } => {
            provider.build_primaza_cluster(name, None).install_primaza().await?;
        }
        Commands::DeployAgent {
            name,
            agent,
            namespace,
            on,
        } => match (*on, AgentRole::from(*agent)) {
            (ClusterRoleArg::Primaza, AgentRole::Application) => {
                provider.build_primaza_cluster(name, None).deploy_agentapp(namespace).await?
            }
            (ClusterRoleArg::Primaza, AgentRole::Service) => {
                provider.build_primaza_cluster(name, None).deploy_agentsvc(namespace).await?
            }
            (ClusterRoleArg::Worker, AgentRole::Application) => {
                provider.build_worker_cluster(name, None).deploy_agentapp(namespace).await?
            }
            (ClusterRoleArg::Worker, AgentRole::Service) => {
                provider.build_worker_cluster(name, None).deploy_agentsvc(namespace).await?
            }
        },
        Commands::CreateNamespace {
            name,
            agent,
            namespace,
            tenant,
            environment,
            primaza_kubeconfig,
        } => {
            let kubeconfig = tokio::fs::read_to_string(primaza_kubeconfig)
                .await
                .with_context(|| {
                    format!("Failed to read {}", primaza_kubeconfig.display())
                })?;

            let mut worker = provider.build_worker_cluster(name, None);
            match AgentRole::from(*agent) {
                AgentRole::Application => {
                    worker
                        .create_application_namespace(namespace, tenant, environment, &kubeconfig)
                        .await?
                }
                AgentRole::Service => {
                    worker
                        .create_service_namespace(namespace, tenant, environment, &kubeconfig)
                        .await?
                }
            }
        }
        _ => {}
    }

    Ok(())
}

/// Check that the tools a command shells out to are installed
async fn check_prerequisites(command: &Commands) -> Result<()> {
    let executor = SystemExecutor;

    check_tool_installed(&executor, "kind", &["version"], "https://kind.sigs.k8s.io/")
        .await
        .context("kind is required")?;

    if matches!(command, Commands::Create { .. } | Commands::CreateNamespace { .. }) {
        check_tool_installed(
            &executor,
            "kubectl",
            &["version", "--client"],
            "https://kubernetes.io/docs/tasks/tools/",
        )
        .await
        .context("kubectl is required")?;
    }

    if matches!(command, Commands::Ip { .. } | Commands::Kubeconfig { internal: true, .. }) {
        check_tool_installed(
            &executor,
            "docker",
            &["version"],
            "https://docs.docker.com/get-docker/",
        )
        .await
        .context("docker is required")?;
    }

    if matches!(
        command,
        Commands::InstallPrimaza { .. } | Commands::DeployAgent { .. }
    ) {
        check_tool_installed(
            &executor,
            "make",
            &["--version"],
            "https://www.gnu.org/software/make/",
        )
        .await
        .context("make is required")?;
    }

    Ok(())
}

/// Initialize example configuration file
async fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Configuration file already exists: {}", path.display());
    }

    let example_config = HarnessConfig::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(path, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", path.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit the image references to match the images you built");
    info!("  2. Create the clusters:");
    info!("     primaza-kind --config {} create main", path.display());
    info!("     primaza-kind --config {} create worker", path.display());
    info!("  3. Install Primaza:");
    info!("     primaza-kind --config {} install-primaza main", path.display());

    Ok(())
}
