/// Configuration management for the Primaza kind harness
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HarnessError, Result};

pub const CONTROLLER_IMAGE_ENV: &str = "PRIMAZA_CONTROLLER_IMAGE_REF";
pub const AGENTAPP_IMAGE_ENV: &str = "PRIMAZA_AGENTAPP_IMAGE_REF";
pub const AGENTSVC_IMAGE_ENV: &str = "PRIMAZA_AGENTSVC_IMAGE_REF";

/// Main harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Container images deployed into the clusters
    #[serde(default)]
    pub images: ImageConfig,

    /// Environment handed to `make`
    #[serde(default)]
    pub build: BuildConfig,

    /// kind cluster options
    #[serde(default)]
    pub kind: KindConfig,
}

/// Container image references.
///
/// All three are required; they can be set in the file or through
/// `PRIMAZA_CONTROLLER_IMAGE_REF`, `PRIMAZA_AGENTAPP_IMAGE_REF` and `PRIMAZA_AGENTSVC_IMAGE_REF`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agentapp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agentsvc: Option<String>,
}

/// Build-tool environment (`GOCACHE`, `GOPATH`, `HOME`, `USER`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_gocache")]
    pub gocache: String,

    #[serde(default = "default_gopath")]
    pub gopath: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// kind cluster options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindConfig {
    /// Prefix prepended to every cluster name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Seconds `kubectl wait` allows nodes to become Ready
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,

    /// User Primaza authenticates as inside tenant namespaces
    #[serde(default = "default_identity")]
    pub primaza_identity: String,
}

/// Image references after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRefs {
    pub controller: String,
    pub agentapp: String,
    pub agentsvc: String,
}

fn default_gocache() -> String {
    "/tmp/gocache".to_string()
}

fn default_gopath() -> String {
    "/tmp/go".to_string()
}

fn default_start_timeout() -> u64 {
    600
}

fn default_identity() -> String {
    "primaza".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            gocache: default_gocache(),
            gopath: default_gopath(),
            home: None,
            user: None,
        }
    }
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            start_timeout_secs: default_start_timeout(),
            primaza_identity: default_identity(),
        }
    }
}

impl KindConfig {
    /// Name of the kind cluster backing `name`
    pub fn cluster_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        }
    }

    /// Validate the kind options
    pub fn validate(&self) -> Result<()> {
        if self.start_timeout_secs == 0 {
            return Err(HarnessError::Config(
                "kind.start_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.primaza_identity.is_empty() {
            return Err(HarnessError::Config(
                "kind.primaza_identity cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HarnessConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the optional file, overlay the process environment and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::resolve(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the optional file and overlay the process environment, without requiring
    /// image references. Enough for cluster lifecycle commands, which never deploy.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env(|key| std::env::var(key).ok()))
    }

    /// Fill unset values from `lookup`.
    ///
    /// Image references and the kind prefix set in the file win over the environment;
    /// `GOCACHE` and `GOPATH` from the environment override the defaults.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        self.images.controller = self.images.controller.or_else(|| non_empty(CONTROLLER_IMAGE_ENV));
        self.images.agentapp = self.images.agentapp.or_else(|| non_empty(AGENTAPP_IMAGE_ENV));
        self.images.agentsvc = self.images.agentsvc.or_else(|| non_empty(AGENTSVC_IMAGE_ENV));

        if let Some(gocache) = non_empty("GOCACHE") {
            self.build.gocache = gocache;
        }
        if let Some(gopath) = non_empty("GOPATH") {
            self.build.gopath = gopath;
        }
        self.build.home = self.build.home.or_else(|| lookup("HOME"));
        self.build.user = self.build.user.or_else(|| lookup("USER"));

        self.kind.prefix = self.kind.prefix.or_else(|| non_empty("CLUSTER_PREFIX"));
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.image_refs()?;
        self.kind.validate()
    }

    /// The three image references, failing on the first one missing
    pub fn image_refs(&self) -> Result<ImageRefs> {
        let require = |value: &Option<String>, env: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| HarnessError::MissingEnv(env.to_string()))
        };

        Ok(ImageRefs {
            controller: require(&self.images.controller, CONTROLLER_IMAGE_ENV)?,
            agentapp: require(&self.images.agentapp, AGENTAPP_IMAGE_ENV)?,
            agentsvc: require(&self.images.agentsvc, AGENTSVC_IMAGE_ENV)?,
        })
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            images: ImageConfig {
                controller: Some("primaza-controller:latest".to_string()),
                agentapp: Some("primaza-agentapp:latest".to_string()),
                agentsvc: Some("primaza-agentsvc:latest".to_string()),
            },
            build: BuildConfig::default(),
            kind: KindConfig {
                prefix: Some("ci-".to_string()),
                ..KindConfig::default()
            },
        }
    }
}
