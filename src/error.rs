/// Error types for cluster provisioning and deployment steps
use thiserror::Error;

/// Errors raised by provisioning and deployment workflows
#[derive(Debug, Error)]
pub enum HarnessError {
    /// An external command exited with a non-zero status
    #[error("error {step} for cluster '{cluster}' (exit status {})\n{output}", display_status(.status))]
    StepFailed {
        cluster: String,
        step: String,
        status: Option<i32>,
        output: String,
    },

    /// `kind load docker-image` failed
    #[error("error loading image {image} into kind cluster {cluster}\n{output}")]
    ImageLoad {
        image: String,
        cluster: String,
        output: String,
    },

    /// A required environment variable is not set
    #[error("required environment variable {0} is not set")]
    MissingEnv(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to render template: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl HarnessError {
    /// Name of the cluster the failure refers to, if any
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Self::StepFailed { cluster, .. } | Self::ImageLoad { cluster, .. } => Some(cluster),
            _ => None,
        }
    }
}

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "killed by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_names_cluster() {
        let err = HarnessError::StepFailed {
            cluster: "ci-east".to_string(),
            step: "installing dependencies".to_string(),
            status: Some(1),
            output: "boom".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("ci-east"));
        assert!(msg.contains("installing dependencies"));
        assert!(msg.contains("exit status 1"));
        assert_eq!(err.cluster(), Some("ci-east"));
    }

    #[test]
    fn test_image_load_names_image() {
        let err = HarnessError::ImageLoad {
            image: "ghcr.io/primaza/agentapp:latest".to_string(),
            cluster: "worker".to_string(),
            output: String::new(),
        };

        assert!(err
            .to_string()
            .starts_with("error loading image ghcr.io/primaza/agentapp:latest"));
    }
}
