/// Primaza agent roles
use std::fmt;

use crate::config::ImageRefs;

/// The two agents Primaza runs in worker cluster namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    /// Application agent, binds services into application namespaces
    Application,
    /// Service agent, discovers services in service namespaces
    Service,
}

/// A set of verbs allowed on one resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePermissions {
    pub verbs: Vec<&'static str>,
    pub group: &'static str,
    pub version: &'static str,
    pub resource: &'static str,
    /// Restricts the permission to a single named resource
    pub name: Option<&'static str>,
}

impl AgentRole {
    /// Name of the make target building and deploying this agent
    pub fn make_target(self) -> &'static str {
        match self {
            Self::Application => "agentapp",
            Self::Service => "agentsvc",
        }
    }

    /// Name of the agent's Deployment
    pub fn deployment_name(self) -> &'static str {
        match self {
            Self::Application => "primaza-app-agent",
            Self::Service => "primaza-svc-agent",
        }
    }

    pub fn image(self, images: &ImageRefs) -> &str {
        match self {
            Self::Application => &images.agentapp,
            Self::Service => &images.agentsvc,
        }
    }

    /// Permissions Primaza needs in a tenant namespace to manage this agent
    pub fn required_permissions(self) -> Vec<ResourcePermissions> {
        vec![
            ResourcePermissions {
                verbs: vec!["create"],
                group: "apps",
                version: "",
                resource: "deployments",
                name: None,
            },
            ResourcePermissions {
                verbs: vec!["delete"],
                group: "apps",
                version: "",
                resource: "deployments",
                name: Some(self.deployment_name()),
            },
        ]
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => write!(f, "application agent"),
            Self::Service => write!(f, "service agent"),
        }
    }
}
