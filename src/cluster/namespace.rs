/// Tenant namespace setup in worker clusters
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::agent::{AgentRole, ResourcePermissions};
use super::make::run_step;
use crate::error::Result;
use crate::utils::command::{CommandBuilder, Executor};
use crate::utils::scoped::ScopedFile;

pub const TENANT_LABEL: &str = "primaza.io/tenant";
pub const CLUSTER_ENVIRONMENT_LABEL: &str = "primaza.io/cluster-environment";
pub const KUBECONFIG_SECRET: &str = "primaza-kubeconfig";

/// A namespace Primaza manages one agent in
#[derive(Debug, Clone)]
pub struct TenantNamespace<'a> {
    pub namespace: &'a str,
    pub tenant: &'a str,
    pub cluster_environment: &'a str,
    pub role: AgentRole,
    /// Kubeconfig the agent uses to reach the Primaza cluster
    pub primaza_kubeconfig: &'a str,
    /// User Primaza authenticates as in this cluster
    pub identity: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct List {
    api_version: &'static str,
    kind: &'static str,
    items: Vec<Resource>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Resource {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    type_: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rules: Option<Vec<PolicyRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role_ref: Option<RoleRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subjects: Option<Vec<Subject>>,
}

#[derive(Serialize)]
struct Metadata {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyRule {
    api_groups: Vec<&'static str>,
    resources: Vec<&'static str>,
    verbs: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    resource_names: Vec<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleRef {
    api_group: &'static str,
    kind: &'static str,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Subject {
    api_group: &'static str,
    kind: &'static str,
    name: String,
}

impl From<&ResourcePermissions> for PolicyRule {
    fn from(permissions: &ResourcePermissions) -> Self {
        Self {
            api_groups: vec![permissions.group],
            resources: vec![permissions.resource],
            verbs: permissions.verbs.clone(),
            resource_names: permissions.name.into_iter().collect(),
        }
    }
}

impl Resource {
    fn new(api_version: &'static str, kind: &'static str, metadata: Metadata) -> Self {
        Self {
            api_version,
            kind,
            metadata,
            type_: None,
            data: None,
            rules: None,
            role_ref: None,
            subjects: None,
        }
    }
}

impl TenantNamespace<'_> {
    /// Name of the Role and RoleBinding granting Primaza access to the namespace
    pub fn role_name(&self) -> String {
        format!("primaza-{}", self.role.make_target())
    }

    fn namespaced(&self, name: String) -> Metadata {
        Metadata {
            name,
            namespace: Some(self.namespace.to_string()),
            labels: BTreeMap::new(),
        }
    }

    /// Manifest list creating the namespace, the kubeconfig Secret and Primaza's RBAC
    pub fn render(&self) -> Result<String> {
        let mut labels = BTreeMap::new();
        labels.insert(TENANT_LABEL.to_string(), self.tenant.to_string());
        labels.insert(
            CLUSTER_ENVIRONMENT_LABEL.to_string(),
            self.cluster_environment.to_string(),
        );

        let namespace = Resource::new(
            "v1",
            "Namespace",
            Metadata {
                name: self.namespace.to_string(),
                namespace: None,
                labels,
            },
        );

        let mut secret = Resource::new(
            "v1",
            "Secret",
            self.namespaced(KUBECONFIG_SECRET.to_string()),
        );
        secret.type_ = Some("Opaque");
        secret.data = Some(BTreeMap::from([(
            "kubeconfig".to_string(),
            STANDARD.encode(self.primaza_kubeconfig),
        )]));

        let mut role = Resource::new(
            "rbac.authorization.k8s.io/v1",
            "Role",
            self.namespaced(self.role_name()),
        );
        role.rules = Some(
            self.role
                .required_permissions()
                .iter()
                .map(PolicyRule::from)
                .collect(),
        );

        let mut binding = Resource::new(
            "rbac.authorization.k8s.io/v1",
            "RoleBinding",
            self.namespaced(self.role_name()),
        );
        binding.role_ref = Some(RoleRef {
            api_group: "rbac.authorization.k8s.io",
            kind: "Role",
            name: self.role_name(),
        });
        binding.subjects = Some(vec![Subject {
            api_group: "rbac.authorization.k8s.io",
            kind: "User",
            name: self.identity.to_string(),
        }]);

        let list = List {
            api_version: "v1",
            kind: "List",
            items: vec![namespace, secret, role, binding],
        };

        Ok(serde_yaml::to_string(&list)?)
    }

    /// Apply the rendered manifests with `kubectl` against the cluster at `kubeconfig`
    pub async fn apply<E: Executor + ?Sized>(
        &self,
        executor: &E,
        cluster: &str,
        kubeconfig: &Path,
    ) -> Result<()> {
        let manifest = ScopedFile::write(
            &format!("manifest-{}-", self.namespace),
            &self.render()?,
        )?;

        let command = CommandBuilder::new("kubectl")
            .args(["apply", "-f"])
            .arg(manifest.path().to_string_lossy())
            .kubeconfig(kubeconfig);

        run_step(
            executor,
            cluster,
            &format!("creating {} namespace {}", self.role, self.namespace),
            &command,
        )
        .await
    }
}
