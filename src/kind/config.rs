/// kind cluster topology generation
use handlebars::Handlebars;
use serde::Serialize;

use crate::error::Result;

const KIND_CONFIG_TEMPLATE: &str = r#"kind: Cluster
apiVersion: kind.x-k8s.io/v1alpha4
name: {{name}}
nodes:
- role: control-plane
  kubeadmConfigPatches:
  - |
    kind: "ClusterConfiguration"
    apiServer:
      extraArgs:
        anonymous-auth: "true"
{{#if image}}
  image: "{{image}}"
{{/if}}
"#;

#[derive(Serialize)]
struct TemplateData<'a> {
    name: &'a str,
    image: Option<String>,
}

/// kind node image for a Kubernetes version, e.g. `1.27.3` -> `kindest/node:v1.27.3`
pub fn node_image(version: &str) -> String {
    format!("kindest/node:v{}", version.trim_start_matches('v'))
}

/// Render the `kind create cluster --config` document: one control-plane node with
/// anonymous authentication enabled, pinned to `kindest/node` when `version` is given.
pub fn render(cluster_name: &str, version: Option<&str>) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);

    let data = TemplateData {
        name: cluster_name,
        image: version.map(node_image),
    };

    Ok(handlebars.render_template(KIND_CONFIG_TEMPLATE, &data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_version() {
        let rendered = render("ci-east", None).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();

        assert_eq!(doc["kind"], "Cluster");
        assert_eq!(doc["apiVersion"], "kind.x-k8s.io/v1alpha4");
        assert_eq!(doc["name"], "ci-east");

        let nodes = doc["nodes"].as_sequence().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["role"], "control-plane");
        assert!(nodes[0].get("image").is_none());
    }

    #[test]
    fn test_render_with_version() {
        let rendered = render("west", Some("1.27.3")).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();

        assert_eq!(doc["nodes"][0]["image"], "kindest/node:v1.27.3");
    }

    #[test]
    fn test_anonymous_auth_patch() {
        let rendered = render("west", None).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();

        let patch = doc["nodes"][0]["kubeadmConfigPatches"][0].as_str().unwrap();
        let patch: serde_yaml::Value = serde_yaml::from_str(patch).unwrap();
        assert_eq!(patch["kind"], "ClusterConfiguration");
        assert_eq!(patch["apiServer"]["extraArgs"]["anonymous-auth"], "true");
    }

    #[test]
    fn test_node_image_does_not_double_prefix() {
        assert_eq!(node_image("v1.28.0"), "kindest/node:v1.28.0");
        assert_eq!(node_image("1.28.0"), "kindest/node:v1.28.0");
    }
}
