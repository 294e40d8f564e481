/// Kubeconfig endpoint rewriting for cluster-to-cluster access
use url::{Host, Url};

/// API server port inside the kind control-plane container
pub const INTERNAL_API_PORT: u16 = 6443;

const LOOPBACK: std::net::Ipv4Addr = std::net::Ipv4Addr::LOCALHOST;

/// Rewrite loopback `server:` entries to the control-plane container address.
///
/// kind publishes the API server on `https://127.0.0.1:<random port>`, which is only
/// reachable from the host. Other clusters on the `kind` docker network must use
/// `https://<container ip>:6443` instead. Lines that are not a loopback server entry are
/// left untouched.
pub fn to_internal(kubeconfig: &str, address: &str) -> String {
    let mut rewritten = String::with_capacity(kubeconfig.len());

    for line in kubeconfig.split_inclusive('\n') {
        let (content, newline) = match line.strip_suffix('\n') {
            Some(content) => (content, "\n"),
            None => (line, ""),
        };

        match rewrite_server_line(content, address) {
            Some(new_line) => {
                rewritten.push_str(&new_line);
                rewritten.push_str(newline);
            }
            None => rewritten.push_str(line),
        }
    }

    rewritten
}

fn rewrite_server_line(line: &str, address: &str) -> Option<String> {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, rest) = line.split_at(indent_len);
    let server = rest.strip_prefix("server:")?.trim();

    let url = Url::parse(server).ok()?;
    if url.scheme() != "https" || url.host() != Some(Host::Ipv4(LOOPBACK)) {
        return None;
    }
    if url.path() != "/" || url.query().is_some() {
        return None;
    }

    Some(format!(
        "{}server: https://{}:{}",
        indent,
        address.trim(),
        INTERNAL_API_PORT
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::KIND_KUBECONFIG;

    #[test]
    fn test_rewrites_loopback_server() {
        let internal = to_internal(KIND_KUBECONFIG, "172.18.0.2");

        assert!(!internal.contains("127.0.0.1"));
        assert!(internal.contains("    server: https://172.18.0.2:6443\n"));
    }

    #[test]
    fn test_other_lines_untouched() {
        let internal = to_internal(KIND_KUBECONFIG, "172.18.0.2");

        let original: Vec<&str> = KIND_KUBECONFIG.lines().collect();
        let rewritten: Vec<&str> = internal.lines().collect();
        assert_eq!(original.len(), rewritten.len());

        for (before, after) in original.iter().zip(rewritten.iter()) {
            if !before.contains("server:") {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_non_loopback_server_kept() {
        let config = "clusters:\n- cluster:\n    server: https://10.0.0.1:6443\n";
        assert_eq!(to_internal(config, "172.18.0.2"), config);
    }

    #[test]
    fn test_every_loopback_entry_rewritten() {
        let config = concat!(
            "- cluster:\n    server: https://127.0.0.1:1111\n",
            "- cluster:\n    server: https://127.0.0.1:2222",
        );
        let internal = to_internal(config, "172.18.0.3\n");

        assert_eq!(
            internal,
            concat!(
                "- cluster:\n    server: https://172.18.0.3:6443\n",
                "- cluster:\n    server: https://172.18.0.3:6443",
            )
        );
    }
}
