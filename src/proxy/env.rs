//! Proxy environment handed to proxied child processes.
use std::collections::BTreeMap;

use super::ProxyConfig;

// Proxy environment variable names we export (both spellings; tools disagree on case).
pub const PROXY_ENV_VARS: &[&str] = &["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"];

/// Node's switch for certificate verification; only exported on explicit opt-in.
pub const TLS_BYPASS_VAR: &str = "NODE_TLS_REJECT_UNAUTHORIZED";

/// Extra trusted roots for Node children.
pub const NODE_EXTRA_CA_VAR: &str = "NODE_EXTRA_CA_CERTS";

pub fn proxy_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Environment for a child routed through the proxy described by `cfg`. Pure: depends only on
/// the configuration, never on the current process environment.
pub fn proxy_env(cfg: &ProxyConfig) -> BTreeMap<String, String> {
    let url = proxy_url(cfg.port);
    let mut env: BTreeMap<String, String> = PROXY_ENV_VARS
        .iter()
        .map(|k| (k.to_string(), url.clone()))
        .collect();
    if cfg.insecure_child_tls {
        env.insert(TLS_BYPASS_VAR.to_string(), "0".to_string());
    }
    if let Some(ca) = &cfg.ca_cert {
        env.insert(NODE_EXTRA_CA_VAR.to_string(), ca.display().to_string());
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_env_default_port_all_spellings() {
        let cfg = ProxyConfig::new("log.json", "addon.py");
        let env = proxy_env(&cfg);
        for k in PROXY_ENV_VARS {
            assert_eq!(env.get(*k).map(String::as_str), Some("http://localhost:8080"));
        }
        assert!(!env.contains_key(TLS_BYPASS_VAR));
        assert_eq!(env.len(), 4);
    }

    #[test]
    fn test_tls_bypass_is_opt_in() {
        let mut cfg = ProxyConfig::new("log.json", "addon.py");
        cfg.insecure_child_tls = true;
        let env = proxy_env(&cfg);
        assert_eq!(env.get(TLS_BYPASS_VAR).map(String::as_str), Some("0"));
    }

    #[test]
    fn test_ca_cert_exported() {
        let mut cfg = ProxyConfig::new("log.json", "addon.py");
        cfg.ca_cert = Some("/home/u/.mitmproxy/mitmproxy-ca-cert.pem".into());
        let env = proxy_env(&cfg);
        assert_eq!(
            env.get(NODE_EXTRA_CA_VAR).map(String::as_str),
            Some("/home/u/.mitmproxy/mitmproxy-ca-cert.pem")
        );
    }
}
