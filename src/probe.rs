//! Manual connectivity check: does a plain HTTPS client on this host go through the proxy?
//!
//! Not used by the capture pipeline; run `agent-battler-probe` from a shell that has the proxy
//! variables exported (or with the proxy running) and compare the capture log.
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::proxy::{PROXY_ENV_VARS, TLS_BYPASS_VAR};

pub const DEFAULT_PROBE_URL: &str = "https://api.github.com/";

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub url: String,
    /// Accept any server certificate (the proxy re-signs upstream certificates).
    pub insecure: bool,
    /// Extra root to trust, typically the proxy CA.
    pub ca_cert: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROBE_URL.to_string(),
            insecure: false,
            ca_cert: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

/// Proxy-related variables as seen by this process, in display order. Unset ones are `None`.
pub fn proxy_env_snapshot() -> Vec<(&'static str, Option<String>)> {
    PROXY_ENV_VARS
        .iter()
        .copied()
        .chain(std::iter::once(TLS_BYPASS_VAR))
        .map(|k| (k, std::env::var(k).ok()))
        .collect()
}

fn build_client(opts: &ProbeOptions) -> Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::Client::builder()
        .timeout(opts.timeout)
        .user_agent(concat!("agent-battler-probe/", env!("CARGO_PKG_VERSION")));
    if opts.insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(path) = &opts.ca_cert {
        let pem = fs::read(path).with_context(|| format!("read CA certificate {}", path.display()))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .with_context(|| format!("parse CA certificate {}", path.display()))?;
        builder = builder.add_root_certificate(cert);
    }
    builder.build().context("build HTTP client")
}

/// One GET against `opts.url`. The client picks up `HTTP(S)_PROXY` from the environment.
pub fn run_probe(opts: &ProbeOptions) -> Result<ProbeReport> {
    let client = build_client(opts)?;
    let resp = client
        .get(&opts.url)
        .send()
        .with_context(|| format!("GET {}", opts.url))?;
    let headers = resp
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect();
    Ok(ProbeReport {
        status: resp.status().as_u16(),
        headers,
    })
}
