#![allow(clippy::module_name_repetitions)]
//! Node preload shim: retrofit proxy awareness into Node CLIs that ignore `HTTP(S)_PROXY`.
//!
//! The bootstrap installs proxy-aware `http`/`https` global agents, then loads the real entry
//! point with the remaining arguments untouched. It is handed to `node -e` directly (no
//! filesystem side effects); the temp-file delivery exists for runtimes or policies that
//! insist on loading code from disk, and removes the file after the child exits.
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

use crate::errors::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimDelivery {
    /// `node -e <bootstrap> -- <entry> <args...>`
    Inline,
    /// `node <tmpfile> <entry> <args...>`, file removed after the run.
    TempFile,
}

impl ShimDelivery {
    /// Delivery selected by `AGENT_BATTLER_SHIM_FILE`.
    pub fn from_env() -> Self {
        if crate::util::env_is_truthy("AGENT_BATTLER_SHIM_FILE") {
            ShimDelivery::TempFile
        } else {
            ShimDelivery::Inline
        }
    }

    // Index of the target entry point in the bootstrap's process.argv.
    fn entry_index(self) -> usize {
        match self {
            ShimDelivery::Inline => 1,
            ShimDelivery::TempFile => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeShim {
    pub node: OsString,
    pub proxy_url: String,
    /// Verify upstream certificates through the proxy. False only when the insecure child TLS
    /// option is on.
    pub reject_unauthorized: bool,
}

impl NodeShim {
    pub fn new(proxy_url: impl Into<String>, reject_unauthorized: bool) -> Self {
        Self {
            node: OsString::from("node"),
            proxy_url: proxy_url.into(),
            reject_unauthorized,
        }
    }

    /// JavaScript source of the bootstrap for the given delivery.
    pub fn render(&self, delivery: ShimDelivery) -> String {
        let url = serde_json::to_string(&self.proxy_url).unwrap_or_else(|_| "\"\"".to_string());
        let idx = delivery.entry_index();
        let reject = self.reject_unauthorized;
        format!(
            r#"'use strict';
const http = require('http');
const https = require('https');
const path = require('path');
const proxyUrl = {url};
try {{
  const h = require('http-proxy-agent');
  const s = require('https-proxy-agent');
  const HttpProxyAgent = h.HttpProxyAgent || h;
  const HttpsProxyAgent = s.HttpsProxyAgent || s;
  http.globalAgent = new HttpProxyAgent(proxyUrl);
  https.globalAgent = new HttpsProxyAgent(proxyUrl, {{ rejectUnauthorized: {reject} }});
}} catch (e) {{
  console.error('[agent-battler] http-proxy-agent/https-proxy-agent not found; requests may bypass the proxy');
}}
const entry = path.resolve(process.argv[{idx}]);
process.argv = [process.argv[0], entry].concat(process.argv.slice({rest}));
require(entry);
"#,
            rest = idx + 1
        )
    }

    /// Build the node invocation for `entry` with `args` forwarded unchanged.
    pub fn prepare(
        &self,
        entry: &Path,
        args: &[String],
        delivery: ShimDelivery,
    ) -> io::Result<PreparedShim> {
        let source = self.render(delivery);
        let mut argv: Vec<OsString> = Vec::with_capacity(args.len() + 4);
        let artifact = match delivery {
            ShimDelivery::Inline => {
                argv.push("-e".into());
                argv.push(source.into());
                argv.push("--".into());
                None
            }
            ShimDelivery::TempFile => {
                let mut f = tempfile::Builder::new()
                    .prefix("agent-battler-proxy-bootstrap-")
                    .suffix(".js")
                    .tempfile()?;
                f.write_all(source.as_bytes())?;
                f.flush()?;
                let path = f.into_temp_path();
                debug!(path = %path.display(), "wrote preload shim");
                argv.push(path.to_path_buf().into_os_string());
                Some(path)
            }
        };
        argv.push(entry.as_os_str().to_os_string());
        argv.extend(args.iter().map(OsString::from));
        Ok(PreparedShim {
            program: self.node.clone(),
            args: argv,
            artifact,
        })
    }
}

/// A ready-to-spawn shimmed invocation. Call `cleanup()` once the child has exited.
#[derive(Debug)]
pub struct PreparedShim {
    pub program: OsString,
    pub args: Vec<OsString>,
    artifact: Option<TempPath>,
}

impl PreparedShim {
    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// Remove the bootstrap file, if any. Failures are logged and swallowed.
    pub fn cleanup(self) {
        if let Err(e) = self.try_cleanup() {
            warn!("{e}");
        }
    }

    fn try_cleanup(self) -> Result<(), CaptureError> {
        match self.artifact {
            Some(path) => {
                let shown = path.display().to_string();
                path.close()
                    .map_err(|e| CaptureError::Cleanup(format!("remove {shown}: {e}")))
            }
            None => Ok(()),
        }
    }
}

/// Resolve the JavaScript entry point behind a globally installed Node CLI (the `bin` symlink
/// points into the package's `dist/` or `bin/` directory).
pub fn resolve_node_entry(bin: &str) -> Option<PathBuf> {
    let p = which::which(bin).ok()?;
    let real = fs::canonicalize(&p).unwrap_or(p);
    match real.extension().and_then(|e| e.to_str()) {
        Some("js" | "cjs" | "mjs") => Some(real),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_as_strings(p: &PreparedShim) -> Vec<String> {
        p.args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_inline_has_no_artifact_and_forwards_args() {
        let shim = NodeShim::new("http://localhost:8080", true);
        let prepared = shim
            .prepare(
                Path::new("/opt/auggie/dist/cli.js"),
                &["--print".to_string(), "fix the bug".to_string()],
                ShimDelivery::Inline,
            )
            .expect("prepare");
        assert!(prepared.artifact_path().is_none());
        let args = args_as_strings(&prepared);
        assert_eq!(args[0], "-e");
        assert!(args[1].contains("https.globalAgent"));
        assert_eq!(&args[2..], ["--", "/opt/auggie/dist/cli.js", "--print", "fix the bug"]);
        assert_eq!(prepared.program, OsString::from("node"));
    }

    #[test]
    fn test_render_embeds_url_and_tls_choice() {
        let src = NodeShim::new("http://localhost:9090", false).render(ShimDelivery::Inline);
        assert!(src.contains("const proxyUrl = \"http://localhost:9090\";"));
        assert!(src.contains("rejectUnauthorized: false"));
        assert!(src.contains("process.argv[1]"));
        assert!(src.contains("process.argv.slice(2)"));

        let file_src = NodeShim::new("http://localhost:9090", true).render(ShimDelivery::TempFile);
        assert!(file_src.contains("rejectUnauthorized: true"));
        assert!(file_src.contains("process.argv[2]"));
        assert!(file_src.contains("process.argv.slice(3)"));
    }

    #[test]
    fn test_tempfile_delivery_removed_on_cleanup() {
        let shim = NodeShim::new("http://localhost:8080", true);
        let prepared = shim
            .prepare(Path::new("cli.js"), &[], ShimDelivery::TempFile)
            .expect("prepare");
        let path = prepared.artifact_path().expect("artifact").to_path_buf();
        assert!(path.is_file());
        let on_disk = fs::read_to_string(&path).expect("read");
        assert!(on_disk.contains("require(entry)"));
        assert_eq!(prepared.args[0], path.as_os_str());
        prepared.cleanup();
        assert!(!path.exists());
    }

    #[test]
    fn test_cleanup_swallows_missing_file() {
        let shim = NodeShim::new("http://localhost:8080", true);
        let prepared = shim
            .prepare(Path::new("cli.js"), &[], ShimDelivery::TempFile)
            .expect("prepare");
        let path = prepared.artifact_path().expect("artifact").to_path_buf();
        fs::remove_file(&path).expect("remove early");
        prepared.cleanup();
        assert!(!path.exists());
    }
}
