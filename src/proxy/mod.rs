/*!
Intercepting-proxy supervision.

- ProxyConfig / EngineCommand: what to launch and where it listens (fixed per supervisor)
- env: proxy environment handed to child processes
- readiness: connect-and-retry probe used while Starting
- escalation: cancellable TERM→KILL deadline (also used for the agent child)
- supervisor: the Idle/Starting/Running/Stopping state machine owning one engine process
*/
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

pub mod env;
pub mod escalation;
pub mod readiness;
pub mod supervisor;

pub use env::{proxy_env, proxy_url, PROXY_ENV_VARS, TLS_BYPASS_VAR};
pub use escalation::{terminate_with_grace, EscalationTimer, SignalScope};
pub use readiness::{port_is_free, wait_until_ready, ReadinessPolicy};
pub use supervisor::{ProxySupervisor, SupervisorState};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Program used to launch the engine, with optional leading arguments placed before the
/// engine flags (wrappers such as `python3 -m mitmproxy.tools.main`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: OsString,
    pub leading_args: Vec<OsString>,
}

impl EngineCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Default for EngineCommand {
    fn default() -> Self {
        Self::new(crate::install::ENGINE_BINARY)
    }
}

/// Configuration for one supervisor. Port and log file never change after construction.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub log_file: PathBuf,
    pub verbose: bool,
    /// Log-writer addon loaded by the engine (`-s`).
    pub addon: PathBuf,
    pub engine: EngineCommand,
    pub readiness: ReadinessPolicy,
    /// Time between SIGTERM and SIGKILL when stopping.
    pub grace: Duration,
    /// Disable certificate verification in proxied children. Weakens transport security for
    /// every process inheriting the environment; off unless explicitly requested.
    pub insecure_child_tls: bool,
    /// CA certificate of the engine, exported to children that can trust extra roots.
    pub ca_cert: Option<PathBuf>,
}

impl ProxyConfig {
    pub fn new(log_file: impl Into<PathBuf>, addon: impl Into<PathBuf>) -> Self {
        Self {
            port: DEFAULT_PORT,
            log_file: log_file.into(),
            verbose: false,
            addon: addon.into(),
            engine: EngineCommand::default(),
            readiness: ReadinessPolicy::default(),
            grace: DEFAULT_GRACE,
            insecure_child_tls: false,
            ca_cert: None,
        }
    }

    /// Engine argument vector (excluding the program itself).
    pub fn engine_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.engine.leading_args.clone();
        args.push("-s".into());
        args.push(self.addon.clone().into_os_string());
        args.push("--set".into());
        let mut logfile = OsString::from("logfile=");
        logfile.push(self.log_file.as_os_str());
        args.push(logfile);
        args.push("--listen-port".into());
        args.push(self.port.to_string().into());
        args.push("--quiet".into());
        args
    }
}

/// Default location of the mitmproxy CA certificate, when it has been generated.
pub fn default_ca_cert() -> Option<PathBuf> {
    let p = home::home_dir()?
        .join(".mitmproxy")
        .join("mitmproxy-ca-cert.pem");
    p.is_file().then_some(p)
}
