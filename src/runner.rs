//! Orchestrates one capture session: validate, start the proxy, run the agent, always stop.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{info, info_span, warn};

use crate::agents::{lookup_agent, supported_agent_ids};
use crate::color::{color_enabled_stderr, log_error_stderr, log_info_stderr, log_warn_stderr};
use crate::errors::{CaptureError, Result};
use crate::executor::{select_executor, AgentExecutor, CancelToken, ExecContext, ExecutorSettings};
use crate::install::{check_installed_program, install_instructions};
use crate::proxy::{
    proxy_url, EngineCommand, ProxyConfig, ProxySupervisor, ReadinessPolicy, DEFAULT_GRACE,
    DEFAULT_PORT,
};
use crate::session::{allocate_log_file, SessionInProgress, SessionRecord, SessionStatus};

pub const DEFAULT_LOG_DIR: &str = "agent-battler-logs";

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub log_dir: PathBuf,
    pub port: u16,
    /// Addon script; the embedded one is used when unset.
    pub addon: Option<PathBuf>,
    pub engine: EngineCommand,
    pub verbose: bool,
    pub insecure_child_tls: bool,
    pub ca_cert: Option<PathBuf>,
    /// Limit for the agent command.
    pub timeout: Option<Duration>,
    pub readiness: ReadinessPolicy,
    pub grace: Duration,
    pub executors: ExecutorSettings,
    /// Suppress progress lines on stderr.
    pub quiet: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            port: DEFAULT_PORT,
            addon: None,
            engine: EngineCommand::default(),
            verbose: false,
            insecure_child_tls: false,
            ca_cert: None,
            timeout: None,
            readiness: ReadinessPolicy::default(),
            grace: DEFAULT_GRACE,
            executors: ExecutorSettings::default(),
            quiet: false,
        }
    }
}

/// Result of a session that got as far as starting the proxy.
#[derive(Debug)]
pub struct SessionOutcome {
    pub record: SessionRecord,
    /// Why the session failed, when it did: the agent run, or the proxy exiting under it.
    /// The proxy was stopped either way.
    pub error: Option<CaptureError>,
}

impl SessionOutcome {
    pub fn into_result(self) -> Result<SessionRecord> {
        match self.error {
            None => Ok(self.record),
            Some(e) => Err(e),
        }
    }
}

pub struct AgentCommandRunner {
    config: RunnerConfig,
    cancel: CancelToken,
    executor: Option<Box<dyn AgentExecutor>>,
}

impl AgentCommandRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            executor: None,
        }
    }

    /// Share an interrupt flag with a signal handler.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every agent with `executor` instead of the per-agent default.
    pub fn with_executor(mut self, executor: Box<dyn AgentExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn progress(&self, msg: &str) {
        if !self.config.quiet {
            log_info_stderr(color_enabled_stderr(), msg);
        }
    }

    /// Run a session and collapse the outcome into a single result.
    pub fn run(&self, agent_id: &str, instruction: &str) -> Result<SessionRecord> {
        self.run_session(agent_id, instruction)?.into_result()
    }

    /// Errors returned directly happen before the proxy is running (usage, missing engine or
    /// addon, proxy start failure); agent failures come back inside the outcome.
    pub fn run_session(&self, agent_id: &str, instruction: &str) -> Result<SessionOutcome> {
        let Some(agent) = lookup_agent(agent_id) else {
            return Err(CaptureError::Usage(format!(
                "Unsupported agent \"{}\"\nSupported agents: {}",
                agent_id.trim(),
                supported_agent_ids().join(", ")
            )));
        };
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(CaptureError::Usage("missing instruction".to_string()));
        }
        let span = info_span!("session", agent = agent.id, port = self.config.port);
        let _enter = span.enter();

        let engine = self.config.engine.program.to_string_lossy().to_string();
        if !check_installed_program(&engine) {
            return Err(CaptureError::precondition(
                format!("{engine} not found on PATH"),
                install_instructions(),
            ));
        }

        crate::util::fs::ensure_dir(&self.config.log_dir)?;
        let addon = crate::addon::resolve_addon(self.config.addon.as_deref())?;
        let log_file = allocate_log_file(&self.config.log_dir, agent.id, SystemTime::now())?;
        let session = SessionInProgress::begin(agent.id, instruction, log_file.clone());
        info!(log_file = %log_file.display(), "session started");

        self.progress(&format!("agent-battler: running {} with: {}", agent.id, instruction));
        self.progress(&format!(
            "agent-battler: network log: {}",
            log_file.display()
        ));

        let mut proxy_cfg = ProxyConfig::new(&log_file, addon.path());
        proxy_cfg.port = self.config.port;
        proxy_cfg.verbose = self.config.verbose;
        proxy_cfg.engine = self.config.engine.clone();
        proxy_cfg.readiness = self.config.readiness;
        proxy_cfg.grace = self.config.grace;
        proxy_cfg.insecure_child_tls = self.config.insecure_child_tls;
        proxy_cfg.ca_cert = self.config.ca_cert.clone();
        if proxy_cfg.insecure_child_tls {
            log_warn_stderr(
                color_enabled_stderr(),
                "agent-battler: certificate verification disabled for proxied Node processes (--insecure-child-tls)",
            );
        }

        let mut supervisor = ProxySupervisor::new(proxy_cfg);
        self.progress(&format!(
            "agent-battler: starting proxy on port {}",
            self.config.port
        ));
        if let Err(e) = supervisor.start() {
            let _ = supervisor.stop();
            discard_if_empty(&log_file);
            return Err(e);
        }
        self.progress("agent-battler: proxy running");

        let url = proxy_url(self.config.port);
        let env = supervisor.proxy_env();
        let default_executor;
        let executor: &dyn AgentExecutor = match &self.executor {
            Some(ex) => ex.as_ref(),
            None => {
                default_executor = select_executor(agent, &url, &self.config.executors);
                default_executor.as_ref()
            }
        };
        info!(executor = %executor.describe(), "running agent");
        let ctx = ExecContext {
            agent,
            instruction,
            proxy_env: &env,
            proxy_url: &url,
            insecure_child_tls: self.config.insecure_child_tls,
            timeout: self.config.timeout,
            cancel: &self.cancel,
        };
        let outcome = executor.execute(&ctx);

        self.progress("agent-battler: stopping proxy");
        let stopped = supervisor.stop();
        drop(addon);

        // An agent failure is reported first; a proxy that died under a successful agent
        // means the capture is incomplete, so the session fails with the stop error.
        let outcome = match (outcome, stopped) {
            (Err(e), Err(stop_err)) => {
                warn!("{stop_err}");
                log_error_stderr(color_enabled_stderr(), &format!("agent-battler: {stop_err}"));
                Err(e)
            }
            (Ok(()), Err(stop_err)) => Err(stop_err),
            (outcome, Ok(())) => outcome,
        };

        let (status, error) = match outcome {
            Ok(()) => (SessionStatus::Success, None),
            Err(e) => (
                SessionStatus::Failure {
                    message: e.to_string(),
                },
                Some(e),
            ),
        };
        let record = session.finish(status);
        info!(success = record.status().is_success(), "session finished");
        Ok(SessionOutcome { record, error })
    }
}

// The claimed log file stays empty when the engine never ran.
fn discard_if_empty(path: &Path) {
    if fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false) {
        if let Err(e) = fs::remove_file(path) {
            warn!("{}", CaptureError::Cleanup(format!("remove {}: {e}", path.display())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config(dir: &Path) -> RunnerConfig {
        RunnerConfig {
            log_dir: dir.join("logs"),
            quiet: true,
            ..RunnerConfig::default()
        }
    }

    #[test]
    fn test_unknown_agent_is_usage_error_before_anything_else() {
        let td = tempfile::tempdir().expect("tmpdir");
        let runner = AgentCommandRunner::new(quiet_config(td.path()));
        let err = runner.run("gpt5", "do something").expect_err("rejected");
        match err {
            CaptureError::Usage(msg) => {
                assert!(msg.contains("gpt5"));
                assert!(msg.contains("claude, auggie, cursor, copilot, codeium, chatgpt"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!td.path().join("logs").exists());
    }

    #[test]
    fn test_missing_engine_is_precondition_and_creates_nothing() {
        let td = tempfile::tempdir().expect("tmpdir");
        let mut cfg = quiet_config(td.path());
        cfg.engine = EngineCommand::new("agent-battler-missing-engine-xyz");
        let runner = AgentCommandRunner::new(cfg);
        let err = runner.run("claude", "fix").expect_err("precondition");
        assert!(err.remedy().is_some_and(|r| r.contains("brew install")));
        assert!(!td.path().join("logs").exists());
    }

    #[test]
    fn test_empty_instruction_rejected() {
        let td = tempfile::tempdir().expect("tmpdir");
        let runner = AgentCommandRunner::new(quiet_config(td.path()));
        let err = runner.run("claude", "   ").expect_err("usage");
        assert!(matches!(err, CaptureError::Usage(_)));
    }
}
