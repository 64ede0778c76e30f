//! Owns one intercepting-proxy engine process per session.
//!
//! State machine: Idle → Starting → Running → Stopping → Idle.
//! - start(): precondition check on the addon, port check, spawn, readiness poll.
//! - stop(): SIGTERM, grace period, SIGKILL to the engine's process group; idempotent and
//!   always ends in Idle. An engine that already exited is reported as an error.
//!
//! The child handle is private to the supervisor value; two sessions need two supervisors
//! bound to distinct ports.
use std::collections::BTreeMap;
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, instrument, warn};

use super::escalation::{terminate_with_grace, SignalScope};
use super::readiness::{port_is_free, wait_until_ready, Readiness};
use super::{proxy_env, ProxyConfig};
use crate::errors::{CaptureError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug)]
pub struct ProxySupervisor {
    config: ProxyConfig,
    state: SupervisorState,
    child: Option<Child>,
}

impl ProxySupervisor {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            state: SupervisorState::Idle,
            child: None,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// PID of the engine while one is owned.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Environment for children that should route through this proxy.
    pub fn proxy_env(&self) -> BTreeMap<String, String> {
        proxy_env(&self.config)
    }

    fn engine_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.engine.program);
        cmd.args(self.config.engine_args());
        cmd.stdin(Stdio::null());
        if self.config.verbose {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        // Own process group: a terminal Ctrl-C reaches the agent, while the engine is shut
        // down by stop() so the addon can flush its log. stop() signals the whole group.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    #[instrument(level = "info", skip(self), fields(port = self.config.port))]
    pub fn start(&mut self) -> Result<()> {
        if self.state != SupervisorState::Idle {
            return Err(CaptureError::ProcessLifecycle(format!(
                "proxy already started (state: {:?})",
                self.state
            )));
        }
        if !self.config.addon.is_file() {
            return Err(CaptureError::precondition(
                format!("Addon script not found: {}", self.config.addon.display()),
                "pass --addon <path> or set AGENT_BATTLER_ADDON to the capture addon script",
            ));
        }

        if !port_is_free(self.config.port) {
            return Err(CaptureError::ProcessLifecycle(format!(
                "port {} already in use",
                self.config.port
            )));
        }

        let mut cmd = self.engine_command();
        if self.config.verbose {
            let args: Vec<String> = self
                .config
                .engine_args()
                .iter()
                .map(|a| a.to_string_lossy().to_string())
                .collect();
            eprintln!(
                "agent-battler: starting proxy: {} {}",
                self.config.engine.program.to_string_lossy(),
                crate::util::shell_join(&args)
            );
        }

        let mut child = cmd.spawn().map_err(|e| {
            CaptureError::ProcessLifecycle(format!(
                "Failed to start {}: {e}",
                self.config.engine.program.to_string_lossy()
            ))
        })?;
        self.state = SupervisorState::Starting;
        debug!(pid = child.id(), "engine spawned");

        let readiness = wait_until_ready(self.config.port, &self.config.readiness, || {
            child.try_wait()
        });

        match readiness {
            Ok(Readiness::Ready { attempts }) => {
                info!(pid = child.id(), attempts, "proxy running");
                self.child = Some(child);
                self.state = SupervisorState::Running;
                Ok(())
            }
            Ok(Readiness::Exited(status)) => {
                self.state = SupervisorState::Idle;
                Err(CaptureError::ProcessLifecycle(format!(
                    "Proxy process died unexpectedly ({status})"
                )))
            }
            Ok(Readiness::TimedOut) => {
                warn!(
                    timeout = ?self.config.readiness.timeout,
                    "proxy did not accept connections in time"
                );
                self.state = SupervisorState::Stopping;
                let _ = terminate_with_grace(&mut child, self.config.grace, SignalScope::Group);
                self.state = SupervisorState::Idle;
                Err(CaptureError::ProcessLifecycle(format!(
                    "Proxy did not start listening on port {} within {:?}",
                    self.config.port, self.config.readiness.timeout
                )))
            }
            Err(e) => {
                self.state = SupervisorState::Stopping;
                let _ = terminate_with_grace(&mut child, self.config.grace, SignalScope::Group);
                self.state = SupervisorState::Idle;
                Err(CaptureError::ProcessLifecycle(format!(
                    "Failed to query proxy process: {e}"
                )))
            }
        }
    }

    /// Stop the engine. Resolves immediately when idle; otherwise returns once the process is
    /// reaped. The handle is cleared and the state is Idle on every return path. Fails when the
    /// engine had already exited on its own.
    #[instrument(level = "info", skip(self), fields(port = self.config.port))]
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            self.state = SupervisorState::Idle;
            return Ok(());
        };
        self.state = SupervisorState::Stopping;
        if let Ok(Some(status)) = child.try_wait() {
            self.state = SupervisorState::Idle;
            warn!(%status, "proxy exited before stop");
            return Err(CaptureError::ProcessLifecycle(format!(
                "Proxy process exited before stop ({status}); the capture may be incomplete"
            )));
        }
        let outcome = terminate_with_grace(&mut child, self.config.grace, SignalScope::Group);
        self.state = SupervisorState::Idle;
        match outcome {
            Ok(status) => {
                info!(%status, "proxy stopped");
                Ok(())
            }
            Err(e) => Err(CaptureError::ProcessLifecycle(format!(
                "Failed to stop proxy: {e}"
            ))),
        }
    }
}

impl Drop for ProxySupervisor {
    fn drop(&mut self) {
        if self.child.is_some() {
            let _ = self.stop();
        }
    }
}
