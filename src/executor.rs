//! Strategies for running an agent while the proxy is up.
//!
//! The runner only sees `AgentExecutor`; which concrete strategy drives a given agent is
//! decided by `select_executor` unless the caller injects one.
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::agents::{AgentKind, AgentProfile};
use crate::errors::{CaptureError, Result};
use crate::proxy::{terminate_with_grace, SignalScope};
use crate::shim::{resolve_node_entry, NodeShim, ShimDelivery};

/// Grace given to an agent child between SIGTERM and SIGKILL on timeout or interrupt.
pub const AGENT_KILL_GRACE: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared interrupt flag. Set from the signal handler, polled by executors.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything an executor may use to run one agent invocation.
#[derive(Debug)]
pub struct ExecContext<'a> {
    pub agent: &'a AgentProfile,
    pub instruction: &'a str,
    /// Variables merged over the inherited environment of the child.
    pub proxy_env: &'a BTreeMap<String, String>,
    pub proxy_url: &'a str,
    pub insecure_child_tls: bool,
    pub timeout: Option<Duration>,
    pub cancel: &'a CancelToken,
}

pub trait AgentExecutor {
    /// Run the agent to completion. Errors are `CommandExecution` (failure or timeout) or
    /// `Interrupted`.
    fn execute(&self, ctx: &ExecContext<'_>) -> Result<()>;

    /// Short description for progress output.
    fn describe(&self) -> String;
}

/// Spawn a real process with the proxy environment and inherited stdio.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Append the instruction as the last argument.
    pub append_instruction: bool,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            append_instruction: true,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn append_instruction(mut self, yes: bool) -> Self {
        self.append_instruction = yes;
        self
    }

    fn command(&self, ctx: &ExecContext<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if self.append_instruction {
            cmd.arg(ctx.instruction);
        }
        cmd.envs(ctx.proxy_env.iter());
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl AgentExecutor for ProcessExecutor {
    #[instrument(level = "info", skip_all, fields(agent = ctx.agent.id))]
    fn execute(&self, ctx: &ExecContext<'_>) -> Result<()> {
        let program = self.program.to_string_lossy().to_string();
        let child = self.command(ctx).spawn().map_err(|e| {
            CaptureError::CommandExecution(format!("failed to start {program}: {e}"))
        })?;
        supervise_child(child, &program, ctx.timeout, ctx.cancel)
    }

    fn describe(&self) -> String {
        self.program.to_string_lossy().to_string()
    }
}

/// Run a Node CLI through the preload shim.
#[derive(Debug, Clone)]
pub struct ShimmedNodeExecutor {
    pub entry: PathBuf,
    pub prefix_args: Vec<String>,
    pub delivery: ShimDelivery,
    pub node: OsString,
}

impl ShimmedNodeExecutor {
    pub fn new(entry: impl Into<PathBuf>, prefix_args: &[&str]) -> Self {
        Self {
            entry: entry.into(),
            prefix_args: prefix_args.iter().map(|s| s.to_string()).collect(),
            delivery: ShimDelivery::from_env(),
            node: OsString::from("node"),
        }
    }
}

impl AgentExecutor for ShimmedNodeExecutor {
    #[instrument(level = "info", skip_all, fields(agent = ctx.agent.id, delivery = ?self.delivery))]
    fn execute(&self, ctx: &ExecContext<'_>) -> Result<()> {
        let mut shim = NodeShim::new(ctx.proxy_url, !ctx.insecure_child_tls);
        shim.node = self.node.clone();
        let mut args = self.prefix_args.clone();
        args.push(ctx.instruction.to_string());
        let prepared = shim
            .prepare(&self.entry, &args, self.delivery)
            .map_err(|e| CaptureError::CommandExecution(format!("failed to prepare preload shim: {e}")))?;

        let program = prepared.program.to_string_lossy().to_string();
        let spawned = Command::new(&prepared.program)
            .args(&prepared.args)
            .envs(ctx.proxy_env.iter())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn();
        let result = match spawned {
            Ok(child) => supervise_child(child, &program, ctx.timeout, ctx.cancel),
            Err(e) => Err(CaptureError::CommandExecution(format!(
                "failed to start {program}: {e}"
            ))),
        };
        prepared.cleanup();
        result
    }

    fn describe(&self) -> String {
        format!("node (preload shim) {}", self.entry.display())
    }
}

/// Keep the proxy open for a fixed window without spawning anything: used for agents that are
/// driven by hand (IDE, API clients) and as the simulated run when a CLI is not installed.
#[derive(Debug, Clone)]
pub struct WaitExecutor {
    pub duration: Duration,
    pub notice: Vec<String>,
}

impl WaitExecutor {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            notice: Vec::new(),
        }
    }

    pub fn with_notice(mut self, lines: Vec<String>) -> Self {
        self.notice = lines;
        self
    }
}

impl AgentExecutor for WaitExecutor {
    #[instrument(level = "info", skip_all, fields(agent = ctx.agent.id, secs = self.duration.as_secs()))]
    fn execute(&self, ctx: &ExecContext<'_>) -> Result<()> {
        for line in &self.notice {
            eprintln!("{line}");
        }
        // A --timeout shorter than the window ends it early and counts as a timeout.
        let limit = ctx.timeout.filter(|t| *t < self.duration);
        let deadline = Instant::now() + limit.unwrap_or(self.duration);
        loop {
            if ctx.cancel.is_cancelled() {
                return Err(CaptureError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return match limit {
                    Some(t) => {
                        warn!(limit = ?t, "capture window timed out");
                        Err(CaptureError::CommandExecution(format!(
                            "capture window timed out after {}s",
                            t.as_secs()
                        )))
                    }
                    None => Ok(()),
                };
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn describe(&self) -> String {
        format!("capture window ({}s)", self.duration.as_secs())
    }
}

// Agents share our process group, so only the child itself is signalled.
fn terminate_agent(child: &mut Child) {
    let _ = terminate_with_grace(child, AGENT_KILL_GRACE, SignalScope::Process);
}

/// Wait for an agent child, enforcing the timeout and reacting to interrupts. The child is
/// always reaped before returning.
fn supervise_child(
    mut child: Child,
    program: &str,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<()> {
    let started = Instant::now();
    debug!(pid = child.id(), program, "agent spawned");
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                info!(%status, elapsed = ?started.elapsed(), "agent exited");
                if cancel.is_cancelled() {
                    return Err(CaptureError::Interrupted);
                }
                return if status.success() {
                    Ok(())
                } else {
                    Err(CaptureError::CommandExecution(format!(
                        "{program} exited with {status}"
                    )))
                };
            }
            Ok(None) => {}
            Err(e) => {
                terminate_agent(&mut child);
                return Err(CaptureError::CommandExecution(format!(
                    "failed to wait for {program}: {e}"
                )));
            }
        }

        if cancel.is_cancelled() {
            warn!(pid = child.id(), "interrupt received, terminating agent");
            terminate_agent(&mut child);
            return Err(CaptureError::Interrupted);
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                warn!(pid = child.id(), ?limit, "agent timed out");
                terminate_agent(&mut child);
                return Err(CaptureError::CommandExecution(format!(
                    "{program} timed out after {}s",
                    limit.as_secs()
                )));
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Tuning for `select_executor`.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// How long the proxy stays open for IDE/API agents.
    pub capture_window: Duration,
    /// Length of the simulated run when an agent CLI is not installed.
    pub simulate: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            capture_window: Duration::from_secs(30),
            simulate: Duration::from_secs(5),
        }
    }
}

fn proxy_hint(proxy_url: &str) -> Vec<String> {
    vec![
        format!("      HTTP_PROXY={proxy_url}"),
        format!("      HTTPS_PROXY={proxy_url}"),
    ]
}

/// Pick the strategy for `agent` on this host.
pub fn select_executor(
    agent: &AgentProfile,
    proxy_url: &str,
    settings: &ExecutorSettings,
) -> Box<dyn AgentExecutor> {
    match agent.kind {
        AgentKind::Cli => {
            if let Some(program) = agent.program.and_then(|p| which::which(p).ok()) {
                return Box::new(ProcessExecutor::new(program).args(agent.prefix_args.iter().copied()));
            }
        }
        AgentKind::NodeShimmed => {
            if let Some(entry) = agent.program.and_then(resolve_node_entry) {
                return Box::new(ShimmedNodeExecutor::new(entry, agent.prefix_args));
            }
            if let Some(program) = agent.program.and_then(|p| which::which(p).ok()) {
                // Not a plain JS entry (native wrapper): run it directly and rely on env vars.
                return Box::new(ProcessExecutor::new(program).args(agent.prefix_args.iter().copied()));
            }
        }
        AgentKind::Ide => {
            let mut lines = vec![
                format!("ℹ️  {} is an IDE application.", agent.display),
                "   To capture its network requests, configure its proxy settings or start it with:"
                    .to_string(),
            ];
            lines.extend(proxy_hint(proxy_url));
            lines.push(format!(
                "   Waiting for {} seconds to capture requests...",
                settings.capture_window.as_secs()
            ));
            return Box::new(WaitExecutor::new(settings.capture_window).with_notice(lines));
        }
        AgentKind::Api => {
            let mut lines = vec![
                format!("ℹ️  {} is typically used via API.", agent.display),
                "   Run a client that respects HTTP_PROXY with:".to_string(),
            ];
            lines.extend(proxy_hint(proxy_url));
            lines.push(format!(
                "   Waiting for {} seconds to capture requests...",
                settings.capture_window.as_secs()
            ));
            return Box::new(WaitExecutor::new(settings.capture_window).with_notice(lines));
        }
    }

    let program = agent.program.unwrap_or(agent.id);
    Box::new(WaitExecutor::new(settings.simulate).with_notice(vec![
        format!("⚠️  {program} was not found on PATH; simulating the agent run."),
        format!(
            "    Install {} to capture a real session. Simulating a {}-second execution...",
            agent.display,
            settings.simulate.as_secs()
        ),
    ]))
}
