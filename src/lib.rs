/*!
Agent Battler: capture the network traffic of AI coding agents.

Architecture
- Binary glue (src/main.rs) parses the CLI, prints the banner, installs the interrupt handler and
  maps errors to exit codes. Everything else lives in the library.
- runner: one session per call. Validate the agent, check the engine, allocate the log file,
  start the proxy, run the agent through an executor, always stop the proxy.
- proxy::*: the supervisor state machine owning the mitmdump process (readiness probe, TERM→KILL
  escalation, proxy environment for children).
- executor / agents: per-agent strategies (plain process, Node preload shim, capture window).
- shim: the Node bootstrap installing proxy-aware global agents.
- probe: manual HTTPS connectivity check behind `agent-battler-probe`.
- color.rs, util::*: progress-line coloring, env toggles, timestamps, file helpers.

Environment
- AGENT_BATTLER_PORT / AGENT_BATTLER_LOG_DIR / AGENT_BATTLER_ADDON / AGENT_BATTLER_CA_CERT: CLI
  option fallbacks.
- VERBOSE=1: same as --verbose (engine stdio inherited).
- AGENT_BATTLER_INSECURE_TLS=1: same as --insecure-child-tls.
- AGENT_BATTLER_SHIM_FILE=1: deliver the Node bootstrap as a temp file instead of `node -e`.
- AGENT_BATTLER_SIMULATE_SECS: length of the simulated run for agents whose CLI is missing.
- AGENT_BATTLER_LOG: tracing filter directive (default `warn`).
- AGENT_BATTLER_COLOR / NO_COLOR: color control for progress lines.
- Children receive HTTP_PROXY, HTTPS_PROXY, http_proxy, https_proxy = http://localhost:<port>.
*/

pub mod addon;
pub mod agents;
pub mod color;
pub mod errors;
pub mod executor;
pub mod install;
pub mod probe;
pub mod proxy;
pub mod runner;
pub mod session;
pub mod shim;
pub mod telemetry;
pub mod util;

pub use agents::{lookup_agent, supported_agent_ids, AgentKind, AgentProfile, AGENTS};
pub use color::{color_enabled_stderr, paint, set_color_mode, ColorMode};
pub use errors::{exit_code_for_capture_error, CaptureError, Result};
pub use executor::{
    select_executor, AgentExecutor, CancelToken, ExecContext, ExecutorSettings, ProcessExecutor,
    ShimmedNodeExecutor, WaitExecutor,
};
pub use install::{check_installed, install_instructions};
pub use proxy::{EngineCommand, ProxyConfig, ProxySupervisor, ReadinessPolicy, SupervisorState};
pub use runner::{AgentCommandRunner, RunnerConfig, SessionOutcome};
pub use session::{SessionRecord, SessionStatus};
pub use shim::{NodeShim, PreparedShim, ShimDelivery};
