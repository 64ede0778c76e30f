use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "agent-battler",
    version,
    about = "Run an AI coding agent behind a supervised mitmproxy and save its network traffic as JSON.",
    override_usage = "agent-battler [OPTIONS] <AGENT> <INSTRUCTION>...",
    after_long_help = "Examples:\n  agent-battler claude \"Fix the login bug\"\n  agent-battler auggie \"Add user authentication\"\n  agent-battler --port 9090 --log-dir /tmp/captures cursor \"Refactor the API\"\n\nSupported agents: claude, auggie, cursor, copilot, codeium, chatgpt\n",
    after_help = "\n"
)]
pub(crate) struct Cli {
    /// Agent to run (claude, auggie, cursor, copilot, codeium, chatgpt)
    #[arg(value_name = "AGENT")]
    pub(crate) agent: String,

    /// Instruction passed to the agent; multiple words are joined with spaces
    #[arg(value_name = "INSTRUCTION", required = true, num_args = 1.., trailing_var_arg = true)]
    pub(crate) instruction: Vec<String>,

    /// Proxy listen port
    #[arg(long, env = "AGENT_BATTLER_PORT", default_value_t = agent_battler::proxy::DEFAULT_PORT)]
    pub(crate) port: u16,

    /// Directory for capture logs
    #[arg(long = "log-dir", env = "AGENT_BATTLER_LOG_DIR", default_value = agent_battler::runner::DEFAULT_LOG_DIR)]
    pub(crate) log_dir: PathBuf,

    /// mitmdump addon script (defaults to the built-in capture addon)
    #[arg(long, env = "AGENT_BATTLER_ADDON")]
    pub(crate) addon: Option<PathBuf>,

    /// Print detailed execution info and show proxy output (same as VERBOSE=1)
    #[arg(long)]
    pub(crate) verbose: bool,

    /// Disable TLS certificate verification in proxied Node processes (same as AGENT_BATTLER_INSECURE_TLS=1)
    #[arg(long = "insecure-child-tls")]
    pub(crate) insecure_child_tls: bool,

    /// Trust this CA in proxied Node processes (defaults to ~/.mitmproxy/mitmproxy-ca-cert.pem when present)
    #[arg(long = "ca-cert", env = "AGENT_BATTLER_CA_CERT")]
    pub(crate) ca_cert: Option<PathBuf>,

    /// Kill the agent after N seconds
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,

    /// Print the session record as JSON on stdout
    #[arg(long)]
    pub(crate) json: bool,

    /// Suppress startup banner output
    #[arg(long, short = 'q')]
    pub(crate) quiet: bool,

    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum)]
    pub(crate) color: Option<agent_battler::ColorMode>,
}

impl Cli {
    pub(crate) fn instruction_text(&self) -> String {
        self.instruction.join(" ")
    }

    pub(crate) fn verbose_effective(&self) -> bool {
        self.verbose || std::env::var("VERBOSE").ok().as_deref() == Some("1")
    }

    pub(crate) fn insecure_tls_effective(&self) -> bool {
        self.insecure_child_tls || agent_battler::util::env_is_truthy("AGENT_BATTLER_INSECURE_TLS")
    }
}
