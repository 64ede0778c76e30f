use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use agent_battler::probe::{proxy_env_snapshot, run_probe, ProbeOptions, DEFAULT_PROBE_URL};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "agent-battler-probe",
    version,
    about = "Issue one HTTPS request with the host's native client to check that it goes through the capture proxy",
    after_long_help = "Examples:\n  HTTPS_PROXY=http://localhost:8080 agent-battler-probe --ca-cert ~/.mitmproxy/mitmproxy-ca-cert.pem\n  HTTPS_PROXY=http://localhost:8080 agent-battler-probe --insecure\n"
)]
struct ProbeCli {
    /// URL to request
    #[arg(long, default_value = DEFAULT_PROBE_URL)]
    url: String,

    /// Accept any server certificate (needed when the proxy CA is not trusted)
    #[arg(long)]
    insecure: bool,

    /// Trust this PEM certificate as an additional root
    #[arg(long = "ca-cert")]
    ca_cert: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = ProbeCli::parse();

    println!("Testing HTTPS request through proxy...");
    for (name, value) in proxy_env_snapshot() {
        println!("{name}: {}", value.as_deref().unwrap_or("(not set)"));
    }
    println!();

    let opts = ProbeOptions {
        url: cli.url,
        insecure: cli.insecure,
        ca_cert: cli.ca_cert,
        timeout: Duration::from_secs(cli.timeout),
    };
    match run_probe(&opts) {
        Ok(report) => {
            println!("Status: {}", report.status);
            println!("Headers:");
            for (k, v) in &report.headers {
                println!("  {k}: {v}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}
