mod banner;
mod cli;

use std::process::ExitCode;
use std::time::Duration;

use agent_battler::color::{color_enabled_stderr, log_error_stderr, log_info_stderr, log_warn_stderr};
use agent_battler::proxy::default_ca_cert;
use agent_battler::{
    exit_code_for_capture_error, supported_agent_ids, AgentCommandRunner, CancelToken, CaptureError,
    ExecutorSettings, RunnerConfig,
};
use clap::Parser;

use crate::banner::print_startup_banner;
use crate::cli::Cli;

fn simulate_duration() -> Duration {
    let secs = std::env::var("AGENT_BATTLER_SIMULATE_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(5);
    Duration::from_secs(secs)
}

fn print_usage_hint(with_agents: bool) {
    eprintln!();
    eprintln!("Usage: agent-battler [OPTIONS] <AGENT> <INSTRUCTION>...");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  agent-battler claude \"Fix the login bug\"");
    eprintln!("  agent-battler auggie \"Add user authentication\"");
    eprintln!("  agent-battler cursor \"Refactor the API\"");
    if with_agents {
        eprintln!();
        eprintln!("Supported agents: {}", supported_agent_ids().join(", "));
    }
}

fn report_error(e: &CaptureError) {
    let use_err = color_enabled_stderr();
    match e {
        CaptureError::Usage(msg) => {
            log_error_stderr(use_err, &format!("agent-battler: {msg}"));
            print_usage_hint(!msg.contains("Supported agents"));
        }
        CaptureError::Interrupted => {
            log_warn_stderr(use_err, "agent-battler: interrupted; proxy stopped");
        }
        _ => {
            log_error_stderr(use_err, &format!("agent-battler: {e}"));
            if let Some(remedy) = e.remedy() {
                eprintln!();
                eprintln!("{remedy}");
            }
        }
    }
}

fn main() -> ExitCode {
    // Load environment variables from .env if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(c) => c,
        Err(e) => {
            use clap::error::ErrorKind;
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => {
                    eprintln!("Supported agents: {}", supported_agent_ids().join(", "));
                    ExitCode::from(1)
                }
            };
        }
    };

    if let Some(mode) = cli.color {
        agent_battler::set_color_mode(mode);
    }
    let verbose = cli.verbose_effective();
    agent_battler::telemetry::telemetry_init(verbose);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            tracing::warn!("failed to install interrupt handler: {e}");
        }
    }

    let instruction = cli.instruction_text();
    if !cli.quiet && agent_battler::lookup_agent(&cli.agent).is_some() {
        print_startup_banner(&cli.agent, &instruction, cli.port);
    }

    let config = RunnerConfig {
        log_dir: cli.log_dir.clone(),
        port: cli.port,
        addon: cli.addon.clone(),
        verbose,
        insecure_child_tls: cli.insecure_tls_effective(),
        ca_cert: cli.ca_cert.clone().or_else(default_ca_cert),
        timeout: cli.timeout.map(Duration::from_secs),
        executors: ExecutorSettings {
            simulate: simulate_duration(),
            ..ExecutorSettings::default()
        },
        ..RunnerConfig::default()
    };
    if verbose {
        eprintln!("agent-battler: log dir: {}", config.log_dir.display());
        eprintln!(
            "agent-battler: addon: {}",
            config
                .addon
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(built-in)".to_string())
        );
        if let Some(ca) = &config.ca_cert {
            eprintln!("agent-battler: proxy CA: {}", ca.display());
        }
    }

    let runner = AgentCommandRunner::new(config).with_cancel_token(cancel);
    match runner.run_session(&cli.agent, &instruction) {
        Ok(outcome) => {
            let use_err = color_enabled_stderr();
            if outcome.error.is_none() {
                log_info_stderr(use_err, "agent-battler: command completed");
            }
            log_info_stderr(
                use_err,
                &format!(
                    "agent-battler: network capture saved to: {}",
                    outcome.record.log_file().display()
                ),
            );
            if cli.json {
                println!("{}", outcome.record.to_json());
            }
            match &outcome.error {
                None => ExitCode::SUCCESS,
                Some(e) => {
                    report_error(e);
                    ExitCode::from(exit_code_for_capture_error(e))
                }
            }
        }
        Err(e) => {
            report_error(&e);
            ExitCode::from(exit_code_for_capture_error(&e))
        }
    }
}
