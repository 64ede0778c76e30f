use std::env;

use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;

static INIT: OnceCell<()> = OnceCell::new();

/// Filter directive used when `AGENT_BATTLER_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "agent_battler=debug,warn"
    } else {
        "warn"
    }
}

/// Install the stderr fmt subscriber. Safe to call more than once; later calls are no-ops.
pub fn telemetry_init(verbose: bool) {
    if INIT.get().is_some() {
        return;
    }
    let filter = env::var("AGENT_BATTLER_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default_directive(verbose).to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter).unwrap_or_else(|e| {
        eprintln!("agent-battler: invalid AGENT_BATTLER_LOG '{filter}': {e}; using 'warn'");
        tracing_subscriber::EnvFilter::new("warn")
    });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("agent-battler: telemetry init skipped (global subscriber already set)");
    }
    let _ = INIT.set(());
}
