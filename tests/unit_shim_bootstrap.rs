mod support;

use std::fs;
use std::process::Command;

use agent_battler::{NodeShim, ShimDelivery};

const ENTRY_JS: &str = "process.stdout.write(JSON.stringify({ entry: process.argv[1], args: process.argv.slice(2), agent: typeof require('https').globalAgent }));\n";

fn run_shimmed(delivery: ShimDelivery) -> Option<serde_json::Value> {
    let node = support::which("node")?;
    let td = tempfile::tempdir().expect("tmpdir");
    let entry = td.path().join("cli.js");
    fs::write(&entry, ENTRY_JS).expect("write entry");

    let mut shim = NodeShim::new("http://localhost:8080", true);
    shim.node = node.into_os_string();
    let args = vec!["--print".to_string(), "fix the --bug".to_string()];
    let prepared = shim.prepare(&entry, &args, delivery).expect("prepare");
    let artifact = prepared.artifact_path().map(|p| p.to_path_buf());

    let out = Command::new(&prepared.program)
        .args(&prepared.args)
        .output()
        .expect("run node");
    prepared.cleanup();
    if let Some(p) = artifact {
        assert!(!p.exists(), "bootstrap file not removed: {}", p.display());
    }
    assert!(
        out.status.success(),
        "node failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json from entry");
    assert_eq!(
        v["entry"].as_str().map(std::path::PathBuf::from),
        Some(entry.clone())
    );
    Some(v)
}

#[test]
fn test_inline_shim_forwards_arguments_unchanged() {
    let Some(v) = run_shimmed(ShimDelivery::Inline) else {
        eprintln!("skipping: node not found in PATH");
        return;
    };
    assert_eq!(v["args"], serde_json::json!(["--print", "fix the --bug"]));
    assert_eq!(v["agent"], "object");
}

#[test]
fn test_tempfile_shim_forwards_arguments_and_cleans_up() {
    let Some(v) = run_shimmed(ShimDelivery::TempFile) else {
        eprintln!("skipping: node not found in PATH");
        return;
    };
    assert_eq!(v["args"], serde_json::json!(["--print", "fix the --bug"]));
}
