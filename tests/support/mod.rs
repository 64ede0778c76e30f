/*!
Test support helpers shared across integration tests.

- which(bin): PATH lookup via the host `which`
- free_port(): an unused loopback port
- shell_engine(script): engine command running `script` under /bin/sh (engine flags become $1..)
- write_addon(dir): placeholder addon file for supervisor tests
- python_engine(python, extra) / write_fake_mitmdump(dir): an engine stand-in that binds
  --listen-port itself and writes the log file on SIGTERM (needs python3)
- listening_port(): a foreign listener, for port-in-use cases

These helpers do not print skip messages themselves so tests keep their own "skipping: ..."
outputs.
*/

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;

use agent_battler::EngineCommand;

#[allow(dead_code)]
pub fn which(bin: &str) -> Option<PathBuf> {
    Command::new("which")
        .arg(bin)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .output()
        .ok()
        .and_then(|o| {
            if o.status.success() {
                let s = String::from_utf8_lossy(&o.stdout);
                s.lines()
                    .map(|l| l.trim())
                    .find(|l| !l.is_empty())
                    .map(PathBuf::from)
            } else {
                None
            }
        })
}

/// Ask the kernel for a free port. Nothing listens on it once this returns.
#[allow(dead_code)]
pub fn free_port() -> u16 {
    let l = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral");
    l.local_addr().expect("local addr").port()
}

/// Bind a listener on an ephemeral loopback port that belongs to the test, not the engine.
#[allow(dead_code)]
pub fn listening_port() -> (TcpListener, u16) {
    let l = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral");
    let port = l.local_addr().expect("local addr").port();
    (l, port)
}

#[allow(dead_code)]
pub fn shell_engine(script: &str) -> EngineCommand {
    EngineCommand::new("/bin/sh").with_leading_args(["-c", script, "fake-engine"])
}

#[allow(dead_code)]
pub fn write_addon(dir: &Path) -> PathBuf {
    let p = dir.join("addon.py");
    fs::write(&p, "addons = []\n").expect("write addon");
    p
}

#[allow(dead_code)]
pub fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("chmod");
    }
}

/// Engine stand-in: parses the engine flags, binds --listen-port itself, writes the log file
/// on SIGTERM. Extra flags: `--pidfile P` (also `FAKE_ENGINE_PIDFILE`), `--on-term ignore`.
const FAKE_ENGINE_PY: &str = r#"
import json, os, signal, socket, sys
args = sys.argv[1:]
port, log, on_term = 8080, "", "exit"
pidfile = os.environ.get("FAKE_ENGINE_PIDFILE", "")
i = 0
while i < len(args):
    a = args[i]
    nxt = args[i + 1] if i + 1 < len(args) else ""
    if a == "--listen-port":
        port = int(nxt)
    elif a == "--set" and nxt.startswith("logfile="):
        log = nxt[len("logfile="):]
    elif a == "--pidfile":
        pidfile = nxt
    elif a == "--on-term":
        on_term = nxt
    i += 2 if a in ("--listen-port", "--set", "--pidfile", "--on-term", "-s") else 1
def done(*_):
    if log:
        with open(log, "w") as f:
            json.dump({"metadata": {"total_requests": 0}, "requests": []}, f)
    sys.exit(0)
signal.signal(signal.SIGTERM, signal.SIG_IGN if on_term == "ignore" else done)
if pidfile:
    with open(pidfile + ".tmp", "w") as f:
        f.write(str(os.getpid()))
    os.rename(pidfile + ".tmp", pidfile)
s = socket.socket()
s.setsockopt(socket.SOL_SOCKET, socket.SO_REUSEADDR, 1)
s.bind(("127.0.0.1", port))
s.listen(16)
while True:
    c, _ = s.accept()
    c.close()
"#;

/// Engine command running the stand-in under `python`, with `extra` stand-in flags in front of
/// the real engine flags.
#[allow(dead_code)]
pub fn python_engine(python: &Path, extra: &[&str]) -> EngineCommand {
    let mut leading: Vec<String> = vec!["-c".into(), FAKE_ENGINE_PY.into()];
    leading.extend(extra.iter().map(|s| s.to_string()));
    EngineCommand::new(python).with_leading_args(leading)
}

/// Write a fake `mitmdump` (python3 script) into `dir` and return its path.
#[allow(dead_code)]
pub fn write_fake_mitmdump(dir: &Path) -> PathBuf {
    let p = dir.join("mitmdump");
    write_executable(&p, &format!("#!/usr/bin/env python3{FAKE_ENGINE_PY}"));
    p
}

/// Poll `pidfile` for up to five seconds.
#[allow(dead_code)]
pub fn read_pid(pidfile: &Path) -> Option<u32> {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if let Some(pid) = fs::read_to_string(pidfile)
            .ok()
            .and_then(|s| s.trim().parse().ok())
        {
            return Some(pid);
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    None
}

/// True when `pid` no longer names a live process. A zombie left for init to reap counts as
/// gone.
#[allow(dead_code)]
#[cfg(unix)]
pub fn process_gone(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    if matches!(kill(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH)) {
        return true;
    }
    fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
        })
        .is_some_and(|state| state == 'Z')
}

/// Like `process_gone`, but give an orphan up to two seconds to die.
#[allow(dead_code)]
#[cfg(unix)]
pub fn process_gone_soon(pid: u32) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if process_gone(pid) {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
}

/// Files directly under `dir` whose name starts with `prefix`.
#[allow(dead_code)]
pub fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(prefix))
                })
                .collect()
        })
        .unwrap_or_default();
    out.sort();
    out
}
