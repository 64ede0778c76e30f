//! Grace-period alarm for TERM→KILL escalation.
//!
//! The timer is a plain value owned by the stop operation: it is armed when the graceful
//! signal goes out, cancelled as soon as the exit is observed, and fires at most once.
//! Nothing runs in the background, so a cancelled timer leaves nothing behind.
use std::io;
use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Armed,
    Cancelled,
    Fired,
}

#[derive(Debug)]
pub struct EscalationTimer {
    deadline: Instant,
    state: TimerState,
}

impl EscalationTimer {
    pub fn arm(grace: Duration) -> Self {
        Self {
            deadline: Instant::now() + grace,
            state: TimerState::Armed,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Time left before the alarm is due; zero once due or no longer armed.
    pub fn remaining(&self) -> Duration {
        if self.state != TimerState::Armed {
            return Duration::ZERO;
        }
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_due(&self) -> bool {
        self.state == TimerState::Armed && Instant::now() >= self.deadline
    }

    /// Disarm after a normal exit. No effect once fired.
    pub fn cancel(&mut self) {
        if self.state == TimerState::Armed {
            self.state = TimerState::Cancelled;
        }
    }

    /// Mark the alarm as fired. Returns true only for the first call on an armed timer, so the
    /// caller sends the forceful signal exactly once.
    pub fn fire(&mut self) -> bool {
        if self.state == TimerState::Armed {
            self.state = TimerState::Fired;
            true
        } else {
            false
        }
    }
}

/// Which processes a termination signal reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalScope {
    /// Only the child itself.
    Process,
    /// The child's whole process group. Only valid for a child spawned as a group leader.
    Group,
}

#[cfg(unix)]
fn send_signal(child: &Child, scope: SignalScope, sig: nix::sys::signal::Signal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    let pid = child.id() as i32;
    let target = match scope {
        SignalScope::Process => Pid::from_raw(pid),
        SignalScope::Group => Pid::from_raw(-pid),
    };
    match kill(target, sig) {
        // Exited but not yet reaped, or the group is already empty.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

fn send_graceful(child: &mut Child, scope: SignalScope) -> io::Result<()> {
    #[cfg(unix)]
    {
        send_signal(child, scope, nix::sys::signal::Signal::SIGTERM)
    }
    #[cfg(not(unix))]
    {
        let _ = scope;
        child.kill()
    }
}

fn send_forceful(child: &mut Child, scope: SignalScope) -> io::Result<()> {
    #[cfg(unix)]
    {
        send_signal(child, scope, nix::sys::signal::Signal::SIGKILL)
    }
    #[cfg(not(unix))]
    {
        let _ = scope;
        child.kill()
    }
}

/// SIGTERM, wait up to `grace` for the exit, then SIGKILL and reap. Always returns with the
/// child reaped unless waiting itself fails. With `SignalScope::Group` both signals go to the
/// child's process group, so helpers spawned by a wrapper script are covered too.
pub fn terminate_with_grace(
    child: &mut Child,
    grace: Duration,
    scope: SignalScope,
) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    send_graceful(child, scope)?;

    let mut timer = EscalationTimer::arm(grace);
    match child.wait_timeout(timer.remaining()) {
        Ok(Some(status)) => {
            timer.cancel();
            debug!(%status, pid = child.id(), ?scope, "exited after SIGTERM");
            Ok(status)
        }
        Ok(None) => {
            if timer.fire() {
                warn!(?grace, pid = child.id(), ?scope, "grace period elapsed, sending SIGKILL");
                send_forceful(child, scope)?;
            }
            child.wait()
        }
        Err(e) => {
            timer.fire();
            let _ = send_forceful(child, scope);
            let _ = child.kill();
            let _ = child.wait();
            Err(e)
        }
    }
}
