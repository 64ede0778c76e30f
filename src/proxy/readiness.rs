//! Connect-and-retry readiness probe for the engine's listen port.
use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// Bounds for the readiness poll. The right values depend on the host (first start of the
/// engine generates its CA and can take seconds), so every field is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Overall deadline before the engine is declared not ready.
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-attempt connect timeout.
    pub connect_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(500),
            connect_timeout: Duration::from_millis(250),
        }
    }
}

impl ReadinessPolicy {
    /// Backoff before attempt `n` (0-based): doubles from `initial_backoff`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug)]
pub enum Readiness {
    Ready { attempts: u32 },
    /// The process exited before accepting connections.
    Exited(ExitStatus),
    TimedOut,
}

fn port_accepts(port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, timeout).is_ok()
}

/// True when nothing listens on `port`, on loopback or on the wildcard address. Checked before
/// the engine is spawned so a foreign listener is never mistaken for it.
pub fn port_is_free(port: u16) -> bool {
    [Ipv4Addr::LOCALHOST, Ipv4Addr::UNSPECIFIED]
        .into_iter()
        .all(|ip| TcpListener::bind((ip, port)).is_ok())
}

/// Poll until `port` accepts a TCP connection, the process reported by `exited` is gone, or the
/// policy deadline passes. `exited` is checked before every attempt and again after a
/// successful connect, so a listener that outlived the process does not count.
pub fn wait_until_ready<F>(port: u16, policy: &ReadinessPolicy, mut exited: F) -> io::Result<Readiness>
where
    F: FnMut() -> io::Result<Option<ExitStatus>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        if let Some(status) = exited()? {
            debug!(port, attempt, ?status, "engine exited before becoming ready");
            return Ok(Readiness::Exited(status));
        }
        if port_accepts(port, policy.connect_timeout) {
            if let Some(status) = exited()? {
                debug!(port, ?status, "port accepted but engine already exited");
                return Ok(Readiness::Exited(status));
            }
            debug!(port, attempts = attempt + 1, "engine accepting connections");
            return Ok(Readiness::Ready {
                attempts: attempt + 1,
            });
        }
        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Ok(Readiness::TimedOut);
        }
        let pause = policy.backoff(attempt).min(policy.timeout - elapsed);
        trace!(port, attempt, ?pause, "engine not ready yet");
        std::thread::sleep(pause);
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = ReadinessPolicy::default();
        assert_eq!(p.backoff(0), Duration::from_millis(50));
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(500));
        assert_eq!(p.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn test_ready_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let r = wait_until_ready(port, &ReadinessPolicy::default(), || Ok(None)).expect("probe");
        assert!(matches!(r, Readiness::Ready { attempts: 1 }));
    }

    #[cfg(unix)]
    #[test]
    fn test_listener_without_live_process_is_not_ready() {
        use std::os::unix::process::ExitStatusExt;
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        // Alive before the connect, gone right after it.
        let mut calls = 0;
        let r = wait_until_ready(port, &ReadinessPolicy::default(), || {
            calls += 1;
            Ok((calls > 1).then(|| ExitStatus::from_raw(1 << 8)))
        })
        .expect("poll");
        assert!(matches!(r, Readiness::Exited(s) if s.code() == Some(1)), "{r:?}");
    }

    #[test]
    fn test_port_is_free_sees_foreign_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        assert!(!port_is_free(port));
        drop(listener);
        assert!(port_is_free(port));
    }

    #[test]
    fn test_times_out_when_nothing_listens() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").expect("bind");
            l.local_addr().expect("addr").port()
        };
        let policy = ReadinessPolicy {
            timeout: Duration::from_millis(300),
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(50),
            connect_timeout: Duration::from_millis(50),
        };
        let started = Instant::now();
        let r = wait_until_ready(port, &policy, || Ok(None)).expect("probe");
        assert!(matches!(r, Readiness::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
