//! Emits reachable/unreachable/unknown transitions for a replication target
//! host (§4.3). Local-to-local replication skips this entirely and goes
//! online immediately.

use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Unknown,
    Reachable,
    Unreachable,
}

/// Probes whether a host is currently reachable. The production watcher uses
/// a plain TCP connect; tests substitute a scripted probe.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, host: &str, port: u16) -> bool;
}

/// Connects a TCP socket to `host:port` with a short timeout; success means
/// reachable. DNS/TLS/reachability primitives proper are out of scope (§1) —
/// this is the minimal in-process stand-in the Replicator depends on.
pub struct TcpProbe {
    pub timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait::async_trait]
impl Probe for TcpProbe {
    async fn check(&self, host: &str, port: u16) -> bool {
        let addr = format!("{host}:{port}");
        tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(addr))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}

/// Polls a [`Probe`] on an interval and publishes transitions over a `watch`
/// channel. Dropping the watcher (or cancelling its token) stops the
/// background poll loop.
pub struct ReachabilityWatcher {
    receiver: watch::Receiver<Reachability>,
    cancel: CancellationToken,
}

impl ReachabilityWatcher {
    pub fn start(host: String, port: u16, probe: impl Probe + 'static, poll_interval: Duration) -> Self {
        let (tx, rx) = watch::channel(Reachability::Unknown);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let reachable = probe.check(&host, port).await;
                let next = if reachable {
                    Reachability::Reachable
                } else {
                    Reachability::Unreachable
                };
                // Only notify subscribers on an actual transition.
                if *tx.borrow() != next {
                    if tx.send(next).is_err() {
                        return;
                    }
                }
                tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        });
        Self { receiver: rx, cancel }
    }

    /// A watcher that immediately reports reachable and never changes;
    /// used for local-to-local replication, which skips reachability
    /// tracking per §4.3.
    pub fn always_reachable() -> Self {
        let (_tx, rx) = watch::channel(Reachability::Reachable);
        Self {
            receiver: rx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Reachability> {
        self.receiver.clone()
    }

    pub fn current(&self) -> Reachability {
        *self.receiver.borrow()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ReachabilityWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Whether `url` is handled by an in-process protocol (i.e. replication
/// between two local databases), which bypasses reachability tracking
/// altogether and goes online immediately.
pub fn is_local_url(url: &Url) -> bool {
    matches!(url.scheme(), "local" | "couchbaselite")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedProbe {
        calls: Arc<AtomicUsize>,
        results: Vec<bool>,
    }

    #[async_trait::async_trait]
    impl Probe for ScriptedProbe {
        async fn check(&self, _host: &str, _port: u16) -> bool {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.get(i).copied().unwrap_or(*self.results.last().unwrap())
        }
    }

    #[tokio::test]
    async fn watcher_reports_reachable_then_unreachable_transition() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = ScriptedProbe {
            calls: calls.clone(),
            results: vec![true, false],
        };
        let watcher =
            ReachabilityWatcher::start("example.invalid".into(), 80, probe, Duration::from_millis(10));
        let mut rx = watcher.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Reachability::Reachable);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Reachability::Unreachable);
    }

    #[test]
    fn local_scheme_is_recognized() {
        assert!(is_local_url(&Url::parse("local://db").unwrap()));
        assert!(!is_local_url(&Url::parse("http://example.com/db").unwrap()));
    }
}
