//! Tracks in-flight HTTP requests issued by one Replicator so they can all
//! be cancelled together on `stop()` (§4.2).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A single slot in the pool. Holding this alive keeps the request registered;
/// dropping it (normally via [`RemoteRequestPool::deregister`]) removes it.
pub struct RemoteRequestHandle {
    id: u64,
    pub cancel: CancellationToken,
}

impl RemoteRequestHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Whether a 404 from this request should be logged. `fetchRemoteCheckpointDoc`
/// opts out, since an absent checkpoint is an expected first-replication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundLogging {
    Log,
    Suppress,
}

#[derive(Default)]
pub struct RemoteRequestPool {
    next_id: AtomicU64,
    // Cancellation tokens for every currently-registered request.
    inflight: Mutex<HashMap<u64, CancellationToken>>,
}

impl RemoteRequestPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new in-flight request and returns a handle good for one
    /// call; the caller must `deregister` it when the request completes
    /// (successfully, with an error, or because it was cancelled).
    pub fn register(&self) -> RemoteRequestHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.inflight.lock().unwrap().insert(id, cancel.clone());
        RemoteRequestHandle { id, cancel }
    }

    pub fn deregister(&self, handle: &RemoteRequestHandle) {
        self.inflight.lock().unwrap().remove(&handle.id);
    }

    pub fn len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots and clears the set before cancelling each member, so a
    /// cancellation callback that re-enters `register`/`deregister` can never
    /// observe or mutate the map we're iterating.
    pub fn stop_all(&self) {
        let snapshot: Vec<CancellationToken> = {
            let mut map = self.inflight.lock().unwrap();
            std::mem::take(&mut *map).into_values().collect()
        };
        for cancel in snapshot {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_all_cancels_every_registered_request_and_clears_the_set() {
        let pool = RemoteRequestPool::new();
        let a = pool.register();
        let b = pool.register();
        assert_eq!(pool.len(), 2);

        pool.stop_all();

        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn deregister_removes_only_the_named_handle() {
        let pool = RemoteRequestPool::new();
        let a = pool.register();
        let _b = pool.register();
        pool.deregister(&a);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn stop_all_snapshot_cannot_be_reentered_by_a_cancel_callback() {
        // stop_all takes the map's contents before cancelling, so even if a
        // cancellation somehow triggered another register/deregister call,
        // it would operate on a fresh, empty map rather than the iterator
        // we're currently draining.
        let pool = RemoteRequestPool::new();
        let _a = pool.register();
        pool.stop_all();
        let c = pool.register();
        assert_eq!(pool.len(), 1);
        assert!(!c.is_cancelled());
    }
}
