//! Fan-out of per-database change notifications to subscribers (§4, "ChangeFeed
//! broker"), following the observer pattern of §9: a broadcast channel per
//! database, subscribers get owned copies, cancellation is just dropping the
//! receiver.

use sync_core::{ChangeReceiver, RevisionRef};
use tokio::sync::broadcast;

/// Default ring-buffer size for the underlying broadcast channel. A slow
/// subscriber (e.g. a stalled continuous `_changes` connection) that falls
/// more than this many revisions behind will observe a `Lagged` error on its
/// next `recv` and must resynchronize via `changesSince`; this mirrors
/// real CouchDB connections, which likewise expect reconnecting clients to
/// replay from `since` rather than guarantee unbounded server-side buffering.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Owns the sending half of a database's change-notification broadcast
/// channel. A concrete `Database` implementation holds one of these and
/// calls [`ChangeBroker::publish`] after every committed revision; the
/// Router's `_changes` handlers and the Pusher's `beginReplicating` both
/// subscribe via [`ChangeBroker::subscribe`].
#[derive(Clone)]
pub struct ChangeBroker {
    sender: broadcast::Sender<RevisionRef>,
}

impl ChangeBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Notifies all current subscribers of a committed revision. A result of
    /// zero active subscribers is not an error — it just means nobody is
    /// watching right now.
    pub fn publish(&self, rev: RevisionRef) {
        // `send` only errs when there are no receivers; that's expected and
        // not worth logging on every quiet database.
        let _ = self.sender.send(rev);
    }

    pub fn subscribe(&self) -> ChangeReceiver {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn subscribers_receive_published_revisions_in_order() {
        let broker = ChangeBroker::new();
        let mut sub_a = broker.subscribe();
        let mut sub_b = broker.subscribe();

        broker.publish(RevisionRef::new("doc1", "1-aaa"));
        broker.publish(RevisionRef::new("doc1", "2-bbb"));

        for sub in [&mut sub_a, &mut sub_b] {
            let first = sub.recv().await.unwrap();
            assert_eq!(first.rev_id, "1-aaa");
            let second = sub.recv().await.unwrap();
            assert_eq!(second.rev_id, "2-bbb");
        }
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_panic() {
        let broker = ChangeBroker::new();
        broker.publish(RevisionRef::new("doc1", "1-aaa"));
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropping_receiver_unsubscribes() {
        let broker = ChangeBroker::new();
        let sub = broker.subscribe();
        assert_eq!(broker.subscriber_count(), 1);
        drop(sub);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn overflowing_capacity_reports_lagged_rather_than_silently_dropping() {
        let broker = ChangeBroker::with_capacity(2);
        let mut sub = broker.subscribe();
        broker.publish(RevisionRef::new("d", "1-a"));
        broker.publish(RevisionRef::new("d", "2-b"));
        broker.publish(RevisionRef::new("d", "3-c"));

        let err = sub.recv().await.unwrap_err();
        assert!(matches!(err, RecvError::Lagged(1)));
    }
}
