//! The Replicator engine (§4.2–§4.7): a long-running, resumable,
//! continuous-or-one-shot replication task that batches revisions,
//! negotiates checkpoints with a remote peer, and transports revision
//! changes over HTTP.

pub mod authorizer;
pub mod reachability;
pub mod remote_request;
pub mod replicator;

pub use authorizer::{Authorizer, BasicAuthorizer, PersonaAuthorizer, SessionCookieAuthorizer};
pub use reachability::{is_local_url, Reachability, ReachabilityWatcher};
pub use remote_request::{NotFoundLogging, RemoteRequestHandle, RemoteRequestPool};
pub use replicator::puller::{FeedMode, Puller};
pub use replicator::pusher::Pusher;
pub use replicator::{Direction, Replicator, ReplicatorEvent, ReplicatorOptions, ReplicatorSnapshot};
