//! Shared application state threaded through every handler (§4.8).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use sync_core::{Database, SyncError};
use sync_replicator::Replicator;

/// Produces a concrete [`Database`] for a newly created database name. The
/// Router never constructs a store itself (§1 "Out of scope"); the gateway
/// binary supplies whatever factory wires up its storage engine.
pub trait DatabaseFactory: Send + Sync {
    fn create(&self, name: &str) -> Arc<dyn Database>;
}

#[derive(Clone)]
pub struct AppState {
    pub(crate) databases: Arc<RwLock<HashMap<String, Arc<dyn Database>>>>,
    pub(crate) factory: Arc<dyn DatabaseFactory>,
    /// Running replicators keyed by checkpointID, mirroring the
    /// `addActiveReplicator`/`activeReplicatorLike` index each `Database`
    /// exposes, but at the process level so `/_active_tasks` and
    /// `POST /_replicate?cancel=true` can enumerate across every database.
    pub(crate) replicators: Arc<RwLock<HashMap<String, Arc<Replicator>>>>,
    pub(crate) http_client: reqwest::Client,
    server_start: std::time::Instant,
    uuid_counter: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(factory: Arc<dyn DatabaseFactory>) -> Self {
        Self {
            databases: Arc::new(RwLock::new(HashMap::new())),
            factory,
            replicators: Arc::new(RwLock::new(HashMap::new())),
            http_client: reqwest::Client::new(),
            server_start: std::time::Instant::now(),
            uuid_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers an already-constructed database (used by the gateway binary
    /// at startup, and by tests to seed fixtures directly).
    pub fn insert_database(&self, name: impl Into<String>, db: Arc<dyn Database>) {
        self.databases.write().unwrap().insert(name.into(), db);
    }

    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_database(&self, name: &str) -> Result<Arc<dyn Database>, SyncError> {
        self.databases
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("database {name} does not exist")))
    }

    pub fn database_exists(&self, name: &str) -> bool {
        self.databases.read().unwrap().contains_key(name)
    }

    pub fn create_database(&self, name: &str) -> Result<(), SyncError> {
        let mut dbs = self.databases.write().unwrap();
        if dbs.contains_key(name) {
            return Err(SyncError::Duplicate(format!("database {name} already exists")));
        }
        dbs.insert(name.to_string(), self.factory.create(name));
        Ok(())
    }

    pub fn delete_database(&self, name: &str) -> Result<(), SyncError> {
        self.databases
            .write()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SyncError::NotFound(format!("database {name} does not exist")))
    }

    pub fn register_replicator(&self, repl: Arc<Replicator>) {
        self.replicators
            .write()
            .unwrap()
            .insert(repl.checkpoint_id().to_string(), repl);
    }

    pub fn unregister_replicator(&self, checkpoint_id: &str) {
        self.replicators.write().unwrap().remove(checkpoint_id);
    }

    pub fn find_replicator_by_checkpoint(&self, checkpoint_id: &str) -> Option<Arc<Replicator>> {
        self.replicators.read().unwrap().get(checkpoint_id).cloned()
    }

    pub fn all_replicators(&self) -> Vec<Arc<Replicator>> {
        self.replicators.read().unwrap().values().cloned().collect()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.server_start.elapsed().as_secs()
    }

    pub fn next_uuid(&self) -> String {
        // The counter makes successive UUIDs distinguishable even if two
        // are minted within the same nanosecond; the value itself is a v4,
        // not a counter-derived ID.
        self.uuid_counter.fetch_add(1, Ordering::Relaxed);
        uuid::Uuid::new_v4().simple().to_string()
    }
}
