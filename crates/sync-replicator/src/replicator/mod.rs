//! The abstract Replicator lifecycle (§4.5): startup, session/checkpoint
//! negotiation, the online/offline/active state machine, coalesced
//! checkpoint saving, and retry. [`Pusher`](super::pusher::Pusher) and
//! [`Puller`](super::puller::Puller) plug in the direction-specific halves
//! (`beginReplicating` / `processInbox`).

pub mod puller;
pub mod pusher;

use crate::authorizer::Authorizer;
use crate::reachability::{is_local_url, Reachability, ReachabilityWatcher};
use crate::remote_request::{NotFoundLogging, RemoteRequestPool};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use sync_batcher::Batcher;
use sync_core::{checkpoint_id, CheckpointInputs, Database, RemoteCheckpoint, RevisionRef, SyncError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use url::Url;

const BATCHER_CAPACITY: usize = 100;
const BATCHER_DELAY: Duration = Duration::from_millis(500);
const RETRY_DELAY: Duration = Duration::from_secs(60);
const CHECKPOINT_COALESCE_WINDOW: Duration = Duration::from_secs(5);

static SESSION_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(1));

fn next_session_id() -> String {
    let n = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("repl{n:03}")
}

/// `Url::join` resolves relative references against the *directory* of the
/// base path, so a db root passed in without a trailing slash (e.g.
/// `http://host/db`, the natural way to write one) would have its last path
/// segment silently dropped by every `.join("_local/...")`/`.join("_bulk_docs")`
/// call below. Every remote request goes through a `Replicator` constructed
/// with this normalized form so that never happens.
fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[derive(Debug, Clone, Default)]
pub struct ReplicatorOptions {
    pub reset: bool,
    pub create_target: bool,
    pub filter: Option<String>,
    pub query_params: Option<serde_json::Value>,
    pub continuous: bool,
    pub headers: HashMap<String, String>,
}

/// A point-in-time view of [`ReplicatorState`] (§3), cheap to clone for
/// `_active_tasks` snapshots and progress notifications.
#[derive(Debug, Clone)]
pub struct ReplicatorSnapshot {
    pub session_id: String,
    pub push: bool,
    pub running: bool,
    pub online: bool,
    pub active: bool,
    pub last_sequence: u64,
    pub async_task_count: u64,
    pub revisions_failed: u64,
    pub changes_processed: u64,
    pub changes_total: u64,
    pub error: Option<String>,
}

struct ReplicatorState {
    running: bool,
    online: bool,
    active: bool,
    last_sequence: u64,
    last_sequence_changed: bool,
    async_task_count: u64,
    revisions_failed: u64,
    changes_processed: u64,
    changes_total: u64,
    error: Option<String>,
}

impl ReplicatorState {
    fn new() -> Self {
        Self {
            running: false,
            online: false,
            active: false,
            last_sequence: 0,
            last_sequence_changed: false,
            async_task_count: 0,
            revisions_failed: 0,
            changes_processed: 0,
            changes_total: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ReplicatorEvent {
    Progress(ReplicatorSnapshot),
    Stopped(ReplicatorSnapshot),
}

#[derive(Default)]
struct CheckpointSaveState {
    in_flight: bool,
    overdue: bool,
}

/// The direction-specific half of a Replicator: how to seed and drain the
/// shared batcher. Implemented by [`pusher::Pusher`] and [`puller::Puller`].
#[async_trait]
pub trait Direction: Send + Sync {
    /// Subscribes to whatever change source this direction watches and
    /// seeds the replicator's batcher with anything already pending past
    /// `lastSequence`.
    async fn begin_replicating(&self, repl: &Arc<Replicator>) -> Result<(), SyncError>;

    /// Drains one batch from the inbox.
    async fn process_inbox(&self, repl: &Arc<Replicator>, revs: Vec<RevisionRef>);

    /// Subclass-specific retry: re-arm whatever `begin_replicating` set up,
    /// and reset `revisionsFailed`.
    async fn retry(&self, repl: &Arc<Replicator>);
}

pub struct Replicator {
    db: Arc<dyn Database>,
    client: reqwest::Client,
    authorizer: RwLock<Arc<dyn Authorizer>>,
    remote_url: Url,
    push: bool,
    checkpoint_id: String,
    options: ReplicatorOptions,
    request_pool: RemoteRequestPool,
    state: Mutex<ReplicatorState>,
    events: broadcast::Sender<ReplicatorEvent>,
    stop_token: CancellationToken,
    remote_checkpoint: Mutex<Option<RemoteCheckpoint>>,
    checkpoint_save: Mutex<CheckpointSaveState>,
    reachability: Mutex<Option<ReachabilityWatcher>>,
    session_id: String,
    // Set once the batcher is constructed in `start`; direction impls
    // enqueue into it via `Replicator::queue`/`queue_many`.
    batcher: once_cell::sync::OnceCell<Batcher<RevisionRef>>,
    direction: Box<dyn Direction>,
}

impl Replicator {
    pub fn new(
        db: Arc<dyn Database>,
        client: reqwest::Client,
        remote_url: Url,
        push: bool,
        options: ReplicatorOptions,
        authorizer: Option<Arc<dyn Authorizer>>,
        direction: Box<dyn Direction>,
    ) -> Arc<Self> {
        let remote_url = ensure_trailing_slash(remote_url);
        let authorizer = authorizer
            .or_else(|| {
                crate::authorizer::BasicAuthorizer::from_url(&remote_url)
                    .map(|a| Arc::new(a) as Arc<dyn Authorizer>)
            })
            .unwrap_or_else(|| Arc::new(NullAuthorizer) as Arc<dyn Authorizer>);

        let inputs = CheckpointInputs {
            local_uuid: &db.private_uuid(),
            remote_url: remote_url.as_str(),
            push,
            filter: options.filter.as_deref(),
            filter_params: options.query_params.as_ref(),
        };
        let checkpoint_id = checkpoint_id(&inputs);
        let (events, _) = broadcast::channel(32);

        Arc::new(Self {
            db,
            client,
            authorizer: RwLock::new(authorizer),
            remote_url,
            push,
            checkpoint_id,
            options,
            request_pool: RemoteRequestPool::new(),
            state: Mutex::new(ReplicatorState::new()),
            events,
            stop_token: CancellationToken::new(),
            remote_checkpoint: Mutex::new(None),
            checkpoint_save: Mutex::new(CheckpointSaveState::default()),
            reachability: Mutex::new(None),
            session_id: next_session_id(),
            batcher: once_cell::sync::OnceCell::new(),
            direction,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn checkpoint_id(&self) -> &str {
        &self.checkpoint_id
    }

    pub fn push(&self) -> bool {
        self.push
    }

    pub fn remote_url(&self) -> &Url {
        &self.remote_url
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// A cheap handle (clone of the shared connection pool) for building
    /// `RequestBuilder`s that [`Replicator::send`] will then authorize,
    /// register, and dispatch.
    pub fn http_client(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub fn options(&self) -> &ReplicatorOptions {
        &self.options
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplicatorEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ReplicatorSnapshot {
        let s = self.state.lock().unwrap();
        ReplicatorSnapshot {
            session_id: self.session_id.clone(),
            push: self.push,
            running: s.running,
            online: s.online,
            active: s.active,
            last_sequence: s.last_sequence,
            async_task_count: s.async_task_count,
            revisions_failed: s.revisions_failed,
            changes_processed: s.changes_processed,
            changes_total: s.changes_total,
            error: s.error.clone(),
        }
    }

    /// Whether these settings are the same as another token (its
    /// `checkpointID`); used by `POST /_replicate` with `cancel:true`.
    pub fn has_same_settings_as(&self, other_checkpoint_id: &str) -> bool {
        self.checkpoint_id == other_checkpoint_id
    }

    // ---- Startup (§4.5) ----

    pub async fn start(self: &Arc<Self>) {
        {
            let mut s = self.state.lock().unwrap();
            if s.running {
                return;
            }
            s.running = true;
        }

        if self.options.reset {
            self.db.set_last_sequence(&self.checkpoint_id, "0".to_string());
            *self.remote_checkpoint.lock().unwrap() = None;
        }

        self.db.add_active_replicator(&self.checkpoint_id);

        let batcher = {
            let repl = Arc::clone(self);
            Batcher::new(BATCHER_CAPACITY, BATCHER_DELAY, move |revs| {
                let repl = Arc::clone(&repl);
                async move { repl.process_inbox(revs).await }
            })
        };
        let _ = self.batcher.set(batcher);

        if is_local_url(&self.remote_url) {
            self.go_online().await;
        } else {
            let host = self.remote_url.host_str().unwrap_or_default().to_string();
            let port = self
                .remote_url
                .port_or_known_default()
                .unwrap_or(443);
            let watcher = ReachabilityWatcher::start(
                host,
                port,
                crate::reachability::TcpProbe::default(),
                Duration::from_secs(15),
            );
            let mut sub = watcher.subscribe();
            *self.reachability.lock().unwrap() = Some(watcher);

            let repl = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = repl.stop_token.cancelled() => return,
                        changed = sub.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            let reachability = *sub.borrow();
                            match reachability {
                                Reachability::Reachable => repl.go_online().await,
                                Reachability::Unreachable => repl.go_offline(),
                                Reachability::Unknown => {}
                            }
                        }
                    }
                }
            });
        }
    }

    async fn go_online(self: &Arc<Self>) {
        {
            let mut s = self.state.lock().unwrap();
            if s.online {
                return;
            }
            s.online = true;
        }
        if let Err(err) = self.check_session().await {
            if !err.is_cancelled() {
                self.record_error(&err);
            }
            return;
        }
        if let Err(err) = self.fetch_remote_checkpoint_doc().await {
            if !err.is_cancelled() {
                self.record_error(&err);
            }
            return;
        }
        if let Err(err) = self.direction.begin_replicating(self).await {
            if !err.is_cancelled() {
                self.record_error(&err);
            }
        }
    }

    fn go_offline(&self) {
        let mut s = self.state.lock().unwrap();
        s.online = false;
        drop(s);
        self.request_pool.stop_all();
    }

    /// If the authorizer has no login capability, skip straight to the
    /// checkpoint fetch. Otherwise `GET /_session`, retrying at the relative
    /// path on 404 (bare CouchDB vs. a gateway mounting it elsewhere); log in
    /// if not already authenticated.
    async fn check_session(self: &Arc<Self>) -> Result<(), SyncError> {
        let authorizer = self.authorizer.read().unwrap().clone();
        let Some(login_path) = authorizer.login_path_for_site(&self.remote_url) else {
            return Ok(());
        };

        let session_url = self
            .remote_url
            .join("_session")
            .map_err(|e| SyncError::BadRequest(e.to_string()))?;
        let response = self.send(self.client.get(session_url.clone())).await;
        let needs_login = match response {
            Ok(resp) if resp.status() == StatusCode::NOT_FOUND => true,
            Ok(resp) => {
                let body: serde_json::Value = resp.json().await.unwrap_or_default();
                body.get("userCtx")
                    .and_then(|u| u.get("name"))
                    .and_then(|n| n.as_str())
                    .is_none()
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(_) => true,
        };

        if !needs_login {
            return Ok(());
        }

        let login_url = self
            .remote_url
            .join(&login_path)
            .map_err(|e| SyncError::BadRequest(e.to_string()))?;
        let params = authorizer.login_parameters_for_site(&self.remote_url);
        let mut builder = self.client.post(login_url);
        if let Some(params) = params {
            builder = builder.json(&params);
        }
        let resp = self.send(builder).await?;
        authorizer.adopt_response_credentials(resp.headers());
        Ok(())
    }

    /// `GET _local/<checkpointID>`. A 404 is treated as "absent" (allows the
    /// Pusher's `maybeCreateRemoteDB` to proceed). On a mismatch between the
    /// remote and local sequence, the safer choice wins: start from `0`
    /// rather than trusting either side (§4.5, §9 open question — implemented
    /// as specified rather than re-litigated).
    async fn fetch_remote_checkpoint_doc(self: &Arc<Self>) -> Result<(), SyncError> {
        let url = self.checkpoint_url()?;
        let resp = self
            .send_logged(self.client.get(url), NotFoundLogging::Suppress)
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            self.set_last_sequence(0);
            return Ok(());
        }
        if !resp.status().is_success() {
            return Err(SyncError::Network(format!(
                "unexpected status fetching remote checkpoint: {}",
                resp.status()
            )));
        }

        let remote: RemoteCheckpoint = resp
            .json()
            .await
            .map_err(|e| SyncError::BadJson(e.to_string()))?;
        let remote_seq: u64 = remote.last_sequence.parse().unwrap_or(0);
        let local_seq = self
            .db
            .last_sequence_with_checkpoint_id(&self.checkpoint_id)
            .await
            .and_then(|s| s.parse::<u64>().ok());

        match local_seq {
            Some(local_seq) if local_seq == remote_seq => {
                self.set_last_sequence(local_seq);
            }
            Some(_) => {
                tracing::warn!(
                    checkpoint_id = %self.checkpoint_id,
                    remote_seq,
                    "remote and local checkpoint disagree; restarting from 0"
                );
                self.set_last_sequence(0);
            }
            None => {
                // Local is unknown: the remote is the only source of truth.
                self.set_last_sequence(remote_seq);
            }
        }
        *self.remote_checkpoint.lock().unwrap() = Some(remote);
        Ok(())
    }

    fn checkpoint_url(&self) -> Result<Url, SyncError> {
        self.remote_url
            .join(&format!("_local/{}", self.checkpoint_id))
            .map_err(|e| SyncError::BadRequest(e.to_string()))
    }

    fn set_last_sequence(&self, seq: u64) {
        let mut s = self.state.lock().unwrap();
        s.last_sequence = seq;
    }

    pub fn last_sequence(&self) -> u64 {
        self.state.lock().unwrap().last_sequence
    }

    /// Advances `lastSequence` monotonically. Per §4.5/§4.6/§4.7, callers
    /// must never call this past a gap left by a failed revision.
    pub fn advance_last_sequence(&self, seq: u64) {
        let mut s = self.state.lock().unwrap();
        if seq > s.last_sequence {
            s.last_sequence = seq;
            s.last_sequence_changed = true;
        }
        drop(s);
        self.schedule_checkpoint_save();
    }

    pub fn record_revision_failed(&self) {
        let mut s = self.state.lock().unwrap();
        s.revisions_failed += 1;
    }

    pub fn record_changes_processed(&self, n: u64) {
        let mut s = self.state.lock().unwrap();
        s.changes_processed += n;
    }

    pub fn record_changes_total(&self, n: u64) {
        let mut s = self.state.lock().unwrap();
        s.changes_total += n;
    }

    fn record_error(&self, err: &SyncError) {
        let mut s = self.state.lock().unwrap();
        s.error = Some(err.to_string());
        drop(s);
        self.emit_progress();
    }

    // ---- Active tracking (§4.5, §8 invariant) ----

    pub async fn enqueue(self: &Arc<Self>, rev: RevisionRef) {
        if let Some(batcher) = self.batcher.get() {
            batcher.queue(rev);
        }
        self.refresh_active().await;
    }

    pub async fn enqueue_many(self: &Arc<Self>, revs: Vec<RevisionRef>) {
        if revs.is_empty() {
            return;
        }
        if let Some(batcher) = self.batcher.get() {
            batcher.queue_many(revs);
        }
        self.refresh_active().await;
    }

    async fn refresh_active(self: &Arc<Self>) {
        let batcher_count = match self.batcher.get() {
            Some(b) => b.count().await,
            None => 0,
        };
        let async_count = self.state.lock().unwrap().async_task_count;
        let active = batcher_count > 0 || async_count > 0;
        let changed = {
            let mut s = self.state.lock().unwrap();
            let changed = s.active != active;
            s.active = active;
            changed
        };
        if changed {
            self.emit_progress();
            if !active && !self.options.continuous {
                self.maybe_stop_when_idle().await;
            }
        }
    }

    fn begin_async_task(&self) {
        let mut s = self.state.lock().unwrap();
        s.async_task_count += 1;
        s.active = true;
    }

    async fn end_async_task(self: &Arc<Self>) {
        {
            let mut s = self.state.lock().unwrap();
            s.async_task_count = s.async_task_count.saturating_sub(1);
        }
        self.refresh_active().await;
    }

    async fn maybe_stop_when_idle(self: &Arc<Self>) {
        let revisions_failed = self.state.lock().unwrap().revisions_failed;
        if revisions_failed > 0 {
            self.schedule_retry();
        }
        let still_running = self.state.lock().unwrap().running;
        if still_running && !self.stop_token.is_cancelled() {
            // Non-continuous replicators that have drained become Stopped.
            self.finish_stop().await;
        }
    }

    fn schedule_retry(self: &Arc<Self>) {
        let repl = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = repl.stop_token.cancelled() => {}
                _ = tokio::time::sleep(RETRY_DELAY) => {
                    repl.retry_if_ready().await;
                }
            }
        });
    }

    async fn retry_if_ready(self: &Arc<Self>) {
        let online = self.state.lock().unwrap().online;
        if !online {
            return;
        }
        self.direction.retry(self).await;
        let mut s = self.state.lock().unwrap();
        s.revisions_failed = 0;
    }

    // ---- processInbox dispatch ----

    async fn process_inbox(self: &Arc<Self>, revs: Vec<RevisionRef>) {
        if revs.is_empty() {
            self.refresh_active().await;
            return;
        }
        self.begin_async_task();
        self.direction.process_inbox(self, revs).await;
        self.end_async_task().await;
    }

    // ---- Checkpoint save (§4.5, coalesced) ----

    fn schedule_checkpoint_save(self: &Arc<Self>) {
        let already_in_flight = {
            let mut save = self.checkpoint_save.lock().unwrap();
            if save.in_flight {
                save.overdue = true;
                return;
            }
            save.in_flight = true;
            false
        };
        debug_assert!(!already_in_flight);
        let repl = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(CHECKPOINT_COALESCE_WINDOW).await;
            repl.save_last_sequence().await;
        });
    }

    async fn save_last_sequence(self: &Arc<Self>) {
        loop {
            let should_save = {
                let s = self.state.lock().unwrap();
                s.last_sequence_changed
            };
            if should_save {
                let seq = self.state.lock().unwrap().last_sequence;
                let result = self.put_checkpoint(seq).await;
                match result {
                    Ok(rev) => {
                        self.db
                            .set_last_sequence(&self.checkpoint_id, seq.to_string());
                        let mut cp = self.remote_checkpoint.lock().unwrap();
                        let doc = cp.get_or_insert_with(|| RemoteCheckpoint::new(seq.to_string()));
                        doc.last_sequence = seq.to_string();
                        doc.rev = Some(rev);
                        let mut s = self.state.lock().unwrap();
                        s.last_sequence_changed = false;
                    }
                    Err(err) => {
                        if !err.is_cancelled() {
                            tracing::warn!(error = %err, "checkpoint save failed; local mirror kept, will retry on next sequence change");
                        }
                        // Do not retry immediately; a later advance re-arms us.
                        break;
                    }
                }
            }

            let mut save = self.checkpoint_save.lock().unwrap();
            if save.overdue {
                save.overdue = false;
                drop(save);
                continue;
            }
            save.in_flight = false;
            break;
        }
    }

    async fn put_checkpoint(&self, seq: u64) -> Result<String, SyncError> {
        let url = self.checkpoint_url()?;
        let mut doc = self
            .remote_checkpoint
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| RemoteCheckpoint::new(seq.to_string()));
        doc.last_sequence = seq.to_string();

        let resp = self.send(self.client.put(url).json(&doc)).await?;
        if !resp.status().is_success() {
            return Err(SyncError::Network(format!(
                "checkpoint PUT failed: {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SyncError::BadJson(e.to_string()))?;
        Ok(body
            .get("rev")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// Called when the database reference is about to be cleared while a
    /// save is outstanding: writes the local mirror immediately so the
    /// sequence isn't lost even though the remote PUT may not have landed.
    fn flush_local_checkpoint_mirror(&self) {
        let s = self.state.lock().unwrap();
        if s.last_sequence_changed {
            self.db
                .set_last_sequence(&self.checkpoint_id, s.last_sequence.to_string());
        }
    }

    // ---- Stop (§4.5, §5 cancellation) ----

    pub async fn stop(self: &Arc<Self>) {
        {
            let mut s = self.state.lock().unwrap();
            if !s.running {
                return;
            }
        }
        self.stop_token.cancel();
        if let Some(batcher) = self.batcher.get() {
            batcher.flush_all().await;
        }
        self.request_pool.stop_all();
        if let Some(watcher) = self.reachability.lock().unwrap().take() {
            watcher.stop();
        }
        self.finish_stop().await;
    }

    async fn finish_stop(self: &Arc<Self>) {
        self.flush_local_checkpoint_mirror();
        self.db.remove_active_replicator(&self.checkpoint_id);
        let mut s = self.state.lock().unwrap();
        s.running = false;
        s.online = false;
        s.active = false;
        drop(s);
        let snapshot = self.snapshot();
        let _ = self.events.send(ReplicatorEvent::Stopped(snapshot));
    }

    fn emit_progress(&self) {
        let snapshot = self.snapshot();
        let _ = self.events.send(ReplicatorEvent::Progress(snapshot));
    }

    // ---- HTTP plumbing shared by Pusher/Puller (§4.2) ----

    /// Sends a request through the authorizer and the request pool,
    /// swallowing cancellation as a `Cancelled` error per §4.5's error
    /// filtering. 404s are logged unless the caller opts out (§4.2) — used
    /// by [`Replicator::fetch_remote_checkpoint_doc`], which treats a
    /// missing checkpoint document as a routine, expected outcome.
    pub(crate) async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SyncError> {
        self.send_logged(builder, NotFoundLogging::Log).await
    }

    pub(crate) async fn send_logged(
        &self,
        builder: reqwest::RequestBuilder,
        not_found_logging: NotFoundLogging,
    ) -> Result<reqwest::Response, SyncError> {
        let authorizer = self.authorizer.read().unwrap().clone();
        let builder = authorizer.authorize_request(builder);
        let handle = self.request_pool.register();

        let result = tokio::select! {
            _ = handle.cancel.cancelled() => Err(SyncError::Cancelled),
            result = builder.send() => result.map_err(|e| SyncError::Network(e.to_string())),
        };
        self.request_pool.deregister(&handle);

        match result {
            Ok(resp) => {
                if resp.status() != StatusCode::UNAUTHORIZED {
                    authorizer.adopt_response_credentials(resp.headers());
                }
                if resp.status() == StatusCode::NOT_FOUND
                    && matches!(not_found_logging, NotFoundLogging::Log)
                {
                    tracing::debug!(url = %resp.url(), checkpoint_id = %self.checkpoint_id, "remote request returned 404");
                }
                Ok(resp)
            }
            Err(err) => Err(err),
        }
    }
}

/// No-op authorizer used when neither an explicit one nor URL userinfo is
/// available.
struct NullAuthorizer;
impl Authorizer for NullAuthorizer {
    fn authorize_request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_monotonic_and_formatted() {
        let a = next_session_id();
        let b = next_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("repl"));
    }
}
