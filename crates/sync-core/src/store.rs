use crate::error::SyncError;
use crate::options::{ChangesOptions, QueryOptions};
use crate::revision::{RevisionList, RevisionRef};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Change notifications are fanned out as owned [`RevisionRef`] copies over a
/// broadcast channel; the sending half lives in `sync-changes`' `ChangeBroker`,
/// which a concrete [`Database`] implementation owns and feeds on every
/// commit.
pub type ChangeReceiver = tokio::sync::broadcast::Receiver<RevisionRef>;

/// One row of an `_all_docs` / view response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocRow {
    pub id: String,
    pub key: Value,
    pub rev: String,
    pub deleted: bool,
    pub doc: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct AllDocsResult {
    pub rows: Vec<DocRow>,
    pub total_rows: u64,
    pub offset: u64,
    pub update_seq: Option<u64>,
}

/// One revision leaf as returned by `open_revs=all`/`open_revs=[...]`.
#[derive(Debug, Clone)]
pub enum OpenRevResult {
    Ok(RevisionRef),
    Missing(String),
}

/// Metadata for one attachment on a revision, as embedded under `_attachments`
/// in a document body and used to drive multipart streaming / `atts_since`
/// elision. The attachment blob store itself is out of scope (§1); this is
/// just the contract the Router reads to decide what to stream.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AttachmentMeta {
    pub content_type: String,
    pub length: u64,
    /// The generation at which this attachment was last written; `atts_since`
    /// elides attachments whose `revpos <= commonAncestorGen`.
    pub revpos: u64,
}

/// A fetched attachment blob alongside its declared content type.
pub struct AttachmentBlob {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// The contract the embedded storage engine (revision tree, attachment blob
/// store, view indexer) must satisfy. This crate never implements it — it is
/// the external collaborator described in §1 "Out of scope" — but the Router
/// and Replicator are written purely in terms of it, so any conforming store
/// (in-memory, on-disk, FFI-backed) plugs in without changing either.
#[async_trait]
pub trait Database: Send + Sync {
    /// Creates a new revision of `doc_id` as a child of `prev_rev_id` (`None`
    /// for a new document). `None` body means a deletion (tombstone).
    async fn put(
        &self,
        doc_id: &str,
        body: Option<Value>,
        prev_rev_id: Option<&str>,
    ) -> Result<RevisionRef, SyncError>;

    /// Inserts `rev` with an explicit `_revisions` ancestor chain
    /// (newest-first, including `rev.rev_id` itself), preserving the
    /// supplied revID rather than minting a new one. Used for `new_edits:false`
    /// writes and by the Puller.
    async fn force_insert(&self, rev: RevisionRef, history: &[String]) -> Result<(), SyncError>;

    /// Fetches a specific revision, or the current winning revision if
    /// `rev_id` is `None`.
    async fn get_document(
        &self,
        doc_id: &str,
        rev_id: Option<&str>,
    ) -> Result<Option<RevisionRef>, SyncError>;

    /// `open_revs=all`: every leaf revision of `doc_id`.
    async fn get_all_revisions(&self, doc_id: &str) -> Result<Vec<RevisionRef>, SyncError>;

    /// `open_revs=[...]`: the named revisions, `Missing` for any absent.
    async fn get_open_revisions(
        &self,
        doc_id: &str,
        rev_ids: &[String],
    ) -> Result<Vec<OpenRevResult>, SyncError>;

    async fn get_local_document(&self, doc_id: &str) -> Result<Option<Value>, SyncError>;

    async fn put_local(&self, doc_id: &str, body: Value) -> Result<(), SyncError>;

    /// Removes a `_local/<id>` document outright; unlike ordinary documents
    /// these carry no revision history to tombstone.
    async fn delete_local(&self, doc_id: &str) -> Result<(), SyncError>;

    async fn get_all_docs(&self, opts: &QueryOptions) -> Result<AllDocsResult, SyncError>;

    /// Revisions committed after `since`, subject to `opts` and an optional
    /// compiled filter (the scripting runtime contract; `filter` is an opaque
    /// name resolved by the store, `params` are the query-string `filterParams`).
    async fn changes_since(
        &self,
        since: u64,
        opts: &ChangesOptions,
        filter: Option<&str>,
        params: Option<&Value>,
    ) -> Result<RevisionList, SyncError>;

    /// `_revs_diff`: for each `docID -> [revIDs]`, mutates the list in place
    /// to retain only the revisions the store does *not* have.
    async fn find_missing_revisions(
        &self,
        revs: &mut HashMap<String, Vec<String>>,
    ) -> Result<(), SyncError>;

    /// Ancestor revIDs of `rev_id` for `doc_id` that the store still has,
    /// most-recent first, capped at `limit`. Used to compute
    /// `possible_ancestors` in `_revs_diff` responses.
    async fn get_possible_ancestor_revision_ids(
        &self,
        doc_id: &str,
        rev_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, SyncError>;

    async fn compact(&self) -> Result<(), SyncError>;

    /// `_purge`: permanently removes the named revisions; returns what was
    /// actually purged per docID.
    async fn purge(
        &self,
        docs: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>, SyncError>;

    /// Evaluates a compiled filter function (the scripting-runtime contract)
    /// against one revision.
    async fn run_filter(
        &self,
        filter_name: &str,
        params: &Value,
        rev: &RevisionRef,
    ) -> Result<bool, SyncError>;

    async fn last_sequence(&self) -> u64;

    async fn doc_count(&self) -> u64;

    /// The local mirror of a remote checkpoint's `lastSequence`, keyed by
    /// `checkpointID`, if one has been recorded.
    async fn last_sequence_with_checkpoint_id(&self, checkpoint_id: &str) -> Option<String>;

    /// Overwrites the local checkpoint mirror.
    async fn set_last_sequence(&self, checkpoint_id: &str, sequence: String);

    /// Stable identifier private to this store instance; an input to
    /// `checkpointID`.
    fn private_uuid(&self) -> String;

    /// Identifier safe to disclose to peers (e.g. in `GET /db`).
    fn public_uuid(&self) -> String;

    /// Subscribes to this database's change feed; see [`ChangeReceiver`].
    fn subscribe_changes(&self) -> ChangeReceiver;

    fn db_name(&self) -> &str;

    /// Registers a running replicator under `token`, an opaque identifier
    /// stable for identical replication settings (in practice, its
    /// `checkpointID`). The database owns this index so the replicator can
    /// hold only a non-owning back-reference and detach on stop (§9 "Back-
    /// reference from Replicator to Database"); `POST /_replicate` with
    /// `cancel:true` resolves the replicator to stop via
    /// [`Database::active_replicator_like`] with that same token.
    fn add_active_replicator(&self, token: &str);

    /// The explicit detach step executed on stop.
    fn remove_active_replicator(&self, token: &str);

    /// Whether a replicator with these settings (`hasSameSettingsAs`) is
    /// already registered.
    fn active_replicator_like(&self, token: &str) -> bool;

    // ---- Attachments (§4.9 PUT/GET/DELETE .../<attachmentName>) ----

    /// Writes `data` as attachment `name` on a new revision descended from
    /// `prev_rev_id` (`None` for the first revision of a brand-new document).
    async fn put_attachment(
        &self,
        doc_id: &str,
        prev_rev_id: Option<&str>,
        name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<RevisionRef, SyncError>;

    async fn get_attachment(
        &self,
        doc_id: &str,
        rev_id: Option<&str>,
        name: &str,
    ) -> Result<Option<AttachmentBlob>, SyncError>;

    /// Removes attachment `name` by writing a new revision without it.
    async fn delete_attachment(
        &self,
        doc_id: &str,
        prev_rev_id: &str,
        name: &str,
    ) -> Result<RevisionRef, SyncError>;

    /// The attachment metadata map for a revision, as would be embedded
    /// under `_attachments` in its JSON body.
    async fn list_attachments(
        &self,
        doc_id: &str,
        rev_id: &str,
    ) -> Result<HashMap<String, AttachmentMeta>, SyncError>;

    // ---- Views (§4.9 `_design/.../_view/...`, `_temp_view`) ----

    /// Compiles the named view out of `ddoc`'s already-stored map/reduce
    /// source via the external scripting runtime (§1 "Out of scope");
    /// returns an opaque token for [`Database::update_index`] /
    /// [`Database::query_view`]. `BadRequest` on a compile error.
    async fn compile_view(&self, ddoc: &str, view: &str) -> Result<String, SyncError>;

    /// Compiles an inline `{map, reduce?}` definition as a disposable view
    /// for `_temp_view`; must be torn down via [`Database::teardown_view`]
    /// after the response is produced.
    async fn compile_temp_view(
        &self,
        map_src: &str,
        reduce_src: Option<&str>,
    ) -> Result<String, SyncError>;

    /// Brings the view's index up to date with the latest committed
    /// revisions. A no-op for a view that's already current.
    async fn update_index(&self, view_token: &str) -> Result<(), SyncError>;

    async fn query_view(
        &self,
        view_token: &str,
        opts: &QueryOptions,
    ) -> Result<AllDocsResult, SyncError>;

    /// Tears down a (typically temporary) view's index.
    async fn teardown_view(&self, view_token: &str);
}
