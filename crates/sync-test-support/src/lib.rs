//! A first-party in-memory fake of the [`sync_core::Database`] contract,
//! built for integration tests (§10.5): the Router is driven against it
//! through `tower::ServiceExt::oneshot`, and two instances wired over real
//! loopback HTTP exercise the Replicator's Pusher/Puller surface.
//!
//! This is deliberately not a production storage engine — no durability, no
//! real revision-tree compaction, no real map/reduce evaluation. It exists
//! only to satisfy the `Database` trait realistically enough that Router and
//! Replicator behavior can be asserted against it.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use sync_changes::ChangeBroker;
use sync_core::{
    AllDocsResult, AttachmentBlob, AttachmentMeta, ChangeReceiver, ChangesOptions, Database,
    DocRow, OpenRevResult, QueryOptions, RevisionList, RevisionRef, SyncError,
};

#[derive(Clone)]
struct RevEntry {
    parent: Option<String>,
    body: Option<Value>,
    deleted: bool,
    sequence: Option<u64>,
}

#[derive(Default)]
struct DocState {
    revisions: HashMap<String, RevEntry>,
    order: Vec<String>,
}

impl DocState {
    /// The current winning leaf: highest generation, ties broken by revID
    /// descending — a stand-in for whatever deterministic rule the real
    /// storage engine already applies (§1, conflict resolution is out of
    /// scope here).
    fn winner(&self) -> Option<&str> {
        let has_child: std::collections::HashSet<&str> = self
            .revisions
            .values()
            .filter_map(|e| e.parent.as_deref())
            .collect();
        self.order
            .iter()
            .map(|id| id.as_str())
            .filter(|id| !has_child.contains(id))
            .max_by_key(|id| (sync_core::generation_of(id), id.to_string()))
    }
}

type ViewFn = dyn Fn(&str, &Value) -> Vec<(Value, Value)> + Send + Sync;
type FilterFn = dyn Fn(&Value, &RevisionRef) -> bool + Send + Sync;

/// One attachment blob keyed by `(doc_id, rev_id, name)`.
type AttachmentKey = (String, String, String);

pub struct MemoryDatabase {
    name: String,
    private_uuid: String,
    public_uuid: String,
    docs: RwLock<HashMap<String, DocState>>,
    local_docs: RwLock<HashMap<String, Value>>,
    checkpoints: RwLock<HashMap<String, String>>,
    active_replicators: RwLock<std::collections::HashSet<String>>,
    attachments: RwLock<HashMap<AttachmentKey, AttachmentBlob>>,
    attachment_meta: RwLock<HashMap<(String, String), HashMap<String, AttachmentMeta>>>,
    views: RwLock<HashMap<String, std::sync::Arc<ViewFn>>>,
    temp_views: Mutex<HashMap<String, std::sync::Arc<ViewFn>>>,
    filters: RwLock<HashMap<String, std::sync::Arc<FilterFn>>>,
    next_sequence: AtomicU64,
    broker: ChangeBroker,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private_uuid: uuid::Uuid::new_v4().to_string(),
            public_uuid: uuid::Uuid::new_v4().to_string(),
            docs: RwLock::new(HashMap::new()),
            local_docs: RwLock::new(HashMap::new()),
            checkpoints: RwLock::new(HashMap::new()),
            active_replicators: RwLock::new(std::collections::HashSet::new()),
            attachments: RwLock::new(HashMap::new()),
            attachment_meta: RwLock::new(HashMap::new()),
            views: RwLock::new(HashMap::new()),
            temp_views: Mutex::new(HashMap::new()),
            filters: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
            broker: ChangeBroker::new(),
        }
    }

    /// Registers a native view function under `ddoc/view`, standing in for
    /// what would otherwise be compiled from a design doc's stored
    /// map/reduce source by the external scripting runtime.
    pub fn register_view<F>(&self, ddoc: &str, view: &str, map: F)
    where
        F: Fn(&str, &Value) -> Vec<(Value, Value)> + Send + Sync + 'static,
    {
        self.views
            .write()
            .unwrap()
            .insert(format!("{ddoc}/{view}"), std::sync::Arc::new(map));
    }

    pub fn register_filter<F>(&self, name: &str, filter: F)
    where
        F: Fn(&Value, &RevisionRef) -> bool + Send + Sync + 'static,
    {
        self.filters
            .write()
            .unwrap()
            .insert(name.to_string(), std::sync::Arc::new(filter));
    }

    fn next_rev_id(generation: u64) -> String {
        let suffix = &uuid::Uuid::new_v4().simple().to_string()[..12];
        format!("{generation}-{suffix}")
    }

    fn doc_count_locked(docs: &HashMap<String, DocState>) -> u64 {
        docs.values()
            .filter_map(|d| d.winner().map(|w| (w.to_string(), d)))
            .filter(|(w, d)| !d.revisions[w].deleted)
            .count() as u64
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn put(
        &self,
        doc_id: &str,
        body: Option<Value>,
        prev_rev_id: Option<&str>,
    ) -> Result<RevisionRef, SyncError> {
        let mut docs = self.docs.write().unwrap();
        let entry = docs.entry(doc_id.to_string()).or_default();
        let current_winner = entry.winner().map(str::to_string);

        match (&current_winner, prev_rev_id) {
            (None, None) => {}
            (None, Some(_)) => return Err(SyncError::NotFound(doc_id.to_string())),
            (Some(_), None) => return Err(SyncError::Conflict(doc_id.to_string())),
            (Some(winner), Some(prev)) if winner != prev => {
                return Err(SyncError::Conflict(doc_id.to_string()))
            }
            (Some(_), Some(_)) => {}
        }

        let generation = prev_rev_id
            .map(sync_core::generation_of)
            .unwrap_or(0)
            + 1;
        let rev_id = Self::next_rev_id(generation);
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let deleted = body.is_none();

        entry.revisions.insert(
            rev_id.clone(),
            RevEntry {
                parent: prev_rev_id.map(str::to_string),
                body: body.clone(),
                deleted,
                sequence: Some(sequence),
            },
        );
        entry.order.push(rev_id.clone());

        let rev = RevisionRef {
            doc_id: doc_id.to_string(),
            rev_id,
            deleted,
            sequence: Some(sequence),
            body,
        };
        self.broker.publish(rev.clone());
        Ok(rev)
    }

    async fn force_insert(&self, rev: RevisionRef, history: &[String]) -> Result<(), SyncError> {
        let mut docs = self.docs.write().unwrap();
        let entry = docs.entry(rev.doc_id.clone()).or_default();

        // `history` is newest-first including `rev.rev_id`; link each to its
        // successor so the parent chain exists even for ancestors whose
        // bodies we never received.
        for pair in history.windows(2) {
            let (child, parent) = (&pair[0], &pair[1]);
            entry.revisions.entry(parent.clone()).or_insert_with(entry_placeholder);
            if !entry.order.contains(parent) {
                entry.order.push(parent.clone());
            }
            entry
                .revisions
                .entry(child.clone())
                .or_insert_with(entry_placeholder)
                .parent = Some(parent.clone());
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        entry.revisions.insert(
            rev.rev_id.clone(),
            RevEntry {
                parent: history.get(1).cloned(),
                body: rev.body.clone(),
                deleted: rev.deleted,
                sequence: Some(sequence),
            },
        );
        if !entry.order.contains(&rev.rev_id) {
            entry.order.push(rev.rev_id.clone());
        }

        let mut stamped = rev;
        stamped.sequence = Some(sequence);
        self.broker.publish(stamped);
        Ok(())
    }

    async fn get_document(
        &self,
        doc_id: &str,
        rev_id: Option<&str>,
    ) -> Result<Option<RevisionRef>, SyncError> {
        let docs = self.docs.read().unwrap();
        let Some(doc) = docs.get(doc_id) else {
            return Ok(None);
        };
        let rev_id = match rev_id {
            Some(id) => id.to_string(),
            None => match doc.winner() {
                Some(w) => w.to_string(),
                None => return Ok(None),
            },
        };
        Ok(doc.revisions.get(&rev_id).map(|e| RevisionRef {
            doc_id: doc_id.to_string(),
            rev_id: rev_id.clone(),
            deleted: e.deleted,
            sequence: e.sequence,
            body: e.body.clone(),
        }))
    }

    async fn get_all_revisions(&self, doc_id: &str) -> Result<Vec<RevisionRef>, SyncError> {
        let docs = self.docs.read().unwrap();
        let Some(doc) = docs.get(doc_id) else {
            return Ok(Vec::new());
        };
        let has_child: std::collections::HashSet<&str> = doc
            .revisions
            .values()
            .filter_map(|e| e.parent.as_deref())
            .collect();
        Ok(doc
            .order
            .iter()
            .filter(|id| !has_child.contains(id.as_str()))
            .filter_map(|id| {
                doc.revisions.get(id).map(|e| RevisionRef {
                    doc_id: doc_id.to_string(),
                    rev_id: id.clone(),
                    deleted: e.deleted,
                    sequence: e.sequence,
                    body: e.body.clone(),
                })
            })
            .collect())
    }

    async fn get_open_revisions(
        &self,
        doc_id: &str,
        rev_ids: &[String],
    ) -> Result<Vec<OpenRevResult>, SyncError> {
        let docs = self.docs.read().unwrap();
        let doc = docs.get(doc_id);
        Ok(rev_ids
            .iter()
            .map(|rev_id| match doc.and_then(|d| d.revisions.get(rev_id)) {
                Some(e) => OpenRevResult::Ok(RevisionRef {
                    doc_id: doc_id.to_string(),
                    rev_id: rev_id.clone(),
                    deleted: e.deleted,
                    sequence: e.sequence,
                    body: e.body.clone(),
                }),
                None => OpenRevResult::Missing(rev_id.clone()),
            })
            .collect())
    }

    async fn get_local_document(&self, doc_id: &str) -> Result<Option<Value>, SyncError> {
        Ok(self.local_docs.read().unwrap().get(doc_id).cloned())
    }

    async fn put_local(&self, doc_id: &str, body: Value) -> Result<(), SyncError> {
        self.local_docs
            .write()
            .unwrap()
            .insert(doc_id.to_string(), body);
        Ok(())
    }

    async fn delete_local(&self, doc_id: &str) -> Result<(), SyncError> {
        self.local_docs.write().unwrap().remove(doc_id);
        Ok(())
    }

    async fn get_all_docs(&self, opts: &QueryOptions) -> Result<AllDocsResult, SyncError> {
        let docs = self.docs.read().unwrap();
        let mut rows: Vec<DocRow> = Vec::new();
        let ids: Vec<String> = match &opts.keys {
            Some(keys) => keys
                .iter()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect(),
            None => {
                let mut ids: Vec<String> = docs.keys().cloned().collect();
                ids.sort();
                ids
            }
        };
        for id in ids {
            let Some(doc) = docs.get(&id) else { continue };
            let Some(winner) = doc.winner() else { continue };
            let entry = &doc.revisions[winner];
            if entry.deleted && opts.keys.is_none() {
                continue;
            }
            rows.push(DocRow {
                id: id.clone(),
                key: Value::String(id.clone()),
                rev: winner.to_string(),
                deleted: entry.deleted,
                doc: if opts.include_docs {
                    entry.body.clone()
                } else {
                    None
                },
            });
        }
        if opts.descending {
            rows.reverse();
        }
        let total_rows = rows.len() as u64;
        let offset = opts.skip.min(rows.len());
        let mut rows: Vec<DocRow> = rows.into_iter().skip(opts.skip).collect();
        if let Some(limit) = opts.limit {
            rows.truncate(limit);
        }
        Ok(AllDocsResult {
            rows,
            total_rows,
            offset: offset as u64,
            update_seq: if opts.update_seq {
                Some(self.last_sequence().await)
            } else {
                None
            },
        })
    }

    async fn changes_since(
        &self,
        since: u64,
        opts: &ChangesOptions,
        filter: Option<&str>,
        params: Option<&Value>,
    ) -> Result<RevisionList, SyncError> {
        let docs = self.docs.read().unwrap();
        let mut all: Vec<RevisionRef> = Vec::new();
        for (doc_id, doc) in docs.iter() {
            for rev_id in &doc.order {
                let entry = &doc.revisions[rev_id];
                let Some(seq) = entry.sequence else { continue };
                if seq <= since {
                    continue;
                }
                all.push(RevisionRef {
                    doc_id: doc_id.clone(),
                    rev_id: rev_id.clone(),
                    deleted: entry.deleted,
                    sequence: Some(seq),
                    body: entry.body.clone(),
                });
            }
        }
        all.sort_by_key(|r| r.sequence.unwrap_or(0));

        let mut result = RevisionList::new();
        for rev in all {
            if let Some(name) = filter {
                let allow = match self.filters.read().unwrap().get(name) {
                    Some(f) => f(params.unwrap_or(&Value::Null), &rev),
                    None => true,
                };
                if !allow {
                    continue;
                }
            }
            result.push(rev);
        }
        // Conflict mode groups revisions by doc_id before truncating to
        // `limit` (the router does that after grouping); truncating the flat
        // revision list here would cut mid-group and undercount doc rows.
        if !opts.include_conflicts {
            if let Some(limit) = opts.limit {
                let vec = result.into_vec();
                result = vec.into_iter().take(limit).collect();
            }
        }
        Ok(result)
    }

    async fn find_missing_revisions(
        &self,
        revs: &mut HashMap<String, Vec<String>>,
    ) -> Result<(), SyncError> {
        let docs = self.docs.read().unwrap();
        for (doc_id, rev_ids) in revs.iter_mut() {
            let have = docs.get(doc_id);
            rev_ids.retain(|rev_id| !have.is_some_and(|d| d.revisions.contains_key(rev_id)));
        }
        Ok(())
    }

    async fn get_possible_ancestor_revision_ids(
        &self,
        doc_id: &str,
        rev_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, SyncError> {
        let docs = self.docs.read().unwrap();
        let Some(doc) = docs.get(doc_id) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut cursor = doc.revisions.get(rev_id).and_then(|e| e.parent.clone());
        while let Some(id) = cursor {
            if out.len() >= limit {
                break;
            }
            out.push(id.clone());
            cursor = doc.revisions.get(&id).and_then(|e| e.parent.clone());
        }
        Ok(out)
    }

    async fn compact(&self) -> Result<(), SyncError> {
        Ok(())
    }

    async fn purge(
        &self,
        targets: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>, SyncError> {
        let mut docs = self.docs.write().unwrap();
        let mut purged = HashMap::new();
        for (doc_id, rev_ids) in targets {
            let Some(doc) = docs.get_mut(doc_id) else {
                continue;
            };
            let mut removed = Vec::new();
            for rev_id in rev_ids {
                if doc.revisions.remove(rev_id).is_some() {
                    doc.order.retain(|id| id != rev_id);
                    removed.push(rev_id.clone());
                }
            }
            if !removed.is_empty() {
                purged.insert(doc_id.clone(), removed);
            }
        }
        Ok(purged)
    }

    async fn run_filter(
        &self,
        filter_name: &str,
        params: &Value,
        rev: &RevisionRef,
    ) -> Result<bool, SyncError> {
        Ok(match self.filters.read().unwrap().get(filter_name) {
            Some(f) => f(params, rev),
            None => true,
        })
    }

    async fn last_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst).saturating_sub(1)
    }

    async fn doc_count(&self) -> u64 {
        Self::doc_count_locked(&self.docs.read().unwrap())
    }

    async fn last_sequence_with_checkpoint_id(&self, checkpoint_id: &str) -> Option<String> {
        self.checkpoints.read().unwrap().get(checkpoint_id).cloned()
    }

    async fn set_last_sequence(&self, checkpoint_id: &str, sequence: String) {
        self.checkpoints
            .write()
            .unwrap()
            .insert(checkpoint_id.to_string(), sequence);
    }

    fn private_uuid(&self) -> String {
        self.private_uuid.clone()
    }

    fn public_uuid(&self) -> String {
        self.public_uuid.clone()
    }

    fn subscribe_changes(&self) -> ChangeReceiver {
        self.broker.subscribe()
    }

    fn db_name(&self) -> &str {
        &self.name
    }

    fn add_active_replicator(&self, token: &str) {
        self.active_replicators
            .write()
            .unwrap()
            .insert(token.to_string());
    }

    fn remove_active_replicator(&self, token: &str) {
        self.active_replicators.write().unwrap().remove(token);
    }

    fn active_replicator_like(&self, token: &str) -> bool {
        self.active_replicators.read().unwrap().contains(token)
    }

    async fn put_attachment(
        &self,
        doc_id: &str,
        prev_rev_id: Option<&str>,
        name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<RevisionRef, SyncError> {
        let existing_body = if let Some(prev) = prev_rev_id {
            self.get_document(doc_id, Some(prev))
                .await?
                .and_then(|r| r.body)
        } else {
            None
        };
        let body = existing_body.unwrap_or_else(|| serde_json::json!({}));
        let rev = self.put(doc_id, Some(body), prev_rev_id).await?;

        self.attachments.write().unwrap().insert(
            (doc_id.to_string(), rev.rev_id.clone(), name.to_string()),
            AttachmentBlob {
                content_type: content_type.to_string(),
                data: data.clone(),
            },
        );
        self.attachment_meta
            .write()
            .unwrap()
            .entry((doc_id.to_string(), rev.rev_id.clone()))
            .or_default()
            .insert(
                name.to_string(),
                AttachmentMeta {
                    content_type: content_type.to_string(),
                    length: data.len() as u64,
                    revpos: rev.generation(),
                },
            );
        Ok(rev)
    }

    async fn get_attachment(
        &self,
        doc_id: &str,
        rev_id: Option<&str>,
        name: &str,
    ) -> Result<Option<AttachmentBlob>, SyncError> {
        let rev_id = match rev_id {
            Some(id) => id.to_string(),
            None => match self.get_document(doc_id, None).await? {
                Some(r) => r.rev_id,
                None => return Ok(None),
            },
        };
        Ok(self
            .attachments
            .read()
            .unwrap()
            .get(&(doc_id.to_string(), rev_id, name.to_string()))
            .map(|b| AttachmentBlob {
                content_type: b.content_type.clone(),
                data: b.data.clone(),
            }))
    }

    async fn delete_attachment(
        &self,
        doc_id: &str,
        prev_rev_id: &str,
        name: &str,
    ) -> Result<RevisionRef, SyncError> {
        let body = self
            .get_document(doc_id, Some(prev_rev_id))
            .await?
            .and_then(|r| r.body)
            .unwrap_or_else(|| serde_json::json!({}));
        let rev = self.put(doc_id, Some(body), Some(prev_rev_id)).await?;
        let mut meta = self.attachment_meta.write().unwrap();
        if let Some(prev_meta) = meta.get(&(doc_id.to_string(), prev_rev_id.to_string())).cloned() {
            let mut carried = prev_meta;
            carried.remove(name);
            meta.insert((doc_id.to_string(), rev.rev_id.clone()), carried);
        }
        Ok(rev)
    }

    async fn list_attachments(
        &self,
        doc_id: &str,
        rev_id: &str,
    ) -> Result<HashMap<String, AttachmentMeta>, SyncError> {
        Ok(self
            .attachment_meta
            .read()
            .unwrap()
            .get(&(doc_id.to_string(), rev_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn compile_view(&self, ddoc: &str, view: &str) -> Result<String, SyncError> {
        let token = format!("{ddoc}/{view}");
        if self.views.read().unwrap().contains_key(&token) {
            Ok(token)
        } else {
            Err(SyncError::BadRequest(format!(
                "no view registered for {token}"
            )))
        }
    }

    async fn compile_temp_view(
        &self,
        map_src: &str,
        _reduce_src: Option<&str>,
    ) -> Result<String, SyncError> {
        let token = format!("_temp/{}", uuid::Uuid::new_v4());
        let map: std::sync::Arc<ViewFn> = match map_src {
            "emit_id" => std::sync::Arc::new(|id: &str, _body: &Value| {
                vec![(Value::String(id.to_string()), Value::Null)]
            }),
            "emit_body" => std::sync::Arc::new(|id: &str, body: &Value| {
                vec![(Value::String(id.to_string()), body.clone())]
            }),
            other => {
                return Err(SyncError::BadRequest(format!(
                    "temp view source not understood by the test fake: {other}"
                )))
            }
        };
        self.temp_views.lock().unwrap().insert(token.clone(), map);
        Ok(token)
    }

    async fn update_index(&self, _view_token: &str) -> Result<(), SyncError> {
        // Views are evaluated live in `query_view`; nothing to precompute.
        Ok(())
    }

    async fn query_view(
        &self,
        view_token: &str,
        opts: &QueryOptions,
    ) -> Result<AllDocsResult, SyncError> {
        let map = self
            .views
            .read()
            .unwrap()
            .get(view_token)
            .cloned()
            .or_else(|| self.temp_views.lock().unwrap().get(view_token).cloned())
            .ok_or_else(|| SyncError::NotFound(view_token.to_string()))?;

        let docs = self.docs.read().unwrap();
        let mut rows: Vec<DocRow> = Vec::new();
        for (doc_id, doc) in docs.iter() {
            let Some(winner) = doc.winner() else { continue };
            let entry = &doc.revisions[winner];
            if entry.deleted {
                continue;
            }
            let body = entry.body.clone().unwrap_or(Value::Null);
            for (key, value) in map(doc_id, &body) {
                if let Some(start) = &opts.start_key {
                    if &key < start {
                        continue;
                    }
                }
                if let Some(end) = &opts.end_key {
                    if &key > end {
                        continue;
                    }
                }
                rows.push(DocRow {
                    id: doc_id.clone(),
                    key,
                    rev: winner.to_string(),
                    deleted: false,
                    doc: if opts.include_docs {
                        Some(value)
                    } else {
                        None
                    },
                });
            }
        }
        rows.sort_by(|a, b| {
            a.key
                .to_string()
                .cmp(&b.key.to_string())
                .then_with(|| a.id.cmp(&b.id))
        });
        if opts.descending {
            rows.reverse();
        }
        let total_rows = rows.len() as u64;
        let offset = opts.skip.min(rows.len());
        let mut rows: Vec<DocRow> = rows.into_iter().skip(opts.skip).collect();
        if let Some(limit) = opts.limit {
            rows.truncate(limit);
        }
        Ok(AllDocsResult {
            rows,
            total_rows,
            offset: offset as u64,
            update_seq: None,
        })
    }

    async fn teardown_view(&self, view_token: &str) {
        self.temp_views.lock().unwrap().remove(view_token);
    }
}

fn entry_placeholder() -> RevEntry {
    RevEntry {
        parent: None,
        body: None,
        deleted: false,
        sequence: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_body() {
        let db = MemoryDatabase::new("test");
        let rev = db
            .put("doc1", Some(serde_json::json!({"x": 1})), None)
            .await
            .unwrap();
        assert_eq!(rev.generation(), 1);
        let fetched = db.get_document("doc1", None).await.unwrap().unwrap();
        assert_eq!(fetched.body, Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn put_without_matching_prev_rev_conflicts() {
        let db = MemoryDatabase::new("test");
        db.put("doc1", Some(serde_json::json!({})), None).await.unwrap();
        let err = db
            .put("doc1", Some(serde_json::json!({})), Some("9-bogus"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
    }

    #[tokio::test]
    async fn changes_since_reflects_commit_order() {
        let db = MemoryDatabase::new("test");
        db.put("a", Some(serde_json::json!({})), None).await.unwrap();
        db.put("b", Some(serde_json::json!({})), None).await.unwrap();
        let changes = db
            .changes_since(0, &ChangesOptions::default(), None, None)
            .await
            .unwrap();
        let ids: Vec<_> = changes.iter().map(|r| r.doc_id.clone()).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn find_missing_revisions_filters_to_absent_ids() {
        let db = MemoryDatabase::new("test");
        let rev = db.put("a", Some(serde_json::json!({})), None).await.unwrap();
        let mut want: HashMap<String, Vec<String>> = HashMap::new();
        want.insert("a".to_string(), vec![rev.rev_id.clone(), "2-missing".to_string()]);
        db.find_missing_revisions(&mut want).await.unwrap();
        assert_eq!(want["a"], vec!["2-missing".to_string()]);
    }
}
