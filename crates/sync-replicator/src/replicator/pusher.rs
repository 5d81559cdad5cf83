//! Drains local changes into the remote peer's `_bulk_docs` (§4.6).

use super::{Direction, Replicator};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use sync_core::{envelope, ChangesOptions, RevisionRef, SyncError};
use tokio::sync::broadcast::error::RecvError;

pub struct Pusher;

impl Pusher {
    pub fn new() -> Self {
        Self
    }

    /// PUTs the remote database root; a `412` ("already exists") is not an
    /// error.
    async fn maybe_create_remote_db(&self, repl: &Arc<Replicator>) -> Result<(), SyncError> {
        let resp = repl.send(repl_client(repl).put(repl.remote_url().clone())).await?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::PRECONDITION_FAILED {
            Ok(())
        } else {
            Err(SyncError::Network(format!(
                "failed to create remote database: {}",
                resp.status()
            )))
        }
    }

    async fn revs_diff(
        &self,
        repl: &Arc<Replicator>,
        revs_by_doc: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>, SyncError> {
        let url = repl
            .remote_url()
            .join("_revs_diff")
            .map_err(|e| SyncError::BadRequest(e.to_string()))?;
        let resp = repl.send(repl_client(repl).post(url).json(revs_by_doc)).await?;
        if !resp.status().is_success() {
            return Err(SyncError::Network(format!(
                "_revs_diff failed: {}",
                resp.status()
            )));
        }
        let body: HashMap<String, Value> = resp
            .json()
            .await
            .map_err(|e| SyncError::BadJson(e.to_string()))?;
        let mut missing = HashMap::new();
        for (doc_id, entry) in body {
            let ids: Vec<String> = entry
                .get("missing")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            if !ids.is_empty() {
                missing.insert(doc_id, ids);
            }
        }
        Ok(missing)
    }

    async fn bulk_docs(&self, repl: &Arc<Replicator>, docs: Vec<Value>) -> Result<(), SyncError> {
        let url = repl
            .remote_url()
            .join("_bulk_docs")
            .map_err(|e| SyncError::BadRequest(e.to_string()))?;
        let body = json!({ "docs": docs, "new_edits": false });
        let resp = repl.send(repl_client(repl).post(url).json(&body)).await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::Network(format!(
                "_bulk_docs failed: {}",
                resp.status()
            )))
        }
    }

    async fn build_bulk_entry(&self, repl: &Arc<Replicator>, rev: &RevisionRef) -> Value {
        let ancestors = repl
            .db()
            .get_possible_ancestor_revision_ids(&rev.doc_id, &rev.rev_id, 1000)
            .await
            .unwrap_or_default();
        envelope(rev, &ancestors)
    }
}

impl Default for Pusher {
    fn default() -> Self {
        Self::new()
    }
}

fn repl_client(repl: &Arc<Replicator>) -> reqwest::Client {
    // `Replicator::send` wraps every request; callers go through it for auth,
    // registration, and cancellation, but still need a `Client` to build the
    // initial `RequestBuilder` from. Cloning a `reqwest::Client` is cheap —
    // it's a handle around a shared connection pool.
    repl.http_client()
}

#[async_trait]
impl Direction for Pusher {
    async fn begin_replicating(&self, repl: &Arc<Replicator>) -> Result<(), SyncError> {
        if repl.options().create_target {
            self.maybe_create_remote_db(repl).await?;
        }

        let since = repl.last_sequence();
        let opts = ChangesOptions::new(false);
        let initial = repl
            .db()
            .changes_since(
                since,
                &opts,
                repl.options().filter.as_deref(),
                repl.options().query_params.as_ref(),
            )
            .await?;
        repl.record_changes_total(initial.len() as u64);
        repl.enqueue_many(initial.into_vec()).await;

        let mut change_rx = repl.db().subscribe_changes();
        let repl = Arc::clone(repl);
        tokio::spawn(async move {
            loop {
                match change_rx.recv().await {
                    Ok(rev) => {
                        repl.record_changes_total(1);
                        repl.enqueue(rev).await;
                    }
                    // A lagged subscriber has missed notifications; a full
                    // resync would re-derive them from `changesSince`, which
                    // the next `retry`/restart already does.
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return,
                }
            }
        });
        Ok(())
    }

    async fn process_inbox(&self, repl: &Arc<Replicator>, revs: Vec<RevisionRef>) {
        let mut revs_by_doc: HashMap<String, Vec<String>> = HashMap::new();
        for rev in &revs {
            revs_by_doc
                .entry(rev.doc_id.clone())
                .or_default()
                .push(rev.rev_id.clone());
        }

        let missing = match self.revs_diff(repl, &revs_by_doc).await {
            Ok(missing) => missing,
            Err(err) => {
                if !err.is_cancelled() {
                    repl.record_revision_failed();
                }
                return;
            }
        };

        let mut docs = Vec::new();
        let mut contiguous_max: Option<u64> = None;
        let mut failed_any = false;

        for rev in &revs {
            let Some(missing_for_doc) = missing.get(&rev.doc_id) else {
                continue;
            };
            if !missing_for_doc.contains(&rev.rev_id) {
                continue;
            }
            match repl.db().get_document(&rev.doc_id, Some(&rev.rev_id)).await {
                Ok(Some(full)) => {
                    docs.push(self.build_bulk_entry(repl, &full).await);
                    if let Some(seq) = rev.sequence {
                        contiguous_max = Some(contiguous_max.map_or(seq, |m| m.max(seq)));
                    }
                }
                Ok(None) | Err(_) => {
                    repl.record_revision_failed();
                    failed_any = true;
                    break;
                }
            }
        }

        if !docs.is_empty() {
            if let Err(err) = self.bulk_docs(repl, docs).await {
                if !err.is_cancelled() {
                    repl.record_revision_failed();
                }
                return;
            }
        }

        // Only advance past the prefix that fully succeeded; a failure
        // partway through must not let `lastSequence` skip the gap (§4.6).
        if !failed_any {
            if let Some(max_seq) = revs.iter().filter_map(|r| r.sequence).max() {
                repl.advance_last_sequence(max_seq);
            }
        } else if let Some(seq) = contiguous_max {
            repl.advance_last_sequence(seq);
        }
        repl.record_changes_processed(revs.len() as u64);
    }

    async fn retry(&self, repl: &Arc<Replicator>) {
        let _ = self.begin_replicating(repl).await;
    }
}

