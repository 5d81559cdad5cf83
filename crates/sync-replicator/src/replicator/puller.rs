//! Pulls remote changes into the local store via `forceInsert` (§4.7).

use super::{Direction, Replicator};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use sync_core::{RevisionRef, SyncError};
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

/// Which `_changes` feed mode to request. Normal/longpoll are read as one
/// JSON body; continuous is read as NDJSON, one decode per line (§4.7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    Normal,
    Longpoll,
    Continuous,
}

pub struct Puller {
    pub feed: FeedMode,
    pub limit: Option<usize>,
}

impl Puller {
    pub fn new(feed: FeedMode) -> Self {
        Self { feed, limit: None }
    }

    fn changes_url(&self, repl: &Arc<Replicator>) -> Result<url::Url, SyncError> {
        let since = repl.last_sequence();
        let feed = match self.feed {
            FeedMode::Normal => "normal",
            FeedMode::Longpoll => "longpoll",
            FeedMode::Continuous => "continuous",
        };
        let mut url = repl
            .remote_url()
            .join("_changes")
            .map_err(|e| SyncError::BadRequest(e.to_string()))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("since", &since.to_string());
            qp.append_pair("feed", feed);
            qp.append_pair("style", "all_docs");
            if let Some(limit) = self.limit {
                qp.append_pair("limit", &limit.to_string());
            }
            if let Some(filter) = repl.options().filter.as_deref() {
                qp.append_pair("filter", filter);
            }
        }
        Ok(url)
    }

    /// Parses one `_changes` row into a [`RevisionRef`] carrying only
    /// identity — no body yet; `process_inbox` fetches the body for whatever
    /// turns out to be unknown locally.
    fn parse_row(row: &Value) -> Option<RevisionRef> {
        let doc_id = row.get("id")?.as_str()?.to_string();
        let seq = row.get("seq").and_then(|s| s.as_u64());
        let deleted = row
            .get("deleted")
            .and_then(|d| d.as_bool())
            .unwrap_or(false);
        let rev_id = row
            .get("changes")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("rev"))
            .and_then(|r| r.as_str())?
            .to_string();
        let mut rev = RevisionRef::new(doc_id, rev_id).with_deleted(deleted);
        if let Some(seq) = seq {
            rev = rev.with_sequence(seq);
        }
        Some(rev)
    }

    async fn fetch_one(&self, repl: &Arc<Replicator>, rev: &RevisionRef) -> Result<(), SyncError> {
        let mut url = repl
            .remote_url()
            .join(&rev.doc_id)
            .map_err(|e| SyncError::BadRequest(e.to_string()))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("rev", &rev.rev_id);
            qp.append_pair("attachments", "true");
        }
        let resp = repl.send(repl.http_client().get(url)).await?;
        if !resp.status().is_success() {
            return Err(SyncError::Network(format!(
                "GET {} failed: {}",
                rev.doc_id,
                resp.status()
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| SyncError::BadJson(e.to_string()))?;
        let history = revisions_history(&body);
        let full = rev.clone().with_body(body);
        repl.db().force_insert(full, &history).await
    }
}

/// Extracts the `_revisions.ids` ancestor chain (newest-first including the
/// leaf) from a fetched document body, falling back to just the leaf revID
/// when the server omitted `_revisions` (e.g. a non-full GET).
fn revisions_history(body: &Value) -> Vec<String> {
    let Some(revisions) = body.get("_revisions") else {
        let rev = body.get("_rev").and_then(|r| r.as_str()).unwrap_or("");
        return vec![rev.to_string()];
    };
    let start = revisions.get("start").and_then(|s| s.as_u64()).unwrap_or(0);
    let ids: Vec<&str> = revisions
        .get("ids")
        .and_then(|i| i.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    ids.iter()
        .enumerate()
        .map(|(i, suffix)| format!("{}-{}", start.saturating_sub(i as u64), suffix))
        .collect()
}

#[async_trait]
impl Direction for Puller {
    async fn begin_replicating(&self, repl: &Arc<Replicator>) -> Result<(), SyncError> {
        let url = self.changes_url(repl)?;

        match self.feed {
            FeedMode::Normal | FeedMode::Longpoll => {
                let resp = repl.send(repl.http_client().get(url)).await?;
                if !resp.status().is_success() {
                    return Err(SyncError::Network(format!(
                        "_changes failed: {}",
                        resp.status()
                    )));
                }
                let body: Value = resp
                    .json()
                    .await
                    .map_err(|e| SyncError::BadJson(e.to_string()))?;
                let results = body
                    .get("results")
                    .and_then(|r| r.as_array())
                    .cloned()
                    .unwrap_or_default();
                let revs: Vec<RevisionRef> = results.iter().filter_map(Self::parse_row).collect();
                repl.record_changes_total(revs.len() as u64);
                repl.enqueue_many(revs).await;
            }
            FeedMode::Continuous => {
                let resp = repl.send(repl.http_client().get(url)).await?;
                if !resp.status().is_success() {
                    return Err(SyncError::Network(format!(
                        "_changes failed: {}",
                        resp.status()
                    )));
                }
                let stream = resp
                    .bytes_stream()
                    .map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
                let mut lines = StreamReader::new(stream).lines();
                let repl = Arc::clone(repl);
                tokio::spawn(async move {
                    while let Ok(Some(line)) = lines.next_line().await {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let Ok(row) = serde_json::from_str::<Value>(&line) else {
                            continue;
                        };
                        if let Some(rev) = Self::parse_row(&row) {
                            repl.record_changes_total(1);
                            repl.enqueue(rev).await;
                        }
                    }
                });
            }
        }
        Ok(())
    }

    async fn process_inbox(&self, repl: &Arc<Replicator>, revs: Vec<RevisionRef>) {
        let mut contiguous_max: Option<u64> = None;
        let mut failed_any = false;

        for rev in &revs {
            let known = repl
                .db()
                .get_document(&rev.doc_id, Some(&rev.rev_id))
                .await
                .ok()
                .flatten()
                .is_some();
            if known {
                continue;
            }
            match self.fetch_one(repl, rev).await {
                Ok(()) => {
                    if let Some(seq) = rev.sequence {
                        contiguous_max = Some(contiguous_max.map_or(seq, |m| m.max(seq)));
                    }
                }
                Err(err) => {
                    if !err.is_cancelled() {
                        repl.record_revision_failed();
                    }
                    failed_any = true;
                    break;
                }
            }
        }

        // Only advance past the prefix that fully succeeded; a failure
        // partway through must not let `lastSequence` skip the gap (§4.7).
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_row_extracts_identity_from_a_changes_entry() {
        let row = json!({"seq": 3, "id": "doc1", "changes": [{"rev": "2-abc"}], "deleted": true});
        let rev = Puller::parse_row(&row).unwrap();
        assert_eq!(rev.doc_id, "doc1");
        assert_eq!(rev.rev_id, "2-abc");
        assert_eq!(rev.sequence, Some(3));
        assert!(rev.deleted);
    }

    #[test]
    fn parse_row_without_changes_array_is_none() {
        let row = json!({"seq": 1, "id": "doc1"});
        assert!(Puller::parse_row(&row).is_none());
    }

    #[test]
    fn revisions_history_builds_newest_first_chain() {
        let body = json!({
            "_revisions": {"start": 3, "ids": ["ccc", "bbb", "aaa"]}
        });
        let history = revisions_history(&body);
        assert_eq!(history, vec!["3-ccc", "2-bbb", "1-aaa"]);
    }

    #[test]
    fn revisions_history_falls_back_to_rev_when_absent() {
        let body = json!({"_rev": "1-xyz"});
        assert_eq!(revisions_history(&body), vec!["1-xyz".to_string()]);
    }
}
