//! Decodes a peer-supplied `_revisions` history into the form the `Database`
//! trait wants, used by the document PUT handler (`new_edits=false`) and
//! `POST /db/_bulk_docs` (§4.9). The inverse direction — re-encoding a stored
//! revision back onto the wire — is `sync_core::envelope`, shared with the
//! Pusher's `_bulk_docs` entries; it has no callers in this crate yet, so it
//! lives where both crates can reach it instead of being duplicated here.

use serde_json::{json, Value};
use sync_core::{generation_of, RevisionRef};

/// Extracts the `_revisions.ids` ancestor chain (newest-first, including the
/// leaf) from a document body carrying an explicit `_revisions` field, as
/// sent by a replicating peer with `new_edits=false`. Falls back to just the
/// leaf revID when `_revisions` is absent.
pub fn history_from_body(body: &Value, leaf_rev_id: &str) -> Vec<String> {
    let Some(revisions) = body.get("_revisions") else {
        return vec![leaf_rev_id.to_string()];
    };
    let start = revisions.get("start").and_then(|s| s.as_u64()).unwrap_or_else(|| generation_of(leaf_rev_id));
    let ids: Vec<&str> = revisions
        .get("ids")
        .and_then(|i| i.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    if ids.is_empty() {
        return vec![leaf_rev_id.to_string()];
    }
    ids.iter()
        .enumerate()
        .map(|(i, suffix)| format!("{}-{}", start.saturating_sub(i as u64), suffix))
        .collect()
}

/// Builds a [`RevisionRef`] for a `new_edits=false` write: the body minus its
/// `_id`/`_rev`/`_revisions`/`_deleted` envelope fields, tagged with the
/// explicit revID the peer supplied.
pub fn revision_from_body(doc_id: &str, rev_id: &str, mut body: Value) -> RevisionRef {
    let deleted = body
        .get("_deleted")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if let Some(obj) = body.as_object_mut() {
        obj.remove("_id");
        obj.remove("_rev");
        obj.remove("_revisions");
        obj.remove("_deleted");
    }
    RevisionRef::new(doc_id, rev_id)
        .with_deleted(deleted)
        .with_body(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_from_body_builds_newest_first_chain() {
        let body = json!({"_revisions": {"start": 3, "ids": ["ccc", "bbb", "aaa"]}});
        assert_eq!(history_from_body(&body, "3-ccc"), vec!["3-ccc", "2-bbb", "1-aaa"]);
    }

    #[test]
    fn history_from_body_falls_back_to_leaf_when_absent() {
        let body = json!({});
        assert_eq!(history_from_body(&body, "1-xyz"), vec!["1-xyz".to_string()]);
    }

    #[test]
    fn revision_from_body_strips_envelope_fields() {
        let body = json!({"_id": "doc1", "_rev": "1-aaa", "x": 1});
        let rev = revision_from_body("doc1", "1-aaa", body);
        assert_eq!(rev.body.unwrap(), json!({"x": 1}));
    }
}
