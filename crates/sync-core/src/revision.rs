use serde_json::{json, Value};
use std::cmp::Ordering;

/// Immutable identity of one version of a document.
///
/// Equality and hashing are by `(doc_id, rev_id)` only: two `RevisionRef`s
/// naming the same revision are equal even if one carries a body and the
/// other doesn't.
#[derive(Debug, Clone)]
pub struct RevisionRef {
    pub doc_id: String,
    pub rev_id: String,
    pub deleted: bool,
    pub sequence: Option<u64>,
    pub body: Option<Value>,
}

impl RevisionRef {
    pub fn new(doc_id: impl Into<String>, rev_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            rev_id: rev_id.into(),
            deleted: false,
            sequence: None,
            body: None,
        }
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The leading integer of `rev_id`, e.g. `3` for `"3-abc123"`.
    pub fn generation(&self) -> u64 {
        generation_of(&self.rev_id)
    }
}

/// Parses the leading generation integer out of a `<generation>-<suffix>` revID.
/// Malformed revIDs (no digits, no separator) are treated as generation 0.
pub fn generation_of(rev_id: &str) -> u64 {
    rev_id
        .split_once('-')
        .and_then(|(gen, _)| gen.parse::<u64>().ok())
        .unwrap_or(0)
}

impl PartialEq for RevisionRef {
    fn eq(&self, other: &Self) -> bool {
        self.doc_id == other.doc_id && self.rev_id == other.rev_id
    }
}
impl Eq for RevisionRef {}

impl std::hash::Hash for RevisionRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.doc_id.hash(state);
        self.rev_id.hash(state);
    }
}

/// Embeds `_id`/`_rev`/`_revisions` (and `_deleted` when applicable) into a
/// revision's body for wire transmission, as the Pusher does when building a
/// `_bulk_docs` entry and `GET`'s `open_revs`/`atts_since` handling does when
/// rendering a revision for a replicating peer. `ancestors` is the
/// additional ancestor chain beyond `rev` itself, newest-first.
pub fn envelope(rev: &RevisionRef, ancestors: &[String]) -> Value {
    let mut ids: Vec<String> = vec![revision_suffix(&rev.rev_id)];
    ids.extend(ancestors.iter().map(|id| revision_suffix(id)));
    let mut doc = rev.body.clone().unwrap_or_else(|| json!({}));
    let obj = doc.as_object_mut().expect("document body is always a JSON object");
    obj.insert("_id".into(), json!(rev.doc_id));
    obj.insert("_rev".into(), json!(rev.rev_id));
    if rev.deleted {
        obj.insert("_deleted".into(), json!(true));
    }
    obj.insert(
        "_revisions".into(),
        json!({ "start": rev.generation(), "ids": ids }),
    );
    doc
}

fn revision_suffix(rev_id: &str) -> String {
    rev_id
        .split_once('-')
        .map(|(_, suffix)| suffix.to_string())
        .unwrap_or_else(|| rev_id.to_string())
}

/// An ordered multiset of [`RevisionRef`]s, as produced by `changesSince` and
/// consumed by the Batcher/Pusher/Puller pipelines.
#[derive(Debug, Clone, Default)]
pub struct RevisionList(pub Vec<RevisionRef>);

impl RevisionList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, rev: RevisionRef) {
        self.0.push(rev);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RevisionRef> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<RevisionRef> {
        self.0
    }

    /// Sorts the list by `sequence`, ascending; revisions with no sequence sort last.
    pub fn sort_by_sequence(&mut self) {
        self.0.sort_by(|a, b| match (a.sequence, b.sequence) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }

    /// Groups revisions by `doc_id`, preserving first-seen order of doc IDs.
    pub fn group_by_doc_id(&self) -> Vec<(String, Vec<&RevisionRef>)> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: std::collections::HashMap<String, Vec<&RevisionRef>> =
            std::collections::HashMap::new();
        for rev in &self.0 {
            groups.entry(rev.doc_id.clone()).or_insert_with(|| {
                order.push(rev.doc_id.clone());
                Vec::new()
            });
            groups.get_mut(&rev.doc_id).unwrap().push(rev);
        }
        order
            .into_iter()
            .map(|id| {
                let revs = groups.remove(&id).unwrap_or_default();
                (id, revs)
            })
            .collect()
    }

    pub fn max_sequence(&self) -> Option<u64> {
        self.0.iter().filter_map(|r| r.sequence).max()
    }
}

impl FromIterator<RevisionRef> for RevisionList {
    fn from_iter<T: IntoIterator<Item = RevisionRef>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for RevisionList {
    type Item = RevisionRef;
    type IntoIter = std::vec::IntoIter<RevisionRef>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_parses_leading_integer() {
        assert_eq!(generation_of("3-abc123"), 3);
        assert_eq!(generation_of("12-deadbeef"), 12);
        assert_eq!(generation_of("garbage"), 0);
    }

    #[test]
    fn envelope_embeds_id_rev_and_revisions_history() {
        let rev = RevisionRef::new("doc1", "2-bbb").with_body(json!({"x": 1}));
        let doc = envelope(&rev, &["1-aaa".to_string()]);
        assert_eq!(doc["_id"], "doc1");
        assert_eq!(doc["_rev"], "2-bbb");
        assert_eq!(doc["x"], 1);
        assert_eq!(doc["_revisions"]["start"], 2);
        assert_eq!(doc["_revisions"]["ids"], json!(["bbb", "aaa"]));
    }

    #[test]
    fn envelope_marks_deleted_tombstones() {
        let rev = RevisionRef::new("doc1", "1-aaa").with_deleted(true);
        let doc = envelope(&rev, &[]);
        assert_eq!(doc["_deleted"], true);
    }

    #[test]
    fn equality_ignores_body_and_sequence() {
        let a = RevisionRef::new("doc1", "1-aaa").with_sequence(5);
        let b = RevisionRef::new("doc1", "1-aaa").with_body(serde_json::json!({"x": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn group_by_doc_id_preserves_first_seen_order() {
        let mut list = RevisionList::new();
        list.push(RevisionRef::new("b", "1-x"));
        list.push(RevisionRef::new("a", "1-y"));
        list.push(RevisionRef::new("b", "2-z"));
        let groups = list.group_by_doc_id();
        let ids: Vec<_> = groups.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn sort_by_sequence_puts_none_last() {
        let mut list = RevisionList::new();
        list.push(RevisionRef::new("a", "1-x").with_sequence(3));
        list.push(RevisionRef::new("b", "1-y"));
        list.push(RevisionRef::new("c", "1-z").with_sequence(1));
        list.sort_by_sequence();
        let seqs: Vec<_> = list.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![Some(1), Some(3), None]);
    }
}
