use serde_json::Value;

/// Options for `changesSince` / the `_changes` endpoint.
///
/// Invariant: `sort_by_sequence` and `include_conflicts` are mutually
/// exclusive — conflict mode groups by `doc_id` instead of sorting by
/// sequence. [`ChangesOptions::new`] enforces this at construction.
#[derive(Debug, Clone)]
pub struct ChangesOptions {
    pub limit: Option<usize>,
    pub include_docs: bool,
    pub include_conflicts: bool,
    pub sort_by_sequence: bool,
    pub content_options: ContentOptions,
    pub update_seq: bool,
}

impl ChangesOptions {
    pub fn new(include_conflicts: bool) -> Self {
        Self {
            limit: None,
            include_docs: false,
            include_conflicts,
            sort_by_sequence: !include_conflicts,
            content_options: ContentOptions::default(),
            update_seq: false,
        }
    }
}

impl Default for ChangesOptions {
    fn default() -> Self {
        Self::new(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentOptions {
    pub include_attachments: bool,
    pub atts_since: Vec<String>,
}

/// Options for `_all_docs` and view queries.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub keys: Option<Vec<Value>>,
    pub skip: usize,
    pub limit: Option<usize>,
    pub start_key: Option<Value>,
    pub end_key: Option<Value>,
    pub descending: bool,
    pub reduce: Option<bool>,
    pub group: bool,
    pub group_level: Option<usize>,
    pub include_docs: bool,
    pub update_seq: bool,
    pub stale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_mode_disables_sort_by_sequence() {
        let opts = ChangesOptions::new(true);
        assert!(opts.include_conflicts);
        assert!(!opts.sort_by_sequence);

        let opts = ChangesOptions::new(false);
        assert!(!opts.include_conflicts);
        assert!(opts.sort_by_sequence);
    }
}
