//! Query-string parsing for `ChangesOptions`/`QueryOptions` (§3, §4.8
//! "query parsing"). Handlers extract the raw query string as a
//! `HashMap<String, String>` and run it through these helpers rather than
//! deriving per-endpoint `Deserialize` structs, since CouchDB's query
//! parameters are untyped JSON-in-a-string (`startkey=%22foo%22`).

use serde_json::Value;
use std::collections::HashMap;
use sync_core::{ChangesOptions, ContentOptions, QueryOptions, SyncError};

fn bool_param(params: &HashMap<String, String>, key: &str) -> bool {
    params.get(key).map(|v| v == "true").unwrap_or(false)
}

fn json_param(params: &HashMap<String, String>, key: &str) -> Result<Option<Value>, SyncError> {
    match params.get(key) {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| SyncError::BadParam(format!("invalid JSON for `{key}`: {e}"))),
    }
}

fn usize_param(params: &HashMap<String, String>, key: &str) -> Result<Option<usize>, SyncError> {
    match params.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| SyncError::BadParam(format!("`{key}` must be a non-negative integer"))),
    }
}

/// Parses `_changes` query parameters, returning `(opts, since, feed, limit)`.
/// `style=all_docs` selects conflict mode (§4.9).
pub fn parse_changes_options(
    params: &HashMap<String, String>,
) -> Result<(ChangesOptions, u64), SyncError> {
    let since = match params.get("since") {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| SyncError::BadParam("`since` must be an integer".to_string()))?,
        None => 0,
    };
    let include_conflicts = params.get("style").map(|s| s == "all_docs").unwrap_or(false);
    let mut opts = ChangesOptions::new(include_conflicts);
    opts.limit = usize_param(params, "limit")?;
    opts.include_docs = bool_param(params, "include_docs");
    opts.update_seq = bool_param(params, "update_seq");
    opts.content_options = ContentOptions {
        include_attachments: bool_param(params, "attachments"),
        atts_since: Vec::new(),
    };
    Ok((opts, since))
}

pub fn feed_mode(params: &HashMap<String, String>) -> &str {
    params.get("feed").map(String::as_str).unwrap_or("normal")
}

/// Parses `_all_docs`/view query parameters into a [`QueryOptions`].
/// `keys_from_body` takes precedence over a `?keys=` query parameter, since
/// `POST /db/_all_docs` supplies `{"keys": [...]}` in the body instead.
pub fn parse_query_options(
    params: &HashMap<String, String>,
    keys_from_body: Option<Vec<Value>>,
) -> Result<QueryOptions, SyncError> {
    let keys = match keys_from_body {
        Some(keys) => Some(keys),
        None => match json_param(params, "keys")? {
            Some(Value::Array(items)) => Some(items),
            Some(_) => return Err(SyncError::BadParam("`keys` must be a JSON array".to_string())),
            None => None,
        },
    };
    Ok(QueryOptions {
        keys,
        skip: usize_param(params, "skip")?.unwrap_or(0),
        limit: usize_param(params, "limit")?,
        start_key: json_param(params, "startkey")?,
        end_key: json_param(params, "endkey")?,
        descending: bool_param(params, "descending"),
        reduce: params.get("reduce").map(|v| v == "true"),
        group: bool_param(params, "group"),
        group_level: usize_param(params, "group_level")?,
        include_docs: bool_param(params, "include_docs"),
        update_seq: bool_param(params, "update_seq"),
        stale: matches!(params.get("stale").map(String::as_str), Some("ok") | Some("update_after")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changes_options_defaults_to_non_conflict_mode() {
        let params = HashMap::new();
        let (opts, since) = parse_changes_options(&params).unwrap();
        assert_eq!(since, 0);
        assert!(!opts.include_conflicts);
        assert!(opts.sort_by_sequence);
    }

    #[test]
    fn style_all_docs_selects_conflict_mode() {
        let mut params = HashMap::new();
        params.insert("style".to_string(), "all_docs".to_string());
        let (opts, _) = parse_changes_options(&params).unwrap();
        assert!(opts.include_conflicts);
        assert!(!opts.sort_by_sequence);
    }

    #[test]
    fn query_options_parses_json_keys_and_bounds() {
        let mut params = HashMap::new();
        params.insert("limit".to_string(), "5".to_string());
        params.insert("startkey".to_string(), "\"a\"".to_string());
        params.insert("descending".to_string(), "true".to_string());
        let opts = parse_query_options(&params, None).unwrap();
        assert_eq!(opts.limit, Some(5));
        assert_eq!(opts.start_key, Some(Value::String("a".to_string())));
        assert!(opts.descending);
    }

    #[test]
    fn body_keys_take_precedence_over_query_keys() {
        let mut params = HashMap::new();
        params.insert("keys".to_string(), "[\"x\"]".to_string());
        let opts = parse_query_options(&params, Some(vec![Value::String("y".to_string())])).unwrap();
        assert_eq!(opts.keys, Some(vec![Value::String("y".to_string())]));
    }
}
