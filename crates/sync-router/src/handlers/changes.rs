//! `GET/POST /db/_changes`: normal, longpoll, and continuous feeds (§4.9, §8).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use sync_core::{ChangesOptions, Database, RevisionList, RevisionRef, SyncError};

use crate::ndjson::stream_response;
use crate::query::{feed_mode, parse_changes_options};
use crate::state::AppState;

const RESERVED_PARAMS: &[&str] = &[
    "since", "limit", "include_docs", "update_seq", "attachments", "style", "feed", "filter",
];

fn filter_params(params: &HashMap<String, String>) -> Value {
    let map: serde_json::Map<String, Value> = params
        .iter()
        .filter(|(k, _)| !RESERVED_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}

async fn filtered_changes(
    handle: &std::sync::Arc<dyn Database>,
    since: u64,
    opts: &ChangesOptions,
    filter: Option<&str>,
    params: &Value,
) -> Result<RevisionList, SyncError> {
    handle.changes_since(since, opts, filter, Some(params)).await
}

fn render_row(rev: &RevisionRef, include_docs: bool) -> Value {
    let mut row = json!({
        "seq": rev.sequence.unwrap_or(0),
        "id": rev.doc_id,
        "changes": [{ "rev": rev.rev_id }],
    });
    if rev.deleted {
        row["deleted"] = json!(true);
    }
    if include_docs {
        row["doc"] = rev.body.clone().unwrap_or(Value::Null);
    }
    row
}

fn render_conflict_row(doc_id: &str, revs: &[&RevisionRef], include_docs: bool) -> Value {
    let max_seq = revs.iter().filter_map(|r| r.sequence).max().unwrap_or(0);
    let changes: Vec<Value> = revs.iter().map(|r| json!({ "rev": r.rev_id })).collect();
    let mut row = json!({ "seq": max_seq, "id": doc_id, "changes": changes });
    if let Some(winner) = revs.iter().max_by_key(|r| r.sequence.unwrap_or(0)) {
        if winner.deleted {
            row["deleted"] = json!(true);
        }
        if include_docs {
            row["doc"] = winner.body.clone().unwrap_or(Value::Null);
        }
    }
    row
}

fn render_results(list: RevisionList, opts: &ChangesOptions) -> Vec<Value> {
    if opts.include_conflicts {
        let mut rows: Vec<(u64, Value)> = list
            .group_by_doc_id()
            .into_iter()
            .map(|(doc_id, revs)| {
                let max_seq = revs.iter().filter_map(|r| r.sequence).max().unwrap_or(0);
                (max_seq, render_conflict_row(&doc_id, &revs, opts.include_docs))
            })
            .collect();
        // Conflict mode groups by doc_id first, which scrambles sequence
        // order; re-sort by `seq` and re-apply `limit` before rendering.
        rows.sort_by_key(|(seq, _)| *seq);
        let mut rows: Vec<Value> = rows.into_iter().map(|(_, row)| row).collect();
        if let Some(limit) = opts.limit {
            rows.truncate(limit);
        }
        rows
    } else {
        list.iter().map(|r| render_row(r, opts.include_docs)).collect()
    }
}

pub async fn changes(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let (opts, since) = parse_changes_options(&params)?;
    let filter = params.get("filter").map(String::as_str);
    let fp = filter_params(&params);
    let feed = feed_mode(&params);

    match feed {
        "continuous" => Ok(continuous_feed(handle, since, opts, params).into_response()),
        "longpoll" => {
            let mut rx = handle.subscribe_changes();
            let mut list = filtered_changes(&handle, since, &opts, filter, &fp).await?;
            if list.is_empty() {
                loop {
                    match rx.recv().await {
                        Ok(rev) => {
                            let passes = match filter {
                                Some(name) => handle.run_filter(name, &fp, &rev).await.unwrap_or(true),
                                None => true,
                            };
                            if passes {
                                list.push(rev);
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            let last_seq = handle.last_sequence().await;
            let results = render_results(list, &opts);
            Ok(axum::Json(json!({ "results": results, "last_seq": last_seq })).into_response())
        }
        _ => {
            let list = filtered_changes(&handle, since, &opts, filter, &fp).await?;
            let last_seq = handle.last_sequence().await;
            let results = render_results(list, &opts);
            Ok(axum::Json(json!({ "results": results, "last_seq": last_seq })).into_response())
        }
    }
}

fn continuous_feed(
    handle: std::sync::Arc<dyn Database>,
    since: u64,
    opts: ChangesOptions,
    params: HashMap<String, String>,
) -> Response {
    let filter = params.get("filter").cloned();
    let fp = filter_params(&params);
    let include_docs = opts.include_docs;

    let backlog = stream::once({
        let handle = handle.clone();
        let opts = opts.clone();
        let filter = filter.clone();
        let fp = fp.clone();
        async move {
            let list = filtered_changes(&handle, since, &opts, filter.as_deref(), &fp)
                .await
                .unwrap_or_default();
            stream::iter(list.into_vec())
        }
    })
    .flatten();

    let live = stream::unfold(handle.subscribe_changes(), move |mut rx| {
        let filter = filter.clone();
        let fp = fp.clone();
        let handle = handle.clone();
        async move {
            loop {
                match rx.recv().await {
                    Ok(rev) => {
                        let passes = match &filter {
                            Some(name) => handle.run_filter(name, &fp, &rev).await.unwrap_or(true),
                            None => true,
                        };
                        if passes {
                            return Some((rev, rx));
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
                }
            }
        }
    });

    let rows = backlog.chain(live).map(move |rev| render_row(&rev, include_docs));
    stream_response(rows)
}
