//! Database-level handlers: `GET/PUT/DELETE /db`, `_all_docs`, `_bulk_docs`,
//! `_revs_diff`, `_purge`, `_compact`, `_ensure_full_commit` (§4.9).

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use std::collections::HashMap;
use sync_core::SyncError;

use crate::encoding::{history_from_body, revision_from_body};
use crate::path::validate_db_name;
use crate::query::parse_query_options;
use crate::state::AppState;

pub async fn get_db(
    State(state): State<AppState>,
    Path(db): Path<String>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    Ok(axum::Json(json!({
        "db_name": handle.db_name(),
        "db_uuid": handle.public_uuid(),
        "doc_count": handle.doc_count().await,
        "update_seq": handle.last_sequence().await,
        // The attachment blob store / on-disk layout is an external
        // collaborator (§1 "Out of scope"); this store keeps no byte-size
        // accounting to report here.
        "disk_size": 0,
    }))
    .into_response())
}

pub async fn put_db(
    State(state): State<AppState>,
    Path(db): Path<String>,
) -> Result<Response, SyncError> {
    validate_db_name(&db)?;
    state.create_database(&db)?;
    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&format!("/{db}")).unwrap_or(HeaderValue::from_static("")),
    );
    Ok((StatusCode::CREATED, resp_headers, axum::Json(json!({ "ok": true }))).into_response())
}

pub async fn delete_db(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, SyncError> {
    if params.contains_key("rev") {
        return Err(SyncError::BadRequest(
            "DELETE /db does not take a ?rev= parameter".to_string(),
        ));
    }
    state.delete_database(&db)?;
    Ok(axum::Json(json!({ "ok": true })).into_response())
}

pub async fn all_docs_get(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let opts = parse_query_options(&params, None)?;
    let result = handle.get_all_docs(&opts).await?;
    render_all_docs(result)
}

#[derive(Debug, serde::Deserialize, Default)]
pub struct AllDocsBody {
    keys: Option<Vec<Value>>,
}

pub async fn all_docs_post(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    axum::Json(body): axum::Json<AllDocsBody>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let opts = parse_query_options(&params, body.keys)?;
    let result = handle.get_all_docs(&opts).await?;
    render_all_docs(result)
}

fn render_all_docs(result: sync_core::AllDocsResult) -> Result<Response, SyncError> {
    let mut headers = HeaderMap::new();
    if let Some(seq) = result.update_seq {
        headers.insert(
            header::ETAG,
            header::HeaderValue::from_str(&format!("\"{seq}\"")).unwrap_or(header::HeaderValue::from_static("\"\"")),
        );
    }
    let rows: Vec<Value> = result
        .rows
        .iter()
        .map(|r| {
            let mut row = json!({
                "id": r.id,
                "key": r.key,
                "value": { "rev": r.rev, "deleted": r.deleted },
            });
            if let Some(doc) = &r.doc {
                row["doc"] = doc.clone();
            }
            row
        })
        .collect();
    let body = json!({
        "total_rows": result.total_rows,
        "offset": result.offset,
        "rows": rows,
    });
    Ok((headers, axum::Json(body)).into_response())
}

#[derive(Debug, serde::Deserialize)]
pub struct BulkDocsBody {
    docs: Vec<Value>,
    #[serde(default = "default_true")]
    new_edits: bool,
    #[serde(default)]
    all_or_nothing: bool,
}

fn default_true() -> bool {
    true
}

async fn apply_one_bulk_doc(
    handle: &std::sync::Arc<dyn sync_core::Database>,
    state: &AppState,
    new_edits: bool,
    doc: Value,
) -> (String, Result<String, SyncError>) {
    let doc_id = doc
        .get("_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| state.next_uuid());

    let outcome = if !new_edits {
        match doc.get("_rev").and_then(|v| v.as_str()) {
            Some(id) => {
                let rev_id = id.to_string();
                let history = history_from_body(&doc, &rev_id);
                let rev = revision_from_body(&doc_id, &rev_id, doc);
                handle.force_insert(rev, &history).await.map(|_| rev_id)
            }
            None => Err(SyncError::BadParam("missing _rev".to_string())),
        }
    } else {
        let prev_rev = doc.get("_rev").and_then(|v| v.as_str()).map(str::to_string);
        let deleted = doc.get("_deleted").and_then(Value::as_bool).unwrap_or(false);
        let mut body_to_write = doc;
        if let Some(obj) = body_to_write.as_object_mut() {
            obj.remove("_id");
            obj.remove("_rev");
            obj.remove("_deleted");
        }
        let put_body = if deleted { None } else { Some(body_to_write) };
        handle
            .put(&doc_id, put_body, prev_rev.as_deref())
            .await
            .map(|rev| rev.rev_id)
    };

    (doc_id, outcome)
}

/// `_bulk_docs`: per-doc results unless a failure demands the whole batch be
/// rolled back. A `ServerError` always aborts the transaction; `all_or_nothing`
/// aborts on any non-2xx outcome. Neither case is expressible against the
/// in-memory fake's per-doc commits, so "abort" here means: stop applying
/// further docs and report the failure as the sole result, matching what a
/// client observes even though already-applied docs on a real engine would
/// need a surrounding transaction to roll back too.
pub async fn bulk_docs(
    State(state): State<AppState>,
    Path(db): Path<String>,
    axum::Json(body): axum::Json<BulkDocsBody>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let mut results = Vec::with_capacity(body.docs.len());

    for doc in body.docs {
        let (doc_id, outcome) = apply_one_bulk_doc(&handle, &state, body.new_edits, doc).await;

        match outcome {
            // §4.9: successful entries are omitted entirely when
            // `new_edits==false` — the caller already knows the revIDs it
            // sent, so only failures are worth reporting back.
            Ok(rev_id) => {
                if !body.new_edits {
                    continue;
                }
                results.push(json!({ "ok": true, "id": doc_id, "rev": rev_id }));
            }
            Err(err) => {
                if err.status_code() == StatusCode::INTERNAL_SERVER_ERROR || body.all_or_nothing {
                    return Err(err);
                }
                results.push(json!({
                    "id": doc_id,
                    "error": err.error_name(),
                    "reason": err.to_string(),
                }));
            }
        }
    }

    Ok((StatusCode::CREATED, axum::Json(Value::Array(results))).into_response())
}

pub async fn revs_diff(
    State(state): State<AppState>,
    Path(db): Path<String>,
    axum::Json(mut requested): axum::Json<HashMap<String, Vec<String>>>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let original = requested.clone();
    handle.find_missing_revisions(&mut requested).await?;

    let mut response = serde_json::Map::new();
    for (doc_id, missing) in &requested {
        if missing.is_empty() {
            continue;
        }
        // §4.9: "possible_ancestors is computed against the highest-generation
        // missing revision only." The revisions that qualify as ancestors are
        // the ones from this same request that the store *does* have, at a
        // lower generation than that highest missing one — plus whatever
        // deeper history the store still retains for each of those.
        let newest_missing_gen = missing.iter().map(|r| sync_core::generation_of(r)).max().unwrap_or(0);
        let present: Vec<String> = original
            .get(doc_id)
            .into_iter()
            .flatten()
            .filter(|r| !missing.contains(r) && sync_core::generation_of(r) < newest_missing_gen)
            .cloned()
            .collect();
        let mut ancestors = present.clone();
        for rev_id in &present {
            if let Ok(deeper) = handle.get_possible_ancestor_revision_ids(doc_id, rev_id, 50).await {
                ancestors.extend(deeper);
            }
        }
        ancestors.sort_by_key(|r| std::cmp::Reverse(sync_core::generation_of(r)));
        ancestors.dedup();
        ancestors.truncate(50);
        let mut entry = json!({ "missing": missing });
        if !ancestors.is_empty() {
            entry["possible_ancestors"] = json!(ancestors);
        }
        response.insert(doc_id.clone(), entry);
    }
    Ok(axum::Json(Value::Object(response)).into_response())
}

pub async fn purge(
    State(state): State<AppState>,
    Path(db): Path<String>,
    axum::Json(docs): axum::Json<HashMap<String, Vec<String>>>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let purged = handle.purge(&docs).await?;
    Ok(axum::Json(json!({ "purge_seq": handle.last_sequence().await, "purged": purged })).into_response())
}

pub async fn compact(
    State(state): State<AppState>,
    Path(db): Path<String>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    handle.compact().await?;
    Ok((StatusCode::ACCEPTED, axum::Json(json!({ "ok": true }))).into_response())
}

pub async fn ensure_full_commit(
    State(state): State<AppState>,
    Path(db): Path<String>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    Ok(axum::Json(json!({
        "ok": true,
        "instance_start_time": handle.private_uuid(),
    }))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_docs_body_defaults_new_edits_true() {
        let body: BulkDocsBody = serde_json::from_value(json!({ "docs": [] })).unwrap();
        assert!(body.new_edits);
    }
}
