//! Attachment handlers: `PUT/GET/DELETE /db/docID/attName` (§4.9).

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use sync_core::SyncError;

use crate::path::validate_doc_id;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct AttachmentQuery {
    rev: Option<String>,
}

pub async fn get_attachment(
    State(state): State<AppState>,
    Path((db, doc_id, name)): Path<(String, String, String)>,
    Query(q): Query<AttachmentQuery>,
) -> Result<Response, SyncError> {
    validate_doc_id(&doc_id)?;
    let handle = state.get_database(&db)?;
    let blob = handle
        .get_attachment(&doc_id, q.rev.as_deref(), &name)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("{doc_id}/{name}")))?;
    let content_type = HeaderValue::from_str(&blob.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        blob.data,
    )
        .into_response())
}

pub async fn put_attachment(
    State(state): State<AppState>,
    Path((db, doc_id, name)): Path<(String, String, String)>,
    Query(q): Query<AttachmentQuery>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<Response, SyncError> {
    validate_doc_id(&doc_id)?;
    let handle = state.get_database(&db)?;
    let prev_rev = q.rev.clone().or_else(|| {
        headers
            .get(header::IF_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
    });
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let rev = handle
        .put_attachment(&doc_id, prev_rev.as_deref(), &name, &content_type, bytes.to_vec())
        .await?;
    Ok((
        StatusCode::CREATED,
        axum::Json(json!({ "ok": true, "id": doc_id, "rev": rev.rev_id })),
    )
        .into_response())
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    Path((db, doc_id, name)): Path<(String, String, String)>,
    Query(q): Query<AttachmentQuery>,
    headers: HeaderMap,
) -> Result<Response, SyncError> {
    validate_doc_id(&doc_id)?;
    let handle = state.get_database(&db)?;
    let prev_rev = q
        .rev
        .clone()
        .or_else(|| {
            headers
                .get(header::IF_MATCH)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim_matches('"').to_string())
        })
        .ok_or_else(|| SyncError::BadParam("DELETE requires ?rev=".to_string()))?;
    let rev = handle.delete_attachment(&doc_id, &prev_rev, &name).await?;
    Ok(axum::Json(json!({ "ok": true, "id": doc_id, "rev": rev.rev_id })).into_response())
}
