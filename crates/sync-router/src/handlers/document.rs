//! Document-level handlers: `GET/PUT/DELETE /db/docID`, `_local/docID`,
//! `_design/ddoc` as a plain document, and `POST /db` (server-assigned ID)
//! (§4.9).

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use sync_core::{Database, OpenRevResult, RevisionRef, SyncError};

use crate::encoding::{history_from_body, revision_from_body};
use crate::multipart;
use crate::path::validate_doc_id;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct DocQuery {
    rev: Option<String>,
    #[serde(default)]
    new_edits: Option<bool>,
    open_revs: Option<String>,
    attachments: Option<bool>,
    atts_since: Option<String>,
}

fn etag_header(rev_id: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{rev_id}\"")).unwrap_or(HeaderValue::from_static("\"\""))
}

fn if_none_match_satisfied(headers: &HeaderMap, rev_id: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_matches('"') == rev_id)
}

fn wants_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("multipart/"))
}

/// Renders one open revision's body, stripping attachments into a separate
/// multipart part set when the client asked for them inline (`GET` with
/// `Accept: multipart/*`) and eliding attachments whose `revpos` predates
/// every ancestor in `atts_since`.
async fn render_revision(
    db: &std::sync::Arc<dyn Database>,
    rev: &RevisionRef,
    include_attachments: bool,
    atts_since: &[String],
    multipart_requested: bool,
) -> Result<(Value, Vec<multipart::MultipartAttachment>), SyncError> {
    let mut body = rev.body.clone().unwrap_or_else(|| json!({}));
    let obj = body.as_object_mut().expect("document body is always a JSON object");
    obj.insert("_id".into(), json!(rev.doc_id));
    obj.insert("_rev".into(), json!(rev.rev_id));
    if rev.deleted {
        obj.insert("_deleted".into(), json!(true));
    }

    let meta = db.list_attachments(&rev.doc_id, &rev.rev_id).await?;
    if meta.is_empty() {
        return Ok((body, Vec::new()));
    }
    // `_attachments` always serializes in key order (no `preserve_order`
    // feature on `serde_json`); parts are emitted in the same order so the
    // decode side can zip them back onto their stub entries positionally.
    let mut meta: Vec<_> = meta.into_iter().collect();
    meta.sort_by(|a, b| a.0.cmp(&b.0));

    let min_ancestor_gen = atts_since
        .iter()
        .map(|id| sync_core::generation_of(id))
        .max()
        .unwrap_or(0);

    let mut attachments_field = serde_json::Map::new();
    let mut parts = Vec::new();
    for (name, m) in &meta {
        let elided = m.revpos <= min_ancestor_gen;
        if elided {
            attachments_field.insert(
                name.clone(),
                json!({ "content_type": m.content_type, "length": m.length, "revpos": m.revpos, "stub": true }),
            );
            continue;
        }
        if !include_attachments {
            attachments_field.insert(
                name.clone(),
                json!({ "content_type": m.content_type, "length": m.length, "revpos": m.revpos, "stub": true }),
            );
            continue;
        }
        if multipart_requested {
            attachments_field.insert(
                name.clone(),
                json!({ "content_type": m.content_type, "length": m.length, "revpos": m.revpos, "follows": true }),
            );
            if let Some(blob) = db.get_attachment(&rev.doc_id, Some(&rev.rev_id), name).await? {
                parts.push(multipart::MultipartAttachment {
                    name: name.clone(),
                    content_type: blob.content_type,
                    data: blob.data,
                });
            }
        } else if let Some(blob) = db.get_attachment(&rev.doc_id, Some(&rev.rev_id), name).await? {
            use base64::Engine;
            attachments_field.insert(
                name.clone(),
                json!({
                    "content_type": blob.content_type,
                    "length": m.length,
                    "revpos": m.revpos,
                    "data": base64::engine::general_purpose::STANDARD.encode(&blob.data),
                }),
            );
        }
    }
    body.as_object_mut()
        .unwrap()
        .insert("_attachments".into(), Value::Object(attachments_field));
    Ok((body, parts))
}

pub async fn get_doc(
    State(state): State<AppState>,
    Path((db, doc_id)): Path<(String, String)>,
    Query(q): Query<DocQuery>,
    headers: HeaderMap,
) -> Result<Response, SyncError> {
    validate_doc_id(&doc_id)?;
    let handle = state.get_database(&db)?;

    if let Some(open_revs) = &q.open_revs {
        let results = if open_revs == "all" {
            handle
                .get_all_revisions(&doc_id)
                .await?
                .into_iter()
                .map(OpenRevResult::Ok)
                .collect::<Vec<_>>()
        } else {
            let rev_ids: Vec<String> = serde_json::from_str(open_revs)
                .map_err(|e| SyncError::BadParam(format!("invalid open_revs: {e}")))?;
            handle.get_open_revisions(&doc_id, &rev_ids).await?
        };
        let mut rows = Vec::new();
        for r in results {
            match r {
                OpenRevResult::Ok(rev) => {
                    let (body, _) = render_revision(&handle, &rev, false, &[], false).await?;
                    rows.push(json!({ "ok": body }));
                }
                OpenRevResult::Missing(id) => rows.push(json!({ "missing": id })),
            }
        }
        return Ok(axum::Json(Value::Array(rows)).into_response());
    }

    let rev = handle
        .get_document(&doc_id, q.rev.as_deref())
        .await?
        .ok_or_else(|| SyncError::NotFound(doc_id.clone()))?;
    if rev.deleted && q.rev.is_none() {
        return Err(SyncError::NotFound(doc_id));
    }

    if if_none_match_satisfied(&headers, &rev.rev_id) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let atts_since: Vec<String> = q
        .atts_since
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    let multipart_requested = wants_multipart(&headers);
    let include_attachments = q.attachments.unwrap_or(false) || multipart_requested;
    let (body, atts) = render_revision(&handle, &rev, include_attachments, &atts_since, multipart_requested).await?;

    let mut resp = if multipart_requested && !atts.is_empty() {
        let (content_type, bytes) = multipart::encode(&body, &atts);
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type)],
            bytes,
        )
            .into_response()
    } else {
        axum::Json(body).into_response()
    };
    resp.headers_mut().insert(header::ETAG, etag_header(&rev.rev_id));
    Ok(resp)
}

async fn request_body_to_value(
    headers: &HeaderMap,
    bytes: &Bytes,
) -> Result<(Value, Vec<multipart::MultipartAttachment>), SyncError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");
    if content_type.starts_with("multipart/related") {
        let (root, parts) = multipart::decode(content_type, bytes)?;
        let Value::Object(root_obj) = &root else {
            return Err(SyncError::BadJson("multipart root must be an object".to_string()));
        };
        // `_attachments` serializes in key order, and the encoder emits parts
        // in that same order, so a stub's position in the sorted key list
        // lines up with its binary part's position in the wire body.
        let mut stubs: Vec<(String, String)> = root_obj
            .get("_attachments")
            .and_then(|a| a.as_object())
            .map(|m| {
                m.iter()
                    .filter(|(_, v)| v.get("follows").and_then(Value::as_bool).unwrap_or(false))
                    .map(|(name, v)| {
                        let content_type = v
                            .get("content_type")
                            .and_then(Value::as_str)
                            .unwrap_or("application/octet-stream")
                            .to_string();
                        (name.clone(), content_type)
                    })
                    .collect()
            })
            .unwrap_or_default();
        stubs.sort_by(|a, b| a.0.cmp(&b.0));
        let attachments = stubs
            .into_iter()
            .zip(parts)
            .map(|((name, content_type), data)| multipart::MultipartAttachment {
                name,
                content_type,
                data,
            })
            .collect();
        Ok((root, attachments))
    } else {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| SyncError::BadJson(e.to_string()))?;
        Ok((value, Vec::new()))
    }
}

pub async fn put_doc(
    State(state): State<AppState>,
    Path((db, doc_id)): Path<(String, String)>,
    Query(q): Query<DocQuery>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<Response, SyncError> {
    validate_doc_id(&doc_id)?;
    let handle = state.get_database(&db)?;
    let (mut body, attachments) = request_body_to_value(&headers, &bytes).await?;

    let prev_rev = q
        .rev
        .clone()
        .or_else(|| body.get("_rev").and_then(|v| v.as_str().map(str::to_string)))
        .or_else(|| {
            headers
                .get(header::IF_MATCH)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim_matches('"').to_string())
        });

    let mut rev = if q.new_edits == Some(false) {
        let rev_id = body
            .get("_rev")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::BadParam("new_edits=false requires _rev".to_string()))?
            .to_string();
        let history = history_from_body(&body, &rev_id);
        let rev = revision_from_body(&doc_id, &rev_id, body);
        handle.force_insert(rev.clone(), &history).await?;
        rev
    } else {
        let deleted = body.get("_deleted").and_then(Value::as_bool).unwrap_or(false);
        if let Some(obj) = body.as_object_mut() {
            obj.remove("_id");
            obj.remove("_rev");
            obj.remove("_deleted");
        }
        let put_body = if deleted { None } else { Some(body) };
        handle.put(&doc_id, put_body, prev_rev.as_deref()).await?
    };

    for att in attachments {
        rev = handle
            .put_attachment(&doc_id, Some(&rev.rev_id), &att.name, &att.content_type, att.data)
            .await?;
    }

    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&format!("/{db}/{doc_id}")).unwrap_or(HeaderValue::from_static("")),
    );
    resp_headers.insert(header::ETAG, etag_header(&rev.rev_id));
    Ok((
        StatusCode::CREATED,
        resp_headers,
        axum::Json(json!({ "ok": true, "id": doc_id, "rev": rev.rev_id })),
    )
        .into_response())
}

pub async fn create_doc(
    State(state): State<AppState>,
    Path(db): Path<String>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let (mut body, _) = request_body_to_value(&headers, &bytes).await?;
    let doc_id = body
        .get("_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| state.next_uuid());
    validate_doc_id(&doc_id)?;
    if let Some(obj) = body.as_object_mut() {
        obj.remove("_id");
        obj.remove("_rev");
    }
    let rev = handle.put(&doc_id, Some(body), None).await?;
    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&format!("/{db}/{doc_id}")).unwrap_or(HeaderValue::from_static("")),
    );
    Ok((
        StatusCode::CREATED,
        resp_headers,
        axum::Json(json!({ "ok": true, "id": doc_id, "rev": rev.rev_id })),
    )
        .into_response())
}

pub async fn delete_doc(
    State(state): State<AppState>,
    Path((db, doc_id)): Path<(String, String)>,
    Query(q): Query<DocQuery>,
    headers: HeaderMap,
) -> Result<Response, SyncError> {
    validate_doc_id(&doc_id)?;
    let handle = state.get_database(&db)?;
    let prev_rev = q.rev.clone().or_else(|| {
        headers
            .get(header::IF_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
    });
    let prev_rev = prev_rev.ok_or_else(|| SyncError::BadParam("DELETE requires ?rev=".to_string()))?;
    let rev = handle.put(&doc_id, None, Some(&prev_rev)).await?;
    Ok(axum::Json(json!({ "ok": true, "id": doc_id, "rev": rev.rev_id })).into_response())
}

// ---- `_local/<id>` (§3 "Database handle", §4.9): bypasses conflict
// handling and `open_revs` entirely.

pub async fn get_local(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let doc_id = format!("_local/{id}");
    let body = handle
        .get_local_document(&doc_id)
        .await?
        .ok_or_else(|| SyncError::NotFound(doc_id))?;
    Ok(axum::Json(body).into_response())
}

pub async fn put_local(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
    axum::Json(body): axum::Json<Value>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let doc_id = format!("_local/{id}");
    handle.put_local(&doc_id, body).await?;
    Ok((StatusCode::CREATED, axum::Json(json!({ "ok": true, "id": doc_id }))).into_response())
}

pub async fn delete_local(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let doc_id = format!("_local/{id}");
    handle.delete_local(&doc_id).await?;
    Ok(axum::Json(json!({ "ok": true })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_quoted_rev_id() {
        let h = etag_header("1-abc");
        assert_eq!(h.to_str().unwrap(), "\"1-abc\"");
    }
}
