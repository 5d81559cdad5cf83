//! Per-endpoint handlers (§4.9), grouped by the resource they act on.
//! [`crate::build_router`] wires these into the path grammar of §4.8.

pub mod attachment;
pub mod changes;
pub mod database;
pub mod document;
pub mod replicate;
pub mod root;
pub mod view;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use sync_core::SyncError;

use crate::state::AppState;
use document::DocQuery;

/// `/<db>/_design/<ddoc>` addresses the design document itself as a plain
/// document (§4.9) — a separate two-segment path from `/<db>/<docID>`, so it
/// needs its own route, but the semantics are identical to an ordinary
/// document keyed by `_design/<ddoc>`.
fn design_doc_id(ddoc: &str) -> String {
    format!("_design/{ddoc}")
}

pub async fn get_design_doc(
    state: State<AppState>,
    Path((db, ddoc)): Path<(String, String)>,
    query: Query<DocQuery>,
    headers: HeaderMap,
) -> Result<Response, SyncError> {
    document::get_doc(state, Path((db, design_doc_id(&ddoc))), query, headers).await
}

pub async fn put_design_doc(
    state: State<AppState>,
    Path((db, ddoc)): Path<(String, String)>,
    query: Query<DocQuery>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<Response, SyncError> {
    document::put_doc(state, Path((db, design_doc_id(&ddoc))), query, headers, bytes).await
}

pub async fn delete_design_doc(
    state: State<AppState>,
    Path((db, ddoc)): Path<(String, String)>,
    query: Query<DocQuery>,
    headers: HeaderMap,
) -> Result<Response, SyncError> {
    document::delete_doc(state, Path((db, design_doc_id(&ddoc))), query, headers).await
}
