//! View handlers: `GET/POST /db/_design/ddoc/_view/view`, `POST /db/_temp_view`
//! (§4.9).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use std::collections::HashMap;
use sync_core::SyncError;

use crate::query::parse_query_options;
use crate::state::AppState;

#[derive(Debug, serde::Deserialize, Default)]
pub struct ViewBody {
    keys: Option<Vec<Value>>,
}

fn render_view(result: sync_core::AllDocsResult) -> Response {
    let rows: Vec<Value> = result
        .rows
        .iter()
        .map(|r| {
            let mut row = json!({ "id": r.id, "key": r.key, "value": r.rev });
            if let Some(doc) = &r.doc {
                row["doc"] = doc.clone();
            }
            row
        })
        .collect();
    axum::Json(json!({ "total_rows": result.total_rows, "offset": result.offset, "rows": rows })).into_response()
}

async fn run_view(
    state: &AppState,
    db: &str,
    ddoc: &str,
    view: &str,
    params: &HashMap<String, String>,
    keys: Option<Vec<Value>>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(db)?;
    let opts = parse_query_options(params, keys)?;
    let token = handle.compile_view(ddoc, view).await?;
    if !opts.stale {
        handle.update_index(&token).await?;
    }
    let result = handle.query_view(&token, &opts).await?;
    Ok(render_view(result))
}

pub async fn view_get(
    State(state): State<AppState>,
    Path((db, ddoc, view)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, SyncError> {
    run_view(&state, &db, &ddoc, &view, &params, None).await
}

pub async fn view_post(
    State(state): State<AppState>,
    Path((db, ddoc, view)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    axum::Json(body): axum::Json<ViewBody>,
) -> Result<Response, SyncError> {
    run_view(&state, &db, &ddoc, &view, &params, body.keys).await
}

#[derive(Debug, serde::Deserialize)]
pub struct TempViewBody {
    map: String,
    reduce: Option<String>,
}

pub async fn temp_view(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    axum::Json(body): axum::Json<TempViewBody>,
) -> Result<Response, SyncError> {
    let handle = state.get_database(&db)?;
    let opts = parse_query_options(&params, None)?;
    let token = handle.compile_temp_view(&body.map, body.reduce.as_deref()).await?;
    let result = async {
        handle.update_index(&token).await?;
        handle.query_view(&token, &opts).await
    }
    .await;
    handle.teardown_view(&token).await;
    Ok(render_view(result?))
}
