//! `POST /_replicate`, `GET /_active_tasks` (§4.2, §4.9).

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use sync_core::SyncError;
use sync_replicator::{FeedMode, Puller, Pusher, Replicator, ReplicatorOptions};

use crate::ndjson::stream_response;
use crate::state::AppState;

fn endpoint_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn is_remote(endpoint: &str) -> bool {
    url::Url::parse(endpoint).map(|u| u.host_str().is_some()).unwrap_or(false)
}

#[derive(Debug, Deserialize)]
pub struct ReplicateBody {
    source: Value,
    target: Value,
    #[serde(default)]
    continuous: bool,
    #[serde(default)]
    create_target: bool,
    #[serde(default)]
    cancel: bool,
    filter: Option<String>,
    query_params: Option<Value>,
}

/// Resolves `(local_db_name, remote_url, push)` from a `source`/`target`
/// pair, or `BadRequest` for the local-to-local / remote-to-remote
/// combinations this router doesn't broker (§1 Non-goals: no multi-hop
/// relay).
fn resolve_direction(body: &ReplicateBody) -> Result<(String, url::Url, bool), SyncError> {
    let source = endpoint_str(&body.source)
        .ok_or_else(|| SyncError::BadParam("source must be a string or {url}".to_string()))?;
    let target = endpoint_str(&body.target)
        .ok_or_else(|| SyncError::BadParam("target must be a string or {url}".to_string()))?;

    match (is_remote(&source), is_remote(&target)) {
        (false, true) => {
            let url = url::Url::parse(&target).map_err(|e| SyncError::BadParam(e.to_string()))?;
            Ok((source, url, true))
        }
        (true, false) => {
            let url = url::Url::parse(&source).map_err(|e| SyncError::BadParam(e.to_string()))?;
            Ok((target, url, false))
        }
        (true, true) => Err(SyncError::BadRequest(
            "remote-to-remote replication is not brokered by this server".to_string(),
        )),
        (false, false) => Err(SyncError::BadRequest(
            "local-to-local replication is not supported".to_string(),
        )),
    }
}

pub async fn replicate(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<ReplicateBody>,
) -> Result<Response, SyncError> {
    let (local_db, remote_url, push) = resolve_direction(&body)?;
    let handle = state.get_database(&local_db)?;

    let options = ReplicatorOptions {
        reset: false,
        create_target: body.create_target,
        filter: body.filter.clone(),
        query_params: body.query_params.clone(),
        continuous: body.continuous,
        headers: HashMap::new(),
    };

    let inputs = sync_core::CheckpointInputs {
        local_uuid: &handle.private_uuid(),
        remote_url: remote_url.as_str(),
        push,
        filter: options.filter.as_deref(),
        filter_params: options.query_params.as_ref(),
    };
    let checkpoint_id = sync_core::checkpoint_id(&inputs);

    if body.cancel {
        let repl = state
            .find_replicator_by_checkpoint(&checkpoint_id)
            .ok_or_else(|| SyncError::NotFound("no matching replication to cancel".to_string()))?;
        repl.stop().await;
        state.unregister_replicator(&checkpoint_id);
        return Ok(axum::Json(json!({ "ok": true })).into_response());
    }

    if let Some(existing) = state.find_replicator_by_checkpoint(&checkpoint_id) {
        return Ok(axum::Json(snapshot_json(&existing.snapshot())).into_response());
    }

    let direction: Box<dyn sync_replicator::Direction> = if push {
        Box::new(Pusher::new())
    } else {
        let feed = if body.continuous { FeedMode::Continuous } else { FeedMode::Normal };
        Box::new(Puller::new(feed))
    };

    let repl = Replicator::new(
        handle,
        state.http_client.clone(),
        remote_url,
        push,
        options,
        None,
        direction,
    );
    repl.start().await;
    state.register_replicator(repl.clone());

    if body.continuous {
        Ok(axum::Json(json!({ "ok": true, "session_id": repl.session_id() })).into_response())
    } else {
        // One-shot replication: wait for the replicator to settle (stop
        // itself once idle, per §4.5) before responding, mirroring
        // CouchDB's synchronous `_replicate` contract.
        let mut events = repl.subscribe();
        loop {
            match events.recv().await {
                Ok(sync_replicator::ReplicatorEvent::Stopped(snap)) => {
                    state.unregister_replicator(&checkpoint_id);
                    return Ok(axum::Json(snapshot_json(&snap)).into_response());
                }
                Ok(_) => continue,
                Err(_) => return Ok(axum::Json(snapshot_json(&repl.snapshot())).into_response()),
            }
        }
    }
}

fn snapshot_json(snap: &sync_replicator::ReplicatorSnapshot) -> Value {
    json!({
        "ok": true,
        "session_id": snap.session_id,
        "history": [],
        "source_last_seq": snap.last_sequence,
        "no_changes": snap.changes_processed == 0 && snap.changes_total == 0,
    })
}

fn task_json(snap: &sync_replicator::ReplicatorSnapshot, checkpoint_id: &str) -> Value {
    json!({
        "type": "replication",
        "pid": checkpoint_id,
        "replication_id": checkpoint_id,
        "session_id": snap.session_id,
        "continuous": true,
        "source_push": snap.push,
        "status": if snap.online { "Running" } else { "Not running" },
        "last_sequence": snap.last_sequence,
        "revisions_checked": snap.changes_processed,
        "revisions_failed": snap.revisions_failed,
        "docs_written": snap.changes_processed,
        "changes_pending": snap.changes_total.saturating_sub(snap.changes_processed),
        "error": snap.error,
    })
}

pub async fn active_tasks(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, SyncError> {
    if params.get("feed").map(String::as_str) == Some("continuous") {
        return Ok(active_tasks_continuous(state).into_response());
    }
    let tasks: Vec<Value> = state
        .all_replicators()
        .iter()
        .map(|r| task_json(&r.snapshot(), r.checkpoint_id()))
        .collect();
    Ok(axum::Json(tasks).into_response())
}

fn active_tasks_continuous(state: AppState) -> Response {
    use futures::stream::{self, StreamExt};

    let streams = state.all_replicators().into_iter().map(|repl| {
        let checkpoint_id = repl.checkpoint_id().to_string();
        stream::unfold((repl, false), move |(repl, done)| {
            let checkpoint_id = checkpoint_id.clone();
            async move {
                if done {
                    return None;
                }
                let mut events = repl.subscribe();
                match events.recv().await {
                    Ok(sync_replicator::ReplicatorEvent::Progress(snap)) => {
                        Some((task_json(&snap, &checkpoint_id), (repl, false)))
                    }
                    Ok(sync_replicator::ReplicatorEvent::Stopped(snap)) => {
                        Some((task_json(&snap, &checkpoint_id), (repl, true)))
                    }
                    Err(_) => None,
                }
            }
        })
    });

    stream_response(stream::select_all(streams))
}
