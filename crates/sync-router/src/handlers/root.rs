//! Server-level handlers: `GET /`, `_all_dbs`, `_uuids`, `_session`,
//! `_persona_assertion` (§4.4, §4.9).

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "CouchbaseLite": "Welcome",
        "couchdb": "Welcome",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn all_dbs(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.database_names())
}

#[derive(Debug, Deserialize)]
pub struct UuidsQuery {
    count: Option<usize>,
}

pub async fn uuids(State(state): State<AppState>, Query(q): Query<UuidsQuery>) -> Json<Value> {
    let count = q.count.unwrap_or(1).clamp(0, 1000);
    let uuids: Vec<String> = (0..count).map(|_| state.next_uuid()).collect();
    Json(json!({ "uuids": uuids }))
}

/// No multi-tenant auth is implemented (§1 Non-goals); this just reports an
/// anonymous session so clients that probe `_session` before replicating
/// don't stall.
pub async fn session() -> Json<Value> {
    Json(json!({
        "ok": true,
        "userCtx": { "name": Value::Null, "roles": Value::Array(vec![]) },
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    name: Option<String>,
}

/// `POST /_session`: accepts any credentials and hands back a session
/// cookie, mirroring [`sync_replicator::SessionCookieAuthorizer`]'s login
/// contract from the other side. Real credential checking is out of scope
/// (§1 Non-goals) — this exists so clients using cookie auth against this
/// server have something to log into.
pub async fn login(axum::Json(body): axum::Json<LoginBody>) -> impl axum::response::IntoResponse {
    let name = body.name.unwrap_or_default();
    (
        [(axum::http::header::SET_COOKIE, "AuthSession=anonymous; Path=/; HttpOnly")],
        Json(json!({ "ok": true, "name": name, "roles": Value::Array(vec![]) })),
    )
}

#[derive(Debug, Deserialize)]
pub struct PersonaAssertionBody {
    assertion: Option<String>,
}

/// `POST /_persona_assertion`: accepts any assertion, matching
/// [`sync_replicator::PersonaAuthorizer`]'s login contract. Persona's
/// identity provider network shut down years ago; this endpoint exists
/// purely so the path grammar's contract holds for legacy clients.
pub async fn persona_assertion(
    axum::Json(_body): axum::Json<PersonaAssertionBody>,
) -> impl axum::response::IntoResponse {
    (
        [(axum::http::header::SET_COOKIE, "AuthSession=persona; Path=/; HttpOnly")],
        Json(json!({ "ok": true })),
    )
}
