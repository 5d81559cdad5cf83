//! Wires the Router's `axum::Router` to a concrete store and a listening
//! socket, with graceful shutdown — the `control::startup` pattern, adapted
//! to `axum` 0.7's listener-owned `serve` and to this crate's store.

use std::sync::Arc;

use sync_core::Database;
use sync_router::{build_router, AppState, DatabaseFactory};
use sync_test_support::MemoryDatabase;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::shutdown;

/// The only concrete [`Database`] this codebase ships (§1 "Out of scope":
/// the storage engine itself is an external collaborator). Every database
/// name the Router creates gets a fresh in-memory store; restarting the
/// gateway process loses all data, same as CouchDB's `-m` memory-only mode.
struct MemoryFactory;

impl DatabaseFactory for MemoryFactory {
    fn create(&self, name: &str) -> Arc<dyn Database> {
        Arc::new(MemoryDatabase::new(name))
    }
}

pub fn app_state() -> AppState {
    AppState::new(Arc::new(MemoryFactory))
}

pub async fn run(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state).layer(TraceLayer::new_for_http());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal())
        .await?;

    Ok(())
}
