//! End-to-end Pusher/Puller test: two in-process Routers, each backed by its
//! own `MemoryDatabase`, talking over real loopback HTTP (§10.5) rather than
//! a mocked transport.

use std::sync::Arc;
use std::time::Duration;

use sync_core::Database;
use sync_replicator::{FeedMode, Puller, Pusher, Replicator, ReplicatorOptions};
use sync_router::{build_router, AppState, DatabaseFactory};
use sync_test_support::MemoryDatabase;
use tokio::net::TcpListener;

struct MemoryFactory;
impl DatabaseFactory for MemoryFactory {
    fn create(&self, name: &str) -> Arc<dyn Database> {
        Arc::new(MemoryDatabase::new(name))
    }
}

/// Starts a Router over a fresh loopback listener and returns its base URL.
async fn spawn_server(db_name: &str, db: Arc<dyn Database>) -> url::Url {
    let state = AppState::new(Arc::new(MemoryFactory));
    state.insert_database(db_name, db);
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    url::Url::parse(&format!("http://{addr}/{db_name}/")).unwrap()
}

async fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) {
    let start = tokio::time::Instant::now();
    while !cond() {
        if start.elapsed() > timeout {
            panic!("condition did not become true within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn pusher_replicates_local_changes_to_remote() {
    let source = Arc::new(MemoryDatabase::new("source"));
    source
        .put("doc1", Some(serde_json::json!({"x": 1})), None)
        .await
        .unwrap();

    let target_db: Arc<dyn Database> = Arc::new(MemoryDatabase::new("target"));
    let remote_url = spawn_server("target", target_db.clone()).await;

    let repl = Replicator::new(
        source.clone() as Arc<dyn Database>,
        reqwest::Client::new(),
        remote_url,
        true,
        ReplicatorOptions::default(),
        None,
        Box::new(Pusher::new()),
    );
    repl.start().await;

    wait_until(
        || {
            // A blocking check is fine here; get_document is cheap on the
            // in-memory store and this only runs in a poll loop.
            futures::executor::block_on(target_db.get_document("doc1", None))
                .ok()
                .flatten()
                .is_some()
        },
        Duration::from_secs(5),
    )
    .await;

    let replicated = target_db.get_document("doc1", None).await.unwrap().unwrap();
    assert_eq!(replicated.body.unwrap()["x"], 1);

    repl.stop().await;
}

#[tokio::test]
async fn puller_replicates_remote_changes_to_local() {
    let source_db: Arc<dyn Database> = Arc::new(MemoryDatabase::new("source"));
    source_db
        .put("doc2", Some(serde_json::json!({"y": 2})), None)
        .await
        .unwrap();
    let remote_url = spawn_server("source", source_db.clone()).await;

    let target = Arc::new(MemoryDatabase::new("target"));

    let repl = Replicator::new(
        target.clone() as Arc<dyn Database>,
        reqwest::Client::new(),
        remote_url,
        false,
        ReplicatorOptions::default(),
        None,
        Box::new(Puller::new(FeedMode::Normal)),
    );
    repl.start().await;

    wait_until(
        || {
            futures::executor::block_on(target.get_document("doc2", None))
                .ok()
                .flatten()
                .is_some()
        },
        Duration::from_secs(5),
    )
    .await;

    let replicated = target.get_document("doc2", None).await.unwrap().unwrap();
    assert_eq!(replicated.body.unwrap()["y"], 2);

    repl.stop().await;
}
