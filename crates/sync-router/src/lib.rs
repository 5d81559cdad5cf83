//! The REST Router (§4.8–§4.9): dispatches well-formed CouchDB-style
//! requests onto an embedded [`sync_core::Database`], including long-lived
//! streaming responses for continuous `_changes`/`_active_tasks` and
//! longpoll `_changes`.
//!
//! Dispatch itself is a small table (§9 "Dynamic dispatch on request path"):
//! [`build_router`] registers one `axum` route per path-grammar entry, with
//! static segments (`_all_docs`, `_bulk_docs`, …) taking priority over the
//! `:doc_id` wildcard the way `matchit` (axum's router) already resolves
//! route conflicts. Unknown paths 404 and known-path-wrong-method 405 by
//! that same router's default behavior, matching §4.8 exactly without extra
//! code.

pub mod encoding;
pub mod handlers;
pub mod multipart;
pub mod ndjson;
pub mod path;
pub mod query;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

pub use state::{AppState, DatabaseFactory};

/// Assembles the full path grammar of §4.8 into one `axum::Router`. CORS is
/// wide open by default: CouchDB-compatible clients are commonly
/// browser-embedded (PouchDB, the JS SDK), and this server carries no
/// cookie-based authority worth protecting beyond what `_session` already
/// guards (§1 Non-goals).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root::root))
        .route("/_all_dbs", get(handlers::root::all_dbs))
        .route("/_uuids", get(handlers::root::uuids))
        .route(
            "/_session",
            get(handlers::root::session).post(handlers::root::login),
        )
        .route("/_persona_assertion", post(handlers::root::persona_assertion))
        .route("/_replicate", post(handlers::replicate::replicate))
        .route("/_active_tasks", get(handlers::replicate::active_tasks))
        .route(
            "/:db",
            get(handlers::database::get_db)
                .put(handlers::database::put_db)
                .delete(handlers::database::delete_db)
                .post(handlers::document::create_doc),
        )
        .route(
            "/:db/_all_docs",
            get(handlers::database::all_docs_get).post(handlers::database::all_docs_post),
        )
        .route("/:db/_bulk_docs", post(handlers::database::bulk_docs))
        .route("/:db/_revs_diff", post(handlers::database::revs_diff))
        .route("/:db/_purge", post(handlers::database::purge))
        .route("/:db/_compact", post(handlers::database::compact))
        .route(
            "/:db/_ensure_full_commit",
            post(handlers::database::ensure_full_commit),
        )
        .route("/:db/_changes", get(handlers::changes::changes))
        .route("/:db/_temp_view", post(handlers::view::temp_view))
        .route(
            "/:db/_design/:ddoc/_view/:view",
            get(handlers::view::view_get).post(handlers::view::view_post),
        )
        .route(
            "/:db/_design/:ddoc",
            get(handlers::get_design_doc)
                .put(handlers::put_design_doc)
                .delete(handlers::delete_design_doc),
        )
        .route(
            "/:db/_local/:id",
            get(handlers::document::get_local)
                .put(handlers::document::put_local)
                .delete(handlers::document::delete_local),
        )
        .route(
            "/:db/:doc_id",
            get(handlers::document::get_doc)
                .put(handlers::document::put_doc)
                .delete(handlers::document::delete_doc),
        )
        .route(
            "/:db/:doc_id/:att_name",
            get(handlers::attachment::get_attachment)
                .put(handlers::attachment::put_attachment)
                .delete(handlers::attachment::delete_attachment),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use std::sync::Arc;
    use sync_test_support::MemoryDatabase;
    use tower::ServiceExt;

    struct MemoryFactory;
    impl DatabaseFactory for MemoryFactory {
        fn create(&self, name: &str) -> Arc<dyn sync_core::Database> {
            Arc::new(MemoryDatabase::new(name))
        }
    }

    fn test_app() -> Router {
        let state = AppState::new(Arc::new(MemoryFactory));
        state.insert_database("db", Arc::new(MemoryDatabase::new("db")));
        build_router(state)
    }

    #[tokio::test]
    async fn root_returns_welcome_payload() {
        let app = test_app();
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["couchdb"], "Welcome");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let app = test_app();
        let resp = app
            .oneshot(Request::builder().uri("/db/_nope/_nope/_nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn known_path_wrong_method_is_405() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/db")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn put_db_then_get_db_round_trips() {
        let state = AppState::new(Arc::new(MemoryFactory));
        let app = build_router(state);
        let resp = app
            .clone()
            .oneshot(Request::builder().method("PUT").uri("/newdb").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app
            .oneshot(Request::builder().uri("/newdb").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    /// §8 scenario 2: `PUT /db` twice reports `412` the second time.
    #[tokio::test]
    async fn put_db_twice_is_412() {
        let state = AppState::new(Arc::new(MemoryFactory));
        let app = build_router(state);
        let resp = app
            .clone()
            .oneshot(Request::builder().method("PUT").uri("/dup").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app
            .oneshot(Request::builder().method("PUT").uri("/dup").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn design_doc_path_round_trips_as_plain_document() {
        let app = test_app();
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/db/_design/foo")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"views":{}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app
            .oneshot(Request::builder().uri("/db/_design/foo").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    /// §8 boundaries: `_uuids?count=0` is empty; `count=10000` clamps to 1000.
    #[tokio::test]
    async fn uuids_count_is_clamped_to_1000() {
        let app = test_app();
        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/_uuids?count=0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["uuids"].as_array().unwrap().len(), 0);

        let resp = app
            .oneshot(Request::builder().uri("/_uuids?count=10000").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["uuids"].as_array().unwrap().len(), 1000);
    }

    /// §8 boundary: `_all_docs?limit=0` returns no rows but a correct total.
    #[tokio::test]
    async fn all_docs_limit_zero_returns_empty_rows_with_correct_total() {
        let app = test_app();
        for id in ["a", "b"] {
            let resp = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("PUT")
                        .uri(format!("/db/{id}"))
                        .header("content-type", "application/json")
                        .body(Body::from(r#"{}"#))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let resp = app
            .oneshot(Request::builder().uri("/db/_all_docs?limit=0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["total_rows"], 2);
        assert_eq!(body["rows"].as_array().unwrap().len(), 0);
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// §8 scenario 3: `_bulk_docs` with two fresh docs creates both.
    #[tokio::test]
    async fn bulk_docs_creates_every_doc() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/db/_bulk_docs")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"docs":[{"_id":"a","x":1},{"_id":"b","x":2}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row["ok"], true);
            assert!(row["rev"].as_str().unwrap().starts_with("1-"));
        }
    }

    /// §8 scenario 4: `_revs_diff` reports only the genuinely-missing
    /// revision and names the one we already have as a possible ancestor.
    #[tokio::test]
    async fn revs_diff_reports_missing_and_possible_ancestor() {
        let app = test_app();
        let put = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/db/a")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"x":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let rev: serde_json::Value = json_body(put).await;
        let rev_id = rev["rev"].as_str().unwrap().to_string();
        assert!(rev_id.starts_with("1-"));

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/db/_revs_diff")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(r#"{{"a":["{rev_id}","2-y"]}}"#)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["a"]["missing"], serde_json::json!(["2-y"]));
        assert_eq!(body["a"]["possible_ancestors"], serde_json::json!([rev_id]));
    }

    /// §8 scenario 5: `_changes?since=0` after two creates returns both rows
    /// in sequence order and the correct `last_seq`.
    #[tokio::test]
    async fn changes_since_zero_lists_both_docs_in_order() {
        let app = test_app();
        for id in ["a", "b"] {
            let resp = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("PUT")
                        .uri(format!("/db/{id}"))
                        .header("content-type", "application/json")
                        .body(Body::from(r#"{"x":1}"#))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let resp = app
            .oneshot(Request::builder().uri("/db/_changes?since=0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["last_seq"], 2);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["id"], "a");
        assert_eq!(results[0]["seq"], 1);
        assert_eq!(results[1]["id"], "b");
        assert_eq!(results[1]["seq"], 2);
    }

    /// §8 boundary: `_changes?since=<current>&feed=longpoll` does not return
    /// until a change lands, then returns exactly that one batch.
    #[tokio::test]
    async fn changes_longpoll_waits_for_a_change_then_returns_once() {
        let app = test_app();
        let put = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/db/a")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"x":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::CREATED);

        let app2 = app.clone();
        let waiter = tokio::spawn(async move {
            app2.oneshot(
                Request::builder()
                    .uri("/db/_changes?since=1&feed=longpoll")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let put2 = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/db/b")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"x":2}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put2.status(), StatusCode::CREATED);

        let resp = tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("longpoll should resolve once the change arrives")
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["id"], "b");
    }

    /// §8 round-trip: PUT a doc, attach a binary blob, GET it back untouched.
    #[tokio::test]
    async fn attachment_round_trips_through_put_and_get() {
        let app = test_app();
        let put_doc = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/db/a")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"x":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put_doc.status(), StatusCode::CREATED);
        let rev_id = json_body(put_doc).await["rev"].as_str().unwrap().to_string();

        let put_att = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/db/a/photo.bin?rev={rev_id}"))
                    .header("content-type", "application/octet-stream")
                    .body(Body::from(vec![1u8, 2, 3, 4]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put_att.status(), StatusCode::CREATED);

        let get_att = app
            .oneshot(Request::builder().uri("/db/a/photo.bin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(get_att.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(get_att.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), &[1u8, 2, 3, 4]);
    }

    /// A compiled view indexes existing docs and returns rows in key order.
    #[tokio::test]
    async fn view_query_returns_indexed_rows() {
        let state = AppState::new(Arc::new(MemoryFactory));
        let db = Arc::new(MemoryDatabase::new("db"));
        db.register_view("design", "by_x", |_doc_id, body| {
            body.get("x")
                .map(|x| vec![(x.clone(), serde_json::Value::Null)])
                .unwrap_or_default()
        });
        state.insert_database("db", db);
        let app = build_router(state);

        for (id, x) in [("a", 2), ("b", 1)] {
            let resp = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("PUT")
                        .uri(format!("/db/{id}"))
                        .header("content-type", "application/json")
                        .body(Body::from(format!(r#"{{"x":{x}}}"#)))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/db/_design/design/_view/by_x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], "b");
        assert_eq!(rows[1]["id"], "a");
    }

    /// §4.9: cancelling a replication that was never started 404s.
    #[tokio::test]
    async fn replicate_cancel_with_no_match_is_404() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/_replicate")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"source":"db","target":"http://example.invalid/db","cancel":true}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    /// §4.8: local-to-local replication isn't brokered by this router.
    /// Direction resolution runs before the target database is looked up, so
    /// this 400s even though `other` was never created.
    #[tokio::test]
    async fn replicate_local_to_local_is_bad_request() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/_replicate")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"source":"db","target":"other"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
