pub mod extract;
pub mod health;

use axum::{
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Serialize;

use crate::bot_config::handlers as bot_config;
use crate::candidates::handlers as candidates;
use crate::sheets::handlers as sheets;
use crate::sourcing::handlers as sourcing;
use crate::state::AppState;

/// Success envelope: `{"success": true, ...payload}`. Failures are rendered by
/// `AppError` as `{"success": false, "error", "code"}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

pub fn ok<T: Serialize>(body: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        body,
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health_handler))
        // Candidates
        .route(
            "/api/candidates",
            get(candidates::handle_list_candidates).post(candidates::handle_create_candidate),
        )
        .route("/api/candidates/bulk", post(candidates::handle_bulk_import))
        .route(
            "/api/candidates/batch-status",
            patch(candidates::handle_batch_status),
        )
        .route("/api/candidates/batch", delete(candidates::handle_batch_delete))
        .route(
            "/api/candidates/ai-match/backfill",
            post(candidates::handle_backfill_ai_match),
        )
        .route(
            "/api/candidates/:id",
            get(candidates::handle_get_candidate).patch(candidates::handle_patch_candidate),
        )
        .route(
            "/api/candidates/:id/status",
            put(candidates::handle_update_status),
        )
        .route(
            "/api/candidates/:id/ai-match",
            put(candidates::handle_put_ai_match),
        )
        .route("/api/system-logs", get(candidates::handle_system_logs))
        // Spreadsheet mirror
        .route("/api/sync/sheets-to-sql", post(sheets::handle_sheets_to_sql))
        // Bot scheduling
        .route(
            "/api/bot-config",
            get(bot_config::handle_get_config).put(bot_config::handle_put_config),
        )
        // External scraper / scorer
        .route(
            "/api/talent-sourcing/find-candidates",
            post(sourcing::handle_find_candidates),
        )
        .route("/api/talent-sourcing/score", post(sourcing::handle_score))
        .route("/api/talent-sourcing/health", get(sourcing::handle_health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tower::ServiceExt;

    use super::*;
    use crate::candidates::memory::MemoryCandidateStore;
    use crate::config::Config;
    use crate::sheets::memory::MemoryMirror;
    use crate::sheets::queue::{SyncQueue, SyncTask};
    use crate::sourcing::TalentSourcingClient;

    struct Harness {
        router: Router,
        store: Arc<MemoryCandidateStore>,
        tasks: UnboundedReceiver<SyncTask>,
    }

    fn harness(mirror: MemoryMirror) -> Harness {
        harness_with(mirror, MemoryCandidateStore::new())
    }

    fn harness_with(mirror: MemoryMirror, store: MemoryCandidateStore) -> Harness {
        let config = Config::test_defaults();
        // Never connected: these routes only touch the in-memory stores
        let db = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy(&config.database_url)
            .unwrap();
        let store = Arc::new(store);
        let (sync_queue, tasks) = SyncQueue::new();
        let state = AppState {
            db,
            store: store.clone(),
            mirror: Arc::new(mirror),
            sync_queue,
            sourcing: TalentSourcingClient::new(config.sourcing.clone()),
            config,
        };
        Harness {
            router: build_router(state),
            store,
            tasks,
        }
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        };
        send(router, method, uri, body).await
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_create_then_merge_via_api() {
        let mut h = harness(MemoryMirror::new());

        let (status, body) = call(
            &h.router,
            Method::POST,
            "/api/candidates",
            Some(json!({"name": "Alice", "years": 6, "actor": "Jacky"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["action"], "created");
        assert_eq!(body["data"]["years_experience"], 6);
        assert_eq!(body["data"]["status"], "not_started");
        assert_eq!(body["data"]["status_label"], "未開始");

        let (status, body) = call(
            &h.router,
            Method::POST,
            "/api/candidates",
            Some(json!({"name": " alice ", "phone": "0912"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"], "updated");
        assert_eq!(body["data"]["phone"], "0912");

        assert_eq!(h.store.records().len(), 1);
        assert_eq!(h.tasks.recv().await.unwrap().reason, "import");
        assert_eq!(h.tasks.recv().await.unwrap().reason, "import");
    }

    #[tokio::test]
    async fn test_missing_name_is_400_envelope() {
        let h = harness(MemoryMirror::new());
        let (status, body) = call(&h.router, Method::POST, "/api/candidates", Some(json!({"phone": "1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"], "name is required");
    }

    #[tokio::test]
    async fn test_unknown_candidate_is_404() {
        let h = harness(MemoryMirror::new());
        let (status, body) = call(&h.router, Method::GET, "/api/candidates/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_bulk_import_dedups_alice() {
        let h = harness(MemoryMirror::new());
        let (status, body) = call(
            &h.router,
            Method::POST,
            "/api/candidates/bulk",
            Some(json!({"candidates": [{"name": "Alice"}, {"name": "alice", "email": "a@x.com"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created_count"], 1);
        assert_eq!(body["updated_count"], 1);
        let records = h.store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Alice");
        assert_eq!(records[0].email.as_deref(), Some("a@x.com"));
    }

    #[tokio::test]
    async fn test_bulk_import_reports_non_object_entry() {
        let h = harness(MemoryMirror::new());
        let (status, body) = call(
            &h.router,
            Method::POST,
            "/api/candidates/bulk",
            Some(json!({"candidates": [{"name": "Alice"}, "garbage", {"name": "Bob"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created_count"], 2);
        assert_eq!(body["failed_count"], 1);
        assert_eq!(body["failed"][0]["index"], 1);
        assert_eq!(h.store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_bodies_use_error_envelope() {
        let h = harness(MemoryMirror::new());
        let (status, body) = send(
            &h.router,
            Method::POST,
            "/api/candidates",
            Body::from(r#"{"name":"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

        let (status, body) = call(
            &h.router,
            Method::PATCH,
            "/api/candidates/batch-status",
            Some(json!({"ids": "all", "status": "contacted"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = call(&h.router, Method::GET, "/api/candidates/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_batch_status_partial_failure() {
        let h = harness(MemoryMirror::new());
        for name in ["Bob", "Carol"] {
            call(&h.router, Method::POST, "/api/candidates", Some(json!({"name": name}))).await;
        }

        let (status, body) = call(
            &h.router,
            Method::PATCH,
            "/api/candidates/batch-status",
            Some(json!({"ids": [1, 2, 999], "status": "已聯繫", "actor": "Jacky"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["succeeded_count"], 2);
        assert_eq!(body["failed_count"], 1);
        assert_eq!(body["succeeded"], json!([1, 2]));
        assert_eq!(body["failed"], json!([{"id": 999, "reason": "not found"}]));

        let records = h.store.records();
        assert!(records.iter().all(|r| r.status == "contacted"));
        assert!(records.iter().all(|r| r.progress_tracking.0.len() == 1));
        assert_eq!(records[0].progress_tracking.0[0].by, "Jacky");
    }

    #[tokio::test]
    async fn test_status_change_and_patch() {
        let h = harness(MemoryMirror::new());
        call(&h.router, Method::POST, "/api/candidates", Some(json!({"name": "Dan"}))).await;

        let (status, _) = call(
            &h.router,
            Method::PUT,
            "/api/candidates/1/status",
            Some(json!({"status": "bogus"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &h.router,
            Method::PUT,
            "/api/candidates/1/status",
            Some(json!({"status": "interviewed", "actor": "Jacky", "note": "round 1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "interviewed");
        assert_eq!(body["data"]["progress_tracking"][0]["note"], "round 1");

        let (status, body) = call(
            &h.router,
            Method::PATCH,
            "/api/candidates/1",
            Some(json!({"location": "Tainan", "progress_event": {"event": "sent JD"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["location"], "Tainan");
        let events = body["data"]["progress_tracking"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["event"], "sent JD");
    }

    #[tokio::test]
    async fn test_batch_delete_logs_each_record() {
        let h = harness(MemoryMirror::new());
        call(&h.router, Method::POST, "/api/candidates", Some(json!({"name": "Eve"}))).await;

        let (status, body) = call(
            &h.router,
            Method::DELETE,
            "/api/candidates/batch",
            Some(json!({"ids": [1, 2]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["succeeded"], json!([1]));
        assert_eq!(body["failed_count"], 1);
        assert!(h.store.records().is_empty());

        let (_, logs) = call(&h.router, Method::GET, "/api/system-logs?limit=10", None).await;
        assert_eq!(logs["data"][0]["action"], "delete");
        assert_eq!(logs["data"][0]["candidate_name"], "Eve");
    }

    #[tokio::test]
    async fn test_sheets_to_sql_endpoint() {
        let csv = "姓名,Email\nCarol,c@x.com\nCarol,c2@x.com\n,\n";
        let mut h = harness(MemoryMirror::new().with_csv(csv));

        let (status, body) = call(&h.router, Method::POST, "/api/sync/sheets-to-sql", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["created"], 1);
        assert_eq!(body["skipped"], 1);
        assert_eq!(body["error_count"], 0);
        assert!(body.get("created_ids").is_none());
        assert_eq!(h.tasks.recv().await.unwrap().reason, "sheets_reconcile");
    }

    #[tokio::test]
    async fn test_sheets_to_sql_unavailable_is_502() {
        let h = harness(MemoryMirror::unavailable());
        let (status, body) = call(&h.router, Method::POST, "/api/sync/sheets-to-sql", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "EXTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_talent_sourcing_without_scripts() {
        let h = harness(MemoryMirror::new());
        let (status, body) = call(&h.router, Method::GET, "/api/talent-sourcing/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scripts_ready"], false);

        let (status, body) = call(
            &h.router,
            Method::POST,
            "/api/talent-sourcing/score",
            Some(json!({"candidates": [{"name": "Nina"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_patch_succeeds_when_audit_log_write_fails() {
        let mut h = harness_with(MemoryMirror::new(), MemoryCandidateStore::new().with_failing_logs());
        let (status, _) = call(&h.router, Method::POST, "/api/candidates", Some(json!({"name": "Gus"}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &h.router,
            Method::PATCH,
            "/api/candidates/1",
            Some(json!({"location": "Taichung"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["location"], "Taichung");
        assert_eq!(h.tasks.recv().await.unwrap().reason, "import");
        assert_eq!(h.tasks.recv().await.unwrap().reason, "patch");
    }
}
