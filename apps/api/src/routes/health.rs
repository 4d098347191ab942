use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// GET /api/health
/// Reports service version and whether the database answers.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!("Health check database query failed: {e}");
            "unavailable"
        }
    };
    Json(json!({
        "success": true,
        "status": "ok",
        "database": database,
        "version": env!("CARGO_PKG_VERSION"),
        "service": "headhunter-api"
    }))
}
