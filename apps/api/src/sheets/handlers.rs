use axum::{extract::State, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::routes::extract::ApiJson;
use crate::routes::{ok, Envelope};
use crate::sheets::reconcile::{pull_from_mirror, ReconcileSummary};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SheetsSyncRequest {
    #[serde(default)]
    pub actor: Option<String>,
}

/// POST /api/sync/sheets-to-sql
///
/// Runs mirror→relational reconciliation, then queues newly created records
/// so their ids get written back into the mirror.
pub async fn handle_sheets_to_sql(
    State(state): State<AppState>,
    body: Option<ApiJson<SheetsSyncRequest>>,
) -> Result<Json<Envelope<ReconcileSummary>>, AppError> {
    let actor = body
        .and_then(|ApiJson(b)| b.actor)
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| "sheets-sync".to_string());

    let summary = pull_from_mirror(state.store.as_ref(), state.mirror.as_ref(), &actor).await?;
    for id in &summary.created_ids {
        state.sync_queue.enqueue(*id, "sheets_reconcile");
    }
    Ok(ok(summary))
}
