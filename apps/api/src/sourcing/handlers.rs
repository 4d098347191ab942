use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::candidates::import::{
    import_bulk, BulkEntry, BulkImportReport, ImportDefaults, MAX_BULK_IMPORT,
};
use crate::candidates::store::record_log;
use crate::errors::AppError;
use crate::models::audit::{LogAction, NewLogEntry};
use crate::routes::extract::ApiJson;
use crate::routes::{ok, Envelope};
use crate::sourcing::{SearchRequest, SourcingHealth};
use crate::state::AppState;

const DEFAULT_ACTOR: &str = "AI搜尋";

#[derive(Debug, Deserialize)]
pub struct FindCandidatesRequest {
    #[serde(flatten)]
    pub search: SearchRequest,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FindCandidatesResponse {
    pub run_id: Uuid,
    pub found: usize,
    pub github_count: usize,
    pub linkedin_count: usize,
    pub rate_limit_warning: Option<String>,
    pub import: BulkImportReport,
}

/// POST /api/talent-sourcing/find-candidates
pub async fn handle_find_candidates(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<FindCandidatesRequest>,
) -> Result<Json<Envelope<FindCandidatesResponse>>, AppError> {
    if req.search.job_title.trim().is_empty() {
        return Err(AppError::Validation("job_title is required".to_string()));
    }
    let actor = req.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string());
    let run_id = Uuid::new_v4();
    info!("Talent sourcing run {run_id} for '{}' by {actor}", req.search.job_title);

    let output = state.sourcing.search(&req.search).await?;
    let found = output.all_candidates.len();
    let entries: Vec<BulkEntry> = output
        .all_candidates
        .into_iter()
        .map(|c| BulkEntry::Patch(c.into_patch(&actor)))
        .collect();

    let defaults = ImportDefaults {
        actor: actor.clone(),
        source: "talent_sourcing".to_string(),
        consultant: actor.clone(),
    };
    let mut report = BulkImportReport::default();
    for (n, chunk) in entries.chunks(MAX_BULK_IMPORT).enumerate() {
        let part = import_bulk(state.store.as_ref(), chunk.to_vec(), &defaults).await?;
        report.absorb(part, n * MAX_BULK_IMPORT);
    }
    for id in report.touched_ids() {
        state.sync_queue.enqueue(id, "talent_sourcing");
    }

    record_log(
        state.store.as_ref(),
        NewLogEntry::new(
            &actor,
            LogAction::TalentSourcing,
            json!({
                "run_id": run_id,
                "job_title": req.search.job_title,
                "found": found,
                "created": report.created_count,
                "updated": report.updated_count,
            }),
        ),
    )
    .await;

    Ok(ok(FindCandidatesResponse {
        run_id,
        found,
        github_count: output.github.map(|g| g.count).unwrap_or(0),
        linkedin_count: output.linkedin.map(|l| l.count).unwrap_or(0),
        rate_limit_warning: output.rate_limit_warning,
        import: report,
    }))
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub data: Value,
}

/// POST /api/talent-sourcing/score
pub async fn handle_score(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Envelope<ScoreResponse>>, AppError> {
    let has_candidates = body
        .get("candidates")
        .and_then(Value::as_array)
        .is_some_and(|c| !c.is_empty());
    if !has_candidates {
        return Err(AppError::Validation("candidates must be a non-empty array".to_string()));
    }
    let data = state.sourcing.score(&body).await?;
    Ok(ok(ScoreResponse { data }))
}

/// GET /api/talent-sourcing/health
pub async fn handle_health(State(state): State<AppState>) -> Json<Envelope<SourcingHealth>> {
    ok(state.sourcing.health().await)
}
