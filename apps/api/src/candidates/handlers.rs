use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::candidates::evaluation::{
    backfill_from_notes, store_ai_match, BackfillReport, DEFAULT_EVALUATOR,
};
use crate::candidates::import::{
    import_bulk, import_candidate, BulkEntry, BulkImportReport, ImportAction, ImportDefaults,
};
use crate::candidates::merge::CandidateUpdate;
use crate::candidates::store::{record_log, CandidateFilter};
use crate::errors::AppError;
use crate::models::audit::{LogAction, NewLogEntry, SyncLogEntry};
use crate::models::candidate::{
    AiMatchResult, CandidatePatch, CandidateStatus, CandidateView, ProgressEvent,
};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::{ok, Envelope};
use crate::state::AppState;

const DEFAULT_ACTOR: &str = "system";
const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 500;

fn actor_or_default(actor: Option<String>) -> String {
    actor
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_ACTOR.to_string())
}

#[derive(Debug, Serialize)]
pub struct CandidateResponse {
    pub data: CandidateView,
}

#[derive(Debug, Serialize)]
pub struct CandidateListResponse {
    pub count: usize,
    pub data: Vec<CandidateView>,
}

// ────────────────────────────────────────────────────────────────────────────
// Read
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/candidates
pub async fn handle_list_candidates(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<CandidateFilter>,
) -> Result<Json<Envelope<CandidateListResponse>>, AppError> {
    let records = state.store.list(&filter).await?;
    let data: Vec<CandidateView> = records.iter().map(CandidateView::from).collect();
    Ok(ok(CandidateListResponse {
        count: data.len(),
        data,
    }))
}

/// GET /api/candidates/:id
pub async fn handle_get_candidate(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<Envelope<CandidateResponse>>, AppError> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {id} not found")))?;
    Ok(ok(CandidateResponse {
        data: CandidateView::from(&record),
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Import
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(flatten)]
    pub candidate: CandidatePatch,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub action: ImportAction,
    pub data: CandidateView,
}

/// POST /api/candidates
pub async fn handle_create_candidate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ImportRequest>,
) -> Result<(StatusCode, Json<Envelope<ImportResponse>>), AppError> {
    let actor = actor_or_default(req.actor);
    let defaults = ImportDefaults::manual(&actor, &state.config.default_consultant);
    let outcome = import_candidate(state.store.as_ref(), req.candidate, &defaults).await?;
    state.sync_queue.enqueue(outcome.candidate.id, "import");

    let status = match outcome.action {
        ImportAction::Created => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((
        status,
        ok(ImportResponse {
            action: outcome.action,
            data: CandidateView::from(&outcome.candidate),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct BulkImportRequest {
    /// Decoded element by element so one bad entry fails alone.
    pub candidates: Vec<Value>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// POST /api/candidates/bulk
pub async fn handle_bulk_import(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BulkImportRequest>,
) -> Result<Json<Envelope<BulkImportReport>>, AppError> {
    let actor = actor_or_default(req.actor);
    let defaults = ImportDefaults::manual(&actor, &state.config.default_consultant);
    let entries = req.candidates.into_iter().map(BulkEntry::from).collect();
    let report = import_bulk(state.store.as_ref(), entries, &defaults).await?;
    for id in report.touched_ids() {
        state.sync_queue.enqueue(id, "bulk_import");
    }
    Ok(ok(report))
}

// ────────────────────────────────────────────────────────────────────────────
// Field patch and status
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ProgressEventInput {
    pub event: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchRequest {
    #[serde(flatten)]
    pub fields: CandidatePatch,
    #[serde(default)]
    pub progress_event: Option<ProgressEventInput>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// PATCH /api/candidates/:id
///
/// Last write wins for every supplied field. An optional progress event is
/// appended after the write.
pub async fn handle_patch_candidate(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(req): ApiJson<PatchRequest>,
) -> Result<Json<Envelope<CandidateResponse>>, AppError> {
    let actor = actor_or_default(req.actor);
    if let Some(raw) = req.fields.status.as_deref().filter(|s| !s.trim().is_empty()) {
        parse_status(raw)?;
    }
    let fields = req.fields.canonicalize().fit_to_schema();
    if fields.name.is_some() && !fields.has_name() {
        return Err(AppError::Validation("name must not be blank".to_string()));
    }
    let update = CandidateUpdate::overwrite(&fields);
    if update.is_empty() && req.progress_event.is_none() {
        return Err(AppError::Validation("nothing to update".to_string()));
    }

    let mut record = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {id} not found")))?;
    if !update.is_empty() {
        record = state
            .store
            .apply_update(id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Candidate {id} not found")))?;
    }
    if let Some(input) = req.progress_event {
        let event = ProgressEvent::today(input.event, &actor, input.note);
        record = state
            .store
            .append_progress(id, &event)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Candidate {id} not found")))?;
    }

    record_log(
        state.store.as_ref(),
        NewLogEntry::new(
            &actor,
            LogAction::FieldUpdate,
            json!({ "fields": update.changed_fields() }),
        )
        .for_candidate(record.id, record.name.clone()),
    )
    .await;
    state.sync_queue.enqueue(record.id, "patch");

    Ok(ok(CandidateResponse {
        data: CandidateView::from(&record),
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

fn parse_status(raw: &str) -> Result<CandidateStatus, AppError> {
    CandidateStatus::parse(raw)
        .ok_or_else(|| AppError::Validation(format!("unknown status '{}'", raw.trim())))
}

/// PUT /api/candidates/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> Result<Json<Envelope<CandidateResponse>>, AppError> {
    let status = parse_status(&req.status)?;
    let actor = actor_or_default(req.actor);
    let event = ProgressEvent::today(status.label(), &actor, req.note);

    let record = state
        .store
        .update_status(id, status, &event, &actor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {id} not found")))?;
    state.sync_queue.enqueue(record.id, "status_change");

    Ok(ok(CandidateResponse {
        data: CandidateView::from(&record),
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Batch operations
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub id: i32,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchResult {
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub succeeded: Vec<i32>,
    pub failed: Vec<BatchFailure>,
}

impl BatchResult {
    fn record(&mut self, id: i32, outcome: Result<bool, AppError>) {
        match outcome {
            Ok(true) => self.succeeded.push(id),
            Ok(false) => self.failed.push(BatchFailure {
                id,
                reason: "not found".to_string(),
            }),
            Err(e) => self.failed.push(BatchFailure {
                id,
                reason: e.reason(),
            }),
        }
        self.succeeded_count = self.succeeded.len();
        self.failed_count = self.failed.len();
    }
}

fn require_ids(ids: &[i32]) -> Result<(), AppError> {
    if ids.is_empty() {
        return Err(AppError::Validation("ids must not be empty".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct BatchStatusRequest {
    pub ids: Vec<i32>,
    pub status: String,
    #[serde(default)]
    pub actor: Option<String>,
}

/// PATCH /api/candidates/batch-status
pub async fn handle_batch_status(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BatchStatusRequest>,
) -> Result<Json<Envelope<BatchResult>>, AppError> {
    require_ids(&req.ids)?;
    let status = parse_status(&req.status)?;
    let actor = actor_or_default(req.actor);

    let mut result = BatchResult::default();
    for id in req.ids {
        let event = ProgressEvent::today(status.label(), &actor, None);
        let outcome = state.store.update_status(id, status, &event, &actor).await;
        if matches!(outcome, Ok(Some(_))) {
            state.sync_queue.enqueue(id, "status_change");
        }
        result.record(id, outcome.map(|r| r.is_some()));
    }

    info!(
        "Batch status → {}: {} succeeded, {} failed",
        status.as_str(),
        result.succeeded_count,
        result.failed_count
    );
    Ok(ok(result))
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<i32>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// DELETE /api/candidates/batch
pub async fn handle_batch_delete(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BatchDeleteRequest>,
) -> Result<Json<Envelope<BatchResult>>, AppError> {
    require_ids(&req.ids)?;
    let actor = actor_or_default(req.actor);

    let mut result = BatchResult::default();
    for id in req.ids {
        let outcome = state.store.delete(id, &actor).await;
        result.record(id, outcome.map(|r| r.is_some()));
    }

    info!(
        "Batch delete by {actor}: {} deleted, {} failed",
        result.succeeded_count, result.failed_count
    );
    Ok(ok(result))
}

// ────────────────────────────────────────────────────────────────────────────
// AI match
// ────────────────────────────────────────────────────────────────────────────

/// PUT /api/candidates/:id/ai-match
pub async fn handle_put_ai_match(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(result): ApiJson<AiMatchResult>,
) -> Result<Json<Envelope<CandidateResponse>>, AppError> {
    let actor = if result.evaluated_by.trim().is_empty() {
        DEFAULT_EVALUATOR.to_string()
    } else {
        result.evaluated_by.clone()
    };
    let record = store_ai_match(state.store.as_ref(), id, result, &actor).await?;
    Ok(ok(CandidateResponse {
        data: CandidateView::from(&record),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct BackfillRequest {
    #[serde(default)]
    pub actor: Option<String>,
}

/// POST /api/candidates/ai-match/backfill
pub async fn handle_backfill_ai_match(
    State(state): State<AppState>,
    body: Option<ApiJson<BackfillRequest>>,
) -> Result<Json<Envelope<BackfillReport>>, AppError> {
    let actor = body
        .and_then(|ApiJson(b)| b.actor)
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EVALUATOR.to_string());
    let report = backfill_from_notes(state.store.as_ref(), &actor).await?;
    Ok(ok(report))
}

// ────────────────────────────────────────────────────────────────────────────
// Audit log
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogListResponse {
    pub data: Vec<SyncLogEntry>,
}

/// GET /api/system-logs
pub async fn handle_system_logs(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> Result<Json<Envelope<LogListResponse>>, AppError> {
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .min(MAX_LOG_LIMIT);
    let data = state.store.recent_logs(limit).await?;
    Ok(ok(LogListResponse { data }))
}
