//! Candidate persistence. `AppState` carries an `Arc<dyn CandidateStore>`;
//! production uses [`PgCandidateStore`] over `candidates_pipeline`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, info};

use crate::candidates::merge::CandidateUpdate;
use crate::errors::AppError;
use crate::models::audit::{NewLogEntry, SheetSyncOutcome, SyncLogEntry};
use crate::models::candidate::{
    normalize_name, CandidatePatch, CandidateRecord, CandidateStatus, ProgressEvent, TextField,
};

pub const DEFAULT_LIST_LIMIT: i64 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateFilter {
    pub consultant: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

impl CandidateFilter {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(DEFAULT_LIST_LIMIT)
    }
}

#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Newest first.
    async fn list(&self, filter: &CandidateFilter) -> Result<Vec<CandidateRecord>, AppError>;

    async fn get(&self, id: i32) -> Result<Option<CandidateRecord>, AppError>;

    /// Lowest-id record whose trimmed, lower-cased name equals `normalized`.
    async fn find_by_name(&self, normalized: &str) -> Result<Option<CandidateRecord>, AppError>;

    /// Normalized name → id for every record (lowest id wins on collisions).
    async fn name_index(&self) -> Result<HashMap<String, i32>, AppError>;

    /// Inserts a new record. The patch must carry a name and a status.
    async fn insert(&self, patch: &CandidatePatch) -> Result<CandidateRecord, AppError>;

    async fn apply_update(
        &self,
        id: i32,
        update: &CandidateUpdate,
    ) -> Result<Option<CandidateRecord>, AppError>;

    async fn append_progress(
        &self,
        id: i32,
        event: &ProgressEvent,
    ) -> Result<Option<CandidateRecord>, AppError>;

    /// Sets the status, appends the progress event, and writes the audit entry
    /// atomically.
    async fn update_status(
        &self,
        id: i32,
        status: CandidateStatus,
        event: &ProgressEvent,
        actor: &str,
    ) -> Result<Option<CandidateRecord>, AppError>;

    /// Hard delete plus audit entry.
    async fn delete(&self, id: i32, actor: &str) -> Result<Option<CandidateRecord>, AppError>;

    /// Records whose notes carry a `NN/100` score but no structured result yet.
    async fn with_unparsed_scores(&self) -> Result<Vec<CandidateRecord>, AppError>;

    async fn append_log(&self, entry: &NewLogEntry) -> Result<(), AppError>;

    async fn recent_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>, AppError>;

    async fn record_sheet_sync(&self, outcome: &SheetSyncOutcome) -> Result<(), AppError>;
}

/// Writes an audit entry for work that has already been committed. A failed
/// write is logged and swallowed so the caller still gets its result.
pub async fn record_log(store: &dyn CandidateStore, entry: NewLogEntry) {
    if let Err(e) = store.append_log(&entry).await {
        error!("Failed to record {:?} audit log: {e}", entry.action);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgCandidateStore {
    pool: PgPool,
}

impl PgCandidateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_LOG_SQL: &str = r#"
    INSERT INTO system_logs (actor, action, candidate_id, candidate_name, detail)
    VALUES ($1, $2, $3, $4, $5)
"#;

#[async_trait]
impl CandidateStore for PgCandidateStore {
    async fn list(&self, filter: &CandidateFilter) -> Result<Vec<CandidateRecord>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM candidates_pipeline WHERE TRUE");
        if let Some(consultant) = &filter.consultant {
            qb.push(" AND consultant = ").push_bind(consultant.clone());
        }
        if let Some(status) = &filter.status {
            let key = CandidateStatus::from_cell(status).as_str();
            qb.push(" AND status = ").push_bind(key);
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.effective_limit());

        Ok(qb
            .build_query_as::<CandidateRecord>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get(&self, id: i32) -> Result<Option<CandidateRecord>, AppError> {
        Ok(
            sqlx::query_as::<_, CandidateRecord>("SELECT * FROM candidates_pipeline WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_by_name(&self, normalized: &str) -> Result<Option<CandidateRecord>, AppError> {
        Ok(sqlx::query_as::<_, CandidateRecord>(
            "SELECT * FROM candidates_pipeline WHERE LOWER(TRIM(name)) = $1 ORDER BY id LIMIT 1",
        )
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn name_index(&self) -> Result<HashMap<String, i32>, AppError> {
        let rows: Vec<(i32, String)> =
            sqlx::query_as("SELECT id, name FROM candidates_pipeline ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        let mut index = HashMap::with_capacity(rows.len());
        for (id, name) in rows {
            index.entry(normalize_name(&name)).or_insert(id);
        }
        debug!("Loaded name index with {} entries", index.len());
        Ok(index)
    }

    async fn insert(&self, patch: &CandidatePatch) -> Result<CandidateRecord, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO candidates_pipeline (");
        let mut columns = qb.separated(", ");
        for field in TextField::ALL {
            columns.push(field.column());
        }
        columns.push("notes");
        columns.push("work_history");
        columns.push("education_details");
        qb.push(") VALUES (");
        let mut values = qb.separated(", ");
        for field in TextField::ALL {
            values.push_bind(patch.text(field).map(str::to_string));
        }
        values.push_bind(patch.notes.clone());
        values.push_bind(patch.work_history.clone());
        values.push_bind(patch.education_details.clone());
        qb.push(") RETURNING *");

        let record = qb
            .build_query_as::<CandidateRecord>()
            .fetch_one(&self.pool)
            .await?;
        info!("Inserted candidate {} ({})", record.id, record.name);
        Ok(record)
    }

    async fn apply_update(
        &self,
        id: i32,
        update: &CandidateUpdate,
    ) -> Result<Option<CandidateRecord>, AppError> {
        let mut qb =
            QueryBuilder::<Postgres>::new("UPDATE candidates_pipeline SET updated_at = NOW()");
        for (field, value) in &update.texts {
            qb.push(", ")
                .push(field.column())
                .push(" = ")
                .push_bind(value.clone());
        }
        if let Some(notes) = &update.notes {
            qb.push(", notes = ").push_bind(notes.clone());
        }
        if let Some(history) = &update.work_history {
            qb.push(", work_history = ").push_bind(history.clone());
        }
        if let Some(details) = &update.education_details {
            qb.push(", education_details = ").push_bind(details.clone());
        }
        if let Some(result) = &update.ai_match_result {
            qb.push(", ai_match_result = ").push_bind(result.clone());
        }
        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        Ok(qb
            .build_query_as::<CandidateRecord>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn append_progress(
        &self,
        id: i32,
        event: &ProgressEvent,
    ) -> Result<Option<CandidateRecord>, AppError> {
        // Append-only: concatenate, never rewrite the existing array
        Ok(sqlx::query_as::<_, CandidateRecord>(
            r#"
            UPDATE candidates_pipeline
            SET progress_tracking = progress_tracking || $1::jsonb,
                updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(Json(vec![event.clone()]))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn update_status(
        &self,
        id: i32,
        status: CandidateStatus,
        event: &ProgressEvent,
        actor: &str,
    ) -> Result<Option<CandidateRecord>, AppError> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT status FROM candidates_pipeline WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(previous) = previous else {
            tx.rollback().await?;
            return Ok(None);
        };

        let record = sqlx::query_as::<_, CandidateRecord>(
            r#"
            UPDATE candidates_pipeline
            SET status = $1,
                progress_tracking = progress_tracking || $2::jsonb,
                updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(status.as_str())
        .bind(Json(vec![event.clone()]))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(INSERT_LOG_SQL)
            .bind(actor)
            .bind("status_change")
            .bind(record.id)
            .bind(&record.name)
            .bind(json!({
                "from": previous,
                "to": status.as_str(),
                "note": event.note,
            }))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Candidate {id} status {previous} → {}", status.as_str());
        Ok(Some(record))
    }

    async fn delete(&self, id: i32, actor: &str) -> Result<Option<CandidateRecord>, AppError> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, CandidateRecord>(
            "DELETE FROM candidates_pipeline WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(record) = record else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(INSERT_LOG_SQL)
            .bind(actor)
            .bind("delete")
            .bind(record.id)
            .bind(&record.name)
            .bind(json!({ "status": record.status, "consultant": record.consultant }))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Deleted candidate {id} ({})", record.name);
        Ok(Some(record))
    }

    async fn with_unparsed_scores(&self) -> Result<Vec<CandidateRecord>, AppError> {
        Ok(sqlx::query_as::<_, CandidateRecord>(
            r#"
            SELECT * FROM candidates_pipeline
            WHERE notes ~ '\d+/100' AND ai_match_result IS NULL
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn append_log(&self, entry: &NewLogEntry) -> Result<(), AppError> {
        sqlx::query(INSERT_LOG_SQL)
            .bind(&entry.actor)
            .bind(entry.action.as_str())
            .bind(entry.candidate_id)
            .bind(&entry.candidate_name)
            .bind(&entry.detail)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>, AppError> {
        Ok(sqlx::query_as::<_, SyncLogEntry>(
            "SELECT * FROM system_logs ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn record_sheet_sync(&self, outcome: &SheetSyncOutcome) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO google_sheets_sync_log
                (candidate_id, action, synced_to_sheets, sheets_row_number, attempts, error)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(outcome.candidate_id)
        .bind(&outcome.action)
        .bind(outcome.synced)
        .bind(outcome.row_number)
        .bind(outcome.attempts)
        .bind(&outcome.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
