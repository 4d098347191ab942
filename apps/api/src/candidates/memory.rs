//! In-memory [`CandidateStore`] for handler and gateway tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::json;
use sqlx::types::Json;

use crate::candidates::merge::CandidateUpdate;
use crate::candidates::store::{CandidateFilter, CandidateStore};
use crate::errors::AppError;
use crate::models::audit::{NewLogEntry, SheetSyncOutcome, SyncLogEntry};
use crate::models::candidate::{
    normalize_name, CandidatePatch, CandidateRecord, CandidateStatus, ProgressEvent, TextField,
};

#[derive(Default)]
struct Inner {
    records: Vec<CandidateRecord>,
    next_id: i32,
    logs: Vec<SyncLogEntry>,
    sheet_syncs: Vec<SheetSyncOutcome>,
    log_writes_fail: bool,
}

#[derive(Default)]
pub struct MemoryCandidateStore {
    inner: Mutex<Inner>,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every standalone `append_log` call fail.
    pub fn with_failing_logs(self) -> Self {
        self.inner.lock().unwrap().log_writes_fail = true;
        self
    }

    pub fn records(&self) -> Vec<CandidateRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn logs(&self) -> Vec<SyncLogEntry> {
        self.inner.lock().unwrap().logs.clone()
    }

    pub fn sheet_syncs(&self) -> Vec<SheetSyncOutcome> {
        self.inner.lock().unwrap().sheet_syncs.clone()
    }

    /// Inserts a record directly, bypassing the import gateway.
    pub fn seed(&self, patch: CandidatePatch) -> CandidateRecord {
        let mut inner = self.inner.lock().unwrap();
        insert_locked(&mut inner, &patch)
    }
}

fn insert_locked(inner: &mut Inner, patch: &CandidatePatch) -> CandidateRecord {
    inner.next_id += 1;
    let now = Utc::now();
    let mut record = CandidateRecord {
        id: inner.next_id,
        name: String::new(),
        email: None,
        phone: None,
        location: None,
        current_position: None,
        years_experience: None,
        job_changes: None,
        avg_tenure_months: None,
        recent_gap_months: None,
        skills: None,
        education: None,
        source: None,
        work_history: patch.work_history.clone(),
        leaving_reason: None,
        stability_score: None,
        education_details: patch.education_details.clone(),
        personality: None,
        status: CandidateStatus::NotStarted.as_str().to_string(),
        consultant: None,
        notes: patch.notes.clone(),
        resume_link: None,
        linkedin_url: None,
        github_url: None,
        progress_tracking: Json(vec![]),
        ai_match_result: None,
        created_at: now,
        updated_at: now,
    };
    for field in TextField::ALL {
        if let Some(value) = patch.text(field) {
            record.set_text(field, value.to_string());
        }
    }
    inner.records.push(record.clone());
    record
}

fn push_log(inner: &mut Inner, entry: &NewLogEntry) {
    let id = inner.logs.len() as i64 + 1;
    inner.logs.push(SyncLogEntry {
        id,
        actor: entry.actor.clone(),
        action: entry.action.as_str().to_string(),
        candidate_id: entry.candidate_id,
        candidate_name: entry.candidate_name.clone(),
        detail: entry.detail.clone(),
        created_at: Utc::now(),
    });
}

#[async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn list(&self, filter: &CandidateFilter) -> Result<Vec<CandidateRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        let status = filter
            .status
            .as_deref()
            .map(|s| CandidateStatus::from_cell(s).as_str());
        let mut records: Vec<CandidateRecord> = inner
            .records
            .iter()
            .filter(|r| filter.consultant.is_none() || r.consultant == filter.consultant)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        records.truncate(filter.effective_limit() as usize);
        Ok(records)
    }

    async fn get(&self, id: i32) -> Result<Option<CandidateRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_name(&self, normalized: &str) -> Result<Option<CandidateRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .find(|r| r.normalized_name() == normalized)
            .cloned())
    }

    async fn name_index(&self) -> Result<HashMap<String, i32>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut index = HashMap::new();
        for record in &inner.records {
            index.entry(normalize_name(&record.name)).or_insert(record.id);
        }
        Ok(index)
    }

    async fn insert(&self, patch: &CandidatePatch) -> Result<CandidateRecord, AppError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(insert_locked(&mut inner, patch))
    }

    async fn apply_update(
        &self,
        id: i32,
        update: &CandidateUpdate,
    ) -> Result<Option<CandidateRecord>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.records.iter_mut().find(|r| r.id == id).map(|record| {
            update.apply_to(record);
            record.updated_at = Utc::now();
            record.clone()
        }))
    }

    async fn append_progress(
        &self,
        id: i32,
        event: &ProgressEvent,
    ) -> Result<Option<CandidateRecord>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.records.iter_mut().find(|r| r.id == id).map(|record| {
            record.progress_tracking.0.push(event.clone());
            record.clone()
        }))
    }

    async fn update_status(
        &self,
        id: i32,
        status: CandidateStatus,
        event: &ProgressEvent,
        actor: &str,
    ) -> Result<Option<CandidateRecord>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(record) = inner.records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        let previous = std::mem::replace(&mut record.status, status.as_str().to_string());
        record.progress_tracking.0.push(event.clone());
        let record = record.clone();
        let entry = NewLogEntry::new(
            actor,
            crate::models::audit::LogAction::StatusChange,
            json!({ "from": previous, "to": status.as_str(), "note": event.note }),
        )
        .for_candidate(record.id, record.name.clone());
        push_log(&mut inner, &entry);
        Ok(Some(record))
    }

    async fn delete(&self, id: i32, actor: &str) -> Result<Option<CandidateRecord>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(pos) = inner.records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let record = inner.records.remove(pos);
        let entry = NewLogEntry::new(
            actor,
            crate::models::audit::LogAction::Delete,
            json!({ "status": record.status, "consultant": record.consultant }),
        )
        .for_candidate(record.id, record.name.clone());
        push_log(&mut inner, &entry);
        Ok(Some(record))
    }

    async fn with_unparsed_scores(&self) -> Result<Vec<CandidateRecord>, AppError> {
        let score = Regex::new(r"\d+/100").unwrap();
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.ai_match_result.is_none())
            .filter(|r| r.notes.as_deref().is_some_and(|n| score.is_match(n)))
            .cloned()
            .collect())
    }

    async fn append_log(&self, entry: &NewLogEntry) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.log_writes_fail {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        push_log(&mut inner, entry);
        Ok(())
    }

    async fn recent_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .logs
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn record_sheet_sync(&self, outcome: &SheetSyncOutcome) -> Result<(), AppError> {
        self.inner.lock().unwrap().sheet_syncs.push(outcome.clone());
        Ok(())
    }
}
