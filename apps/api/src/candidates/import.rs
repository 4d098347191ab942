//! Import / Dedup Gateway.
//!
//! Every path that brings candidates in (manual entry, bulk upload, the
//! scraper) lands here. A payload whose normalized name matches a stored
//! record is merged into it; otherwise a new record is created.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::candidates::merge::merge;
use crate::candidates::store::{record_log, CandidateStore};
use crate::errors::AppError;
use crate::models::audit::{LogAction, NewLogEntry};
use crate::models::candidate::{normalize_name, CandidatePatch, CandidateRecord, CandidateStatus};

pub const MAX_BULK_IMPORT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
    Created,
    Updated,
    Skipped,
}

/// Values stamped on newly created records that do not carry their own.
#[derive(Debug, Clone)]
pub struct ImportDefaults {
    pub actor: String,
    pub source: String,
    pub consultant: String,
}

impl ImportDefaults {
    pub fn manual(actor: &str, consultant: &str) -> Self {
        Self {
            actor: actor.to_string(),
            source: "manual".to_string(),
            consultant: consultant.to_string(),
        }
    }

    fn apply(&self, patch: &mut CandidatePatch) {
        patch
            .status
            .get_or_insert_with(|| CandidateStatus::NotStarted.as_str().to_string());
        patch.source.get_or_insert_with(|| self.source.clone());
        patch.consultant.get_or_insert_with(|| self.consultant.clone());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub action: ImportAction,
    pub candidate: CandidateRecord,
}

fn prepare(patch: CandidatePatch) -> Result<CandidatePatch, AppError> {
    let patch = patch.canonicalize().fit_to_schema();
    if !patch.has_name() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    Ok(patch)
}

/// Smart import of one payload.
///
/// A match is always reported as `updated`, even when the merge was a no-op.
pub async fn import_candidate(
    store: &dyn CandidateStore,
    patch: CandidatePatch,
    defaults: &ImportDefaults,
) -> Result<ImportOutcome, AppError> {
    let mut patch = prepare(patch)?;
    let normalized = normalize_name(patch.name.as_deref().unwrap_or_default());

    let outcome = match store.find_by_name(&normalized).await? {
        Some(existing) => {
            let update = merge(&existing, &patch);
            let candidate = if update.is_empty() {
                existing
            } else {
                store
                    .apply_update(existing.id, &update)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Candidate {} not found", existing.id)))?
            };
            record_log(
                store,
                NewLogEntry::new(
                    &defaults.actor,
                    LogAction::Import,
                    json!({ "action": "updated", "fields": update.changed_fields() }),
                )
                .for_candidate(candidate.id, candidate.name.clone()),
            )
            .await;
            ImportOutcome {
                action: ImportAction::Updated,
                candidate,
            }
        }
        None => {
            defaults.apply(&mut patch);
            let candidate = store.insert(&patch).await?;
            record_log(
                store,
                NewLogEntry::new(
                    &defaults.actor,
                    LogAction::Import,
                    json!({ "action": "created", "source": candidate.source }),
                )
                .for_candidate(candidate.id, candidate.name.clone()),
            )
            .await;
            ImportOutcome {
                action: ImportAction::Created,
                candidate,
            }
        }
    };

    info!(
        "Imported candidate {} ({}): {:?}",
        outcome.candidate.id, outcome.candidate.name, outcome.action
    );
    Ok(outcome)
}

// ────────────────────────────────────────────────────────────────────────────
// Bulk
// ────────────────────────────────────────────────────────────────────────────

/// One element of a bulk payload. Elements that do not decode as a candidate
/// are kept so they can be reported against their index.
#[derive(Debug, Clone)]
pub enum BulkEntry {
    Patch(CandidatePatch),
    Malformed { name: Option<String>, reason: String },
}

impl From<CandidatePatch> for BulkEntry {
    fn from(patch: CandidatePatch) -> Self {
        BulkEntry::Patch(patch)
    }
}

impl From<Value> for BulkEntry {
    fn from(value: Value) -> Self {
        let name = value.get("name").and_then(Value::as_str).map(str::to_string);
        match serde_json::from_value::<CandidatePatch>(value) {
            Ok(patch) => BulkEntry::Patch(patch),
            Err(e) => BulkEntry::Malformed {
                name,
                reason: format!("invalid candidate: {e}"),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    pub index: usize,
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub index: usize,
    pub name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkImportReport {
    pub total: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub created: Vec<BulkItem>,
    pub updated: Vec<BulkItem>,
    pub skipped: Vec<BulkItem>,
    pub failed: Vec<BulkFailure>,
}

impl BulkImportReport {
    /// Ids of records that were created or changed, in input order.
    pub fn touched_ids(&self) -> Vec<i32> {
        let mut items: Vec<&BulkItem> = self.created.iter().chain(&self.updated).collect();
        items.sort_by_key(|item| item.index);
        items.into_iter().map(|item| item.id).collect()
    }

    /// Folds the report of a later chunk into this one. `offset` is the input
    /// index of the chunk's first entry.
    pub fn absorb(&mut self, other: BulkImportReport, offset: usize) {
        let shift = |mut item: BulkItem| {
            item.index += offset;
            item
        };
        self.total += other.total;
        self.created_count += other.created_count;
        self.updated_count += other.updated_count;
        self.skipped_count += other.skipped_count;
        self.failed_count += other.failed_count;
        self.created.extend(other.created.into_iter().map(shift));
        self.updated.extend(other.updated.into_iter().map(shift));
        self.skipped.extend(other.skipped.into_iter().map(shift));
        self.failed.extend(other.failed.into_iter().map(|mut f| {
            f.index += offset;
            f
        }));
    }

    fn push(&mut self, action: ImportAction, item: BulkItem) {
        match action {
            ImportAction::Created => {
                self.created_count += 1;
                self.created.push(item);
            }
            ImportAction::Updated => {
                self.updated_count += 1;
                self.updated.push(item);
            }
            ImportAction::Skipped => {
                self.skipped_count += 1;
                self.skipped.push(item);
            }
        }
    }
}

/// `POST /api/candidates/bulk` entry point: enforces the per-call cap.
pub async fn import_bulk(
    store: &dyn CandidateStore,
    entries: Vec<BulkEntry>,
    defaults: &ImportDefaults,
) -> Result<BulkImportReport, AppError> {
    if entries.is_empty() {
        return Err(AppError::Validation("candidates must not be empty".to_string()));
    }
    if entries.len() > MAX_BULK_IMPORT {
        return Err(AppError::Validation(format!(
            "at most {MAX_BULK_IMPORT} candidates per call, got {}",
            entries.len()
        )));
    }
    import_many(store, entries, defaults).await
}

/// Imports entries one by one in input order with per-entry isolation.
///
/// The name index is loaded once and updated as rows are created, so a name
/// that appears twice in the same call is created then updated.
pub async fn import_many(
    store: &dyn CandidateStore,
    entries: Vec<BulkEntry>,
    defaults: &ImportDefaults,
) -> Result<BulkImportReport, AppError> {
    let mut index = store.name_index().await?;
    let mut report = BulkImportReport {
        total: entries.len(),
        ..Default::default()
    };

    for (i, entry) in entries.into_iter().enumerate() {
        let (raw_name, result) = match entry {
            BulkEntry::Patch(patch) => {
                let raw_name = patch.name.clone();
                (raw_name, import_one(store, patch, defaults, &mut index).await)
            }
            BulkEntry::Malformed { name, reason } => (name, Err(AppError::Validation(reason))),
        };
        match result {
            Ok((action, record)) => report.push(
                action,
                BulkItem {
                    index: i,
                    id: record.id,
                    name: record.name,
                },
            ),
            Err(e) => {
                warn!("Bulk import entry {i} failed: {e}");
                report.failed_count += 1;
                report.failed.push(BulkFailure {
                    index: i,
                    name: raw_name,
                    reason: e.reason(),
                });
            }
        }
    }

    record_log(
        store,
        NewLogEntry::new(
            &defaults.actor,
            LogAction::BulkImport,
            json!({
                "total": report.total,
                "created": report.created_count,
                "updated": report.updated_count,
                "skipped": report.skipped_count,
                "failed": report.failed_count,
                "source": defaults.source,
            }),
        ),
    )
    .await;

    info!(
        "Bulk import: {} total, {} created, {} updated, {} skipped, {} failed",
        report.total,
        report.created_count,
        report.updated_count,
        report.skipped_count,
        report.failed_count
    );
    Ok(report)
}

async fn import_one(
    store: &dyn CandidateStore,
    patch: CandidatePatch,
    defaults: &ImportDefaults,
    index: &mut HashMap<String, i32>,
) -> Result<(ImportAction, CandidateRecord), AppError> {
    let mut patch = prepare(patch)?;
    let normalized = normalize_name(patch.name.as_deref().unwrap_or_default());

    let existing = match index.get(&normalized) {
        Some(id) => store.get(*id).await?,
        None => None,
    };

    if let Some(existing) = existing {
        let update = merge(&existing, &patch);
        if update.is_empty() {
            return Ok((ImportAction::Skipped, existing));
        }
        let record = store
            .apply_update(existing.id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Candidate {} not found", existing.id)))?;
        return Ok((ImportAction::Updated, record));
    }

    defaults.apply(&mut patch);
    let record = store.insert(&patch).await?;
    index.insert(normalized, record.id);
    Ok((ImportAction::Created, record))
}
