use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Append-only row in `system_logs`. Never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncLogEntry {
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub candidate_id: Option<i32>,
    pub candidate_name: Option<String>,
    pub detail: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Import,
    BulkImport,
    FieldUpdate,
    StatusChange,
    Delete,
    SheetsReconcile,
    AiMatch,
    TalentSourcing,
}

impl LogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LogAction::Import => "import",
            LogAction::BulkImport => "bulk_import",
            LogAction::FieldUpdate => "field_update",
            LogAction::StatusChange => "status_change",
            LogAction::Delete => "delete",
            LogAction::SheetsReconcile => "sheets_reconcile",
            LogAction::AiMatch => "ai_match",
            LogAction::TalentSourcing => "talent_sourcing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub actor: String,
    pub action: LogAction,
    pub candidate_id: Option<i32>,
    pub candidate_name: Option<String>,
    pub detail: Value,
}

impl NewLogEntry {
    pub fn new(actor: impl Into<String>, action: LogAction, detail: Value) -> Self {
        Self {
            actor: actor.into(),
            action,
            candidate_id: None,
            candidate_name: None,
            detail,
        }
    }

    pub fn for_candidate(mut self, id: i32, name: impl Into<String>) -> Self {
        self.candidate_id = Some(id);
        self.candidate_name = Some(name.into());
        self
    }
}

/// Outcome of one relational→mirror push, written to `google_sheets_sync_log`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetSyncOutcome {
    pub candidate_id: i32,
    pub action: String,
    pub synced: bool,
    pub row_number: Option<i32>,
    pub attempts: i32,
    pub error: Option<String>,
}
