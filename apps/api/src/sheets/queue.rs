//! Relational→mirror sync queue.
//!
//! Request handlers enqueue a task after every write and return immediately.
//! A single worker drains the queue in order, pushes each record into the
//! mirror with retry and backoff, pauses between records, and records every
//! outcome in `google_sheets_sync_log`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::candidates::store::CandidateStore;
use crate::config::SheetsConfig;
use crate::models::audit::SheetSyncOutcome;
use crate::sheets::client::MirrorStore;
use crate::sheets::reconcile::{push_record, PushAction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub candidate_id: i32,
    pub reason: &'static str,
}

#[derive(Clone)]
pub struct SyncQueue {
    tx: UnboundedSender<SyncTask>,
}

impl SyncQueue {
    pub fn new() -> (Self, UnboundedReceiver<SyncTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Never blocks and never fails the caller.
    pub fn enqueue(&self, candidate_id: i32, reason: &'static str) {
        if self.tx.send(SyncTask { candidate_id, reason }).is_err() {
            warn!("Sync worker is gone; dropping sync of candidate {candidate_id}");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub throttle: Duration,
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_backoff: Duration,
}

impl From<&SheetsConfig> for SyncSettings {
    fn from(config: &SheetsConfig) -> Self {
        Self {
            throttle: config.throttle,
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_secs(1),
        }
    }
}

pub struct SyncWorker {
    store: Arc<dyn CandidateStore>,
    mirror: Arc<dyn MirrorStore>,
    settings: SyncSettings,
}

impl SyncWorker {
    pub fn new(
        store: Arc<dyn CandidateStore>,
        mirror: Arc<dyn MirrorStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            mirror,
            settings,
        }
    }

    /// Drains the queue until every sender is dropped.
    pub async fn run(self, mut rx: UnboundedReceiver<SyncTask>) {
        info!("Sheets sync worker started");
        while let Some(task) = rx.recv().await {
            self.process(&task).await;
            tokio::time::sleep(self.settings.throttle).await;
        }
        info!("Sheets sync worker stopped");
    }

    /// Pushes one record. Returns the recorded outcome, or `None` when the
    /// task was skipped (mirror unavailable, record gone, store error).
    pub async fn process(&self, task: &SyncTask) -> Option<SheetSyncOutcome> {
        if !self.mirror.is_available().await {
            warn!(
                "Sheets mirror unavailable; skipping sync of candidate {} ({})",
                task.candidate_id, task.reason
            );
            return None;
        }

        let record = match self.store.get(task.candidate_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("Candidate {} no longer exists; nothing to sync", task.candidate_id);
                return None;
            }
            Err(e) => {
                error!("Failed to load candidate {} for sync: {e}", task.candidate_id);
                return None;
            }
        };

        let mut attempts = 0;
        let mut last_error = None;
        let mut result = None;
        while attempts < self.settings.max_attempts {
            if attempts > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = self.settings.base_backoff * (1 << (attempts - 1));
                warn!(
                    "Sheets push of candidate {} failed, retrying after {}ms...",
                    record.id,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            attempts += 1;
            match push_record(self.mirror.as_ref(), &record).await {
                Ok(action) => {
                    result = Some(action);
                    break;
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        let outcome = match result {
            Some(PushAction::Updated { row_number }) => SheetSyncOutcome {
                candidate_id: record.id,
                action: "update".to_string(),
                synced: true,
                row_number: i32::try_from(row_number).ok(),
                attempts: attempts as i32,
                error: None,
            },
            Some(PushAction::Appended) => SheetSyncOutcome {
                candidate_id: record.id,
                action: "append".to_string(),
                synced: true,
                row_number: None,
                attempts: attempts as i32,
                error: None,
            },
            None => {
                error!(
                    "Giving up on sheets push of candidate {} after {attempts} attempts",
                    record.id
                );
                SheetSyncOutcome {
                    candidate_id: record.id,
                    action: "failed".to_string(),
                    synced: false,
                    row_number: None,
                    attempts: attempts as i32,
                    error: last_error,
                }
            }
        };

        if let Err(e) = self.store.record_sheet_sync(&outcome).await {
            error!("Failed to record sheets sync outcome: {e}");
        }
        Some(outcome)
    }
}
