use std::sync::Arc;

use sqlx::PgPool;

use crate::candidates::store::CandidateStore;
use crate::config::Config;
use crate::sheets::client::MirrorStore;
use crate::sheets::queue::SyncQueue;
use crate::sourcing::TalentSourcingClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Used directly by the bot config repository and the health check.
    pub db: PgPool,
    /// Candidate persistence. Production: `PgCandidateStore`.
    pub store: Arc<dyn CandidateStore>,
    /// Spreadsheet mirror. Production: `GogSheetsClient`.
    pub mirror: Arc<dyn MirrorStore>,
    /// Relational→mirror push requests; drained by the `SyncWorker` task.
    pub sync_queue: SyncQueue,
    pub sourcing: TalentSourcingClient,
    pub config: Config,
}
