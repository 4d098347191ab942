mod bot_config;
mod candidates;
mod config;
mod db;
mod errors;
mod models;
mod routes;
mod sheets;
mod sourcing;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::candidates::store::{CandidateStore, PgCandidateStore};
use crate::config::Config;
use crate::db::create_pool;
use crate::routes::build_router;
use crate::sheets::client::{GogSheetsClient, MirrorStore};
use crate::sheets::queue::{SyncQueue, SyncSettings, SyncWorker};
use crate::sourcing::TalentSourcingClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing DATABASE_URL)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Headhunter API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;
    let store: Arc<dyn CandidateStore> = Arc::new(PgCandidateStore::new(db.clone()));

    // Initialize spreadsheet mirror
    let mirror: Arc<dyn MirrorStore> = Arc::new(GogSheetsClient::new(config.sheets.clone())?);
    if config.sheets.sheet_id.is_empty() {
        warn!("SHEET_ID is not set; spreadsheet mirror disabled");
    } else {
        info!(
            "Spreadsheet mirror: sheet {} tab '{}'",
            config.sheets.sheet_id, config.sheets.sheet_name
        );
    }

    // Relational→mirror sync worker
    let (sync_queue, sync_rx) = SyncQueue::new();
    let worker = SyncWorker::new(
        store.clone(),
        mirror.clone(),
        SyncSettings::from(&config.sheets),
    );
    tokio::spawn(worker.run(sync_rx));

    let sourcing = TalentSourcingClient::new(config.sourcing.clone());
    info!("Talent sourcing tools at {}", config.sourcing.dir.display());

    // Build app state
    let state = AppState {
        db,
        store,
        mirror,
        sync_queue,
        sourcing,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
