//! Spreadsheet mirror: CSV/CLI access, row layout, bidirectional reconciliation,
//! and the relational→mirror sync queue.

use std::time::Duration;

use thiserror::Error;

pub mod client;
pub mod csv;
pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod queue;
pub mod reconcile;
pub mod row;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("gog sheets exited with status {status:?}: {stderr}")]
    Command { status: Option<i32>, stderr: String },

    #[error("spreadsheet operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to run gog: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV export request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV export returned HTTP {status}")]
    Export { status: u16 },

    #[error("unexpected gog output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("spreadsheet mirror is not available")]
    Unavailable,
}
