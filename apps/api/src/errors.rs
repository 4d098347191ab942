use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::sheets::SheetsError;
use crate::sourcing::SourcingError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An external tool (spreadsheet CLI, CSV export, scraper, scorer) failed
    /// on a path where the caller asked for it directly.
    #[error("External dependency error: {0}")]
    External(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SheetsError> for AppError {
    fn from(e: SheetsError) -> Self {
        AppError::External(e.to_string())
    }
}

impl From<SourcingError> for AppError {
    fn from(e: SourcingError) -> Self {
        AppError::External(e.to_string())
    }
}

impl AppError {
    /// Short reason used in per-element batch breakdowns.
    pub fn reason(&self) -> String {
        match self {
            AppError::NotFound(_) => "not found".to_string(),
            AppError::Validation(msg) | AppError::External(msg) => msg.clone(),
            AppError::Database(e) => e.to_string(),
            AppError::Internal(e) => e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", self.to_string())
            }
            AppError::External(msg) => {
                tracing::error!("External dependency error: {msg}");
                (StatusCode::BAD_GATEWAY, "EXTERNAL_ERROR", msg.clone())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": code
        }));

        (status, body).into_response()
    }
}
