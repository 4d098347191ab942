//! Per-operator scheduling config for the sourcing bot, stored in `bot_configs`
//! and always read back merged over [`BotConfig::default`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::warn;

use crate::errors::AppError;

pub mod handlers;

pub const DEFAULT_OPERATOR: &str = "default";
const MAX_SCHEDULE_HOURS: u32 = 168;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    Running,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub enabled: bool,
    pub schedule_hours: u32,
    pub target_job_ids: Vec<i64>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub last_run_summary: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule_hours: 12,
            target_job_ids: Vec::new(),
            last_run_at: None,
            last_run_status: None,
            last_run_summary: None,
        }
    }
}

/// Overlays the keys present in `overlay` onto `base`. Unknown keys are ignored;
/// a key present with a wrong type is a validation error.
pub fn merge_config(base: &BotConfig, overlay: &Value) -> Result<BotConfig, AppError> {
    let Some(overlay) = overlay.as_object() else {
        return Err(AppError::Validation("bot config must be a JSON object".to_string()));
    };
    let mut merged = serde_json::to_value(base).map_err(anyhow::Error::from)?;
    if let Some(target) = merged.as_object_mut() {
        for (key, value) in overlay {
            if target.contains_key(key) {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    let config: BotConfig = serde_json::from_value(merged)
        .map_err(|e| AppError::Validation(format!("invalid bot config: {e}")))?;
    if !(1..=MAX_SCHEDULE_HOURS).contains(&config.schedule_hours) {
        return Err(AppError::Validation(format!(
            "schedule_hours must be between 1 and {MAX_SCHEDULE_HOURS}"
        )));
    }
    Ok(config)
}

/// Stored config for `operator` merged over the defaults.
pub async fn load_config(pool: &PgPool, operator: &str) -> Result<BotConfig> {
    let stored: Option<Json<Value>> =
        sqlx::query_scalar("SELECT config FROM bot_configs WHERE operator = $1")
            .bind(operator)
            .fetch_optional(pool)
            .await?;
    Ok(stored_or_default(operator, stored.map(|Json(value)| value)))
}

/// A stored blob that no longer validates falls back to the defaults.
fn stored_or_default(operator: &str, stored: Option<Value>) -> BotConfig {
    let defaults = BotConfig::default();
    let Some(value) = stored else {
        return defaults;
    };
    match merge_config(&defaults, &value) {
        Ok(config) => config,
        Err(e) => {
            warn!("Stored bot config for {operator} is invalid ({e}); using defaults");
            defaults
        }
    }
}

pub async fn save_config(pool: &PgPool, operator: &str, config: &BotConfig) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO bot_configs (operator, config, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (operator) DO UPDATE
        SET config = EXCLUDED.config, updated_at = NOW()
        "#,
    )
    .bind(operator)
    .bind(Json(config))
    .execute(pool)
    .await?;
    Ok(())
}
