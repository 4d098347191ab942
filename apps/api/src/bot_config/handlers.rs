use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::bot_config::{load_config, merge_config, save_config, BotConfig, DEFAULT_OPERATOR};
use crate::errors::AppError;
use crate::routes::extract::{ApiJson, ApiQuery};
use crate::routes::{ok, Envelope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OperatorQuery {
    pub operator: Option<String>,
}

impl OperatorQuery {
    fn operator(&self) -> &str {
        self.operator
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(DEFAULT_OPERATOR)
    }
}

#[derive(Debug, Serialize)]
pub struct BotConfigResponse {
    pub operator: String,
    pub data: BotConfig,
}

/// GET /api/bot-config?operator=
pub async fn handle_get_config(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<OperatorQuery>,
) -> Result<Json<Envelope<BotConfigResponse>>, AppError> {
    let operator = query.operator();
    let data = load_config(&state.db, operator).await?;
    Ok(ok(BotConfigResponse {
        operator: operator.to_string(),
        data,
    }))
}

/// PUT /api/bot-config?operator=
pub async fn handle_put_config(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<OperatorQuery>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Envelope<BotConfigResponse>>, AppError> {
    let operator = query.operator();
    let current = load_config(&state.db, operator).await?;
    let data = merge_config(&current, &body)?;
    save_config(&state.db, operator, &data).await?;
    info!("Bot config for {operator} updated (enabled: {})", data.enabled);
    Ok(ok(BotConfigResponse {
        operator: operator.to_string(),
        data,
    }))
}
