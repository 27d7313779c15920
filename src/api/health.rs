use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::extract::ApiQuery;
use crate::app_state::AppState;
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    #[serde(default)]
    pub components: bool,
}

/// Liveness, with per-store probes when `?components=true`.
pub async fn health(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HealthQuery>,
) -> AppResult<Json<Value>> {
    let mut body = json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });

    if query.components {
        body["components"] = serde_json::to_value(state.component_health().await)
            .map_err(|e| AppError::Internal(format!("Failed to encode health: {}", e)))?;
    }
    Ok(Json(body))
}
