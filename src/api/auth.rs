use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::api::extract::ApiJson;
use crate::app_state::AppState;
use crate::error::AppResult;
use crate::infrastructure::middleware::AuthUser;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest};

pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(state.auth.login(request).await?))
}

pub async fn me(State(state): State<AppState>, AuthUser(identity): AuthUser) -> AppResult<Json<Value>> {
    let user = state.auth.me(identity.user_id).await?;
    Ok(Json(json!({ "user": user })))
}
