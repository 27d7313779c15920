// Catalogue writes, admin role only

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::api::extract::{ApiJson, ApiPath};
use crate::app_state::AppState;
use crate::error::AppResult;
use crate::infrastructure::middleware::AdminUser;
use crate::models::{Game, GameId, UpsertGameRequest};

pub async fn create_game(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<UpsertGameRequest>,
) -> AppResult<(StatusCode, Json<Game>)> {
    let game = state.catalog.create_game(&request, admin.user_id).await?;
    Ok((StatusCode::CREATED, Json(game)))
}

pub async fn update_game(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiPath(id): ApiPath<GameId>,
    ApiJson(request): ApiJson<UpsertGameRequest>,
) -> AppResult<Json<Game>> {
    Ok(Json(state.catalog.update_game(id, &request).await?))
}

pub async fn delete_game(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiPath(id): ApiPath<GameId>,
) -> AppResult<Json<Value>> {
    state.catalog.delete_game(id).await?;
    Ok(Json(json!({ "message": "Game deleted" })))
}
