use axum::{extract::State, Json};

use crate::api::extract::ApiJson;
use crate::app_state::AppState;
use crate::error::AppResult;
use crate::infrastructure::middleware::AuthUser;
use crate::models::{UserGameList, UserGameRequest};

pub async fn my_list(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> AppResult<Json<UserGameList>> {
    Ok(Json(state.user_lists.list(identity.user_id).await?))
}

pub async fn add_game(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiJson(request): ApiJson<UserGameRequest>,
) -> AppResult<Json<UserGameList>> {
    Ok(Json(
        state
            .user_lists
            .add(identity.user_id, request.game_id)
            .await?,
    ))
}

pub async fn remove_game(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiJson(request): ApiJson<UserGameRequest>,
) -> AppResult<Json<UserGameList>> {
    Ok(Json(
        state
            .user_lists
            .remove(identity.user_id, request.game_id)
            .await?,
    ))
}
