use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::api::extract::{ApiJson, ApiPath};
use crate::app_state::AppState;
use crate::error::AppResult;
use crate::infrastructure::middleware::AuthUser;
use crate::models::{Comment, CommentRequest, GameId, UpdateCommentRequest};

pub async fn comments_for_game(
    State(state): State<AppState>,
    ApiPath(game_id): ApiPath<GameId>,
) -> AppResult<Json<Vec<Comment>>> {
    Ok(Json(state.comments.comments_for_game(game_id).await?))
}

pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiJson(request): ApiJson<CommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let comment = state.comments.create(identity.user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn update_comment(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(request): ApiJson<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    Ok(Json(
        state.comments.update(&id, identity.user_id, &request).await?,
    ))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    state.comments.delete(&id, identity.user_id).await?;
    Ok(Json(json!({ "message": "Comment deleted" })))
}
