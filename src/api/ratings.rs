use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::extract::{ApiJson, ApiPath};
use crate::app_state::AppState;
use crate::error::AppResult;
use crate::infrastructure::middleware::AuthUser;
use crate::models::{GameId, Rating, RatingId, RatingRequest, RatingWithUser};

pub async fn ratings_for_game(
    State(state): State<AppState>,
    ApiPath(game_id): ApiPath<GameId>,
) -> AppResult<Json<Vec<RatingWithUser>>> {
    Ok(Json(state.ratings.ratings_for_game(game_id).await?))
}

/// `{"rating": null}` when the caller has not rated the game.
pub async fn my_rating(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiPath(game_id): ApiPath<GameId>,
) -> AppResult<Json<Value>> {
    let rating = state.ratings.user_rating(game_id, identity.user_id).await?;
    Ok(Json(json!({ "rating": rating })))
}

pub async fn rate_game(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiJson(request): ApiJson<RatingRequest>,
) -> AppResult<Json<Rating>> {
    Ok(Json(state.ratings.rate(identity.user_id, &request).await?))
}

pub async fn delete_rating(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<RatingId>,
) -> AppResult<Json<Value>> {
    state.ratings.delete_rating(id, identity.user_id).await?;
    Ok(Json(json!({ "message": "Rating deleted" })))
}
