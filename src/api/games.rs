// Public catalogue reads

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::api::extract::{ApiPath, ApiQuery, JsonText};
use crate::app_state::AppState;
use crate::error::AppResult;
use crate::models::{GameId, GameSummary};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGamesQuery {
    pub skip_cache: Option<String>,
}

pub async fn list_games(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListGamesQuery>,
) -> AppResult<JsonText> {
    let skip_cache = query.skip_cache.as_deref() == Some("true");
    Ok(JsonText(state.catalog.list_games(skip_cache).await?))
}

pub async fn get_game(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<GameId>,
) -> AppResult<JsonText> {
    Ok(JsonText(state.catalog.get_game(id).await?))
}

pub async fn search_games(
    State(state): State<AppState>,
    ApiPath(query): ApiPath<String>,
) -> AppResult<Json<Vec<GameSummary>>> {
    Ok(Json(state.catalog.search_games(&query).await?))
}

pub async fn recommendations(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<GameId>,
) -> AppResult<Json<Vec<GameSummary>>> {
    Ok(Json(state.recommendations.recommendations(id).await?))
}
