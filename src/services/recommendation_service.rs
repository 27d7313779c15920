use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::error::AppResult;
use crate::infrastructure::{CatalogStore, GraphStore};
use crate::models::{GameId, GameSummary};

pub const RECOMMENDATION_LIMIT: usize = 5;

/// "Related games" from co-rating edges, resolved to full catalogue records.
#[derive(Clone)]
pub struct RecommendationService {
    catalog: Arc<dyn CatalogStore>,
    graph: Arc<dyn GraphStore>,
}

impl RecommendationService {
    pub fn new(catalog: Arc<dyn CatalogStore>, graph: Arc<dyn GraphStore>) -> Self {
        Self { catalog, graph }
    }

    /// Ordered by edge weight. An unavailable graph yields an empty list.
    #[instrument(skip(self))]
    pub async fn recommendations(&self, game_id: GameId) -> AppResult<Vec<GameSummary>> {
        let related = match self.graph.related_games(game_id, RECOMMENDATION_LIMIT).await {
            Ok(related) => related,
            Err(e) => {
                warn!(game_id, error = %e, "Graph lookup failed, returning no recommendations");
                return Ok(Vec::new());
            }
        };
        if related.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<GameId> = related.iter().map(|r| r.game_id).collect();
        let mut by_id: HashMap<GameId, GameSummary> = self
            .catalog
            .games_by_ids(&ids)
            .await?
            .into_iter()
            .map(|summary| (summary.game.id, summary))
            .collect();

        // Edges can outlive their game node's relational row.
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::infrastructure::{MemoryGraphStore, SqliteCatalogStore};
    use crate::models::{
        GameNode, NewGame, NewUser, RelatedGame, Role, UserId,
    };
    use async_trait::async_trait;

    struct UnavailableGraph;

    #[async_trait]
    impl GraphStore for UnavailableGraph {
        async fn health_check(&self) -> AppResult<()> {
            Err(AppError::GraphError("down".into()))
        }
        async fn ensure_constraints(&self) -> AppResult<()> {
            Err(AppError::GraphError("down".into()))
        }
        async fn upsert_game(&self, _node: &GameNode) -> AppResult<()> {
            Err(AppError::GraphError("down".into()))
        }
        async fn delete_game(&self, _game_id: GameId) -> AppResult<()> {
            Err(AppError::GraphError("down".into()))
        }
        async fn record_rating(&self, _u: UserId, _g: GameId, _r: i32) -> AppResult<()> {
            Err(AppError::GraphError("down".into()))
        }
        async fn reinforce_related(&self, _u: UserId, _g: GameId) -> AppResult<u64> {
            Err(AppError::GraphError("down".into()))
        }
        async fn remove_rating(&self, _u: UserId, _g: GameId, _decay: bool) -> AppResult<()> {
            Err(AppError::GraphError("down".into()))
        }
        async fn related_games(&self, _g: GameId, _limit: usize) -> AppResult<Vec<RelatedGame>> {
            Err(AppError::GraphError("down".into()))
        }
    }

    async fn catalog_with_games(titles: &[&str]) -> (Arc<SqliteCatalogStore>, Vec<GameId>) {
        let catalog = Arc::new(SqliteCatalogStore::new_in_memory().await.unwrap());
        let admin = catalog
            .create_user(NewUser {
                email: "admin@example.com".into(),
                name: "Admin".into(),
                role: Role::Admin,
                password_hash: "x".into(),
            })
            .await
            .unwrap();
        let mut ids = Vec::new();
        for title in titles {
            let game = catalog
                .create_game(NewGame {
                    title: title.to_string(),
                    description: None,
                    genre: None,
                    platform: None,
                    release_date: None,
                    image_url: None,
                    trailer_url: None,
                    game_mode: Default::default(),
                    created_by: admin.id,
                })
                .await
                .unwrap();
            ids.push(game.id);
        }
        (catalog, ids)
    }

    #[tokio::test]
    async fn keeps_weight_order() {
        let (catalog, ids) = catalog_with_games(&["Doom", "Quake", "Heretic"]).await;
        let graph = Arc::new(MemoryGraphStore::new());
        let (doom, quake, heretic) = (ids[0], ids[1], ids[2]);

        // Heretic is co-rated with Doom by two users, Quake by one.
        for user in [1, 2] {
            graph.record_rating(user, doom, 5).await.unwrap();
            graph.record_rating(user, heretic, 4).await.unwrap();
            graph.reinforce_related(user, heretic).await.unwrap();
        }
        graph.record_rating(3, doom, 3).await.unwrap();
        graph.record_rating(3, quake, 3).await.unwrap();
        graph.reinforce_related(3, quake).await.unwrap();

        let service = RecommendationService::new(catalog, graph);
        let titles: Vec<String> = service
            .recommendations(doom)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.game.title)
            .collect();
        assert_eq!(titles, vec!["Heretic", "Quake"]);
    }

    #[tokio::test]
    async fn graph_failure_is_an_empty_result() {
        let (catalog, ids) = catalog_with_games(&["Doom"]).await;
        let service = RecommendationService::new(catalog, Arc::new(UnavailableGraph));
        assert!(service.recommendations(ids[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_edges_is_an_empty_result() {
        let (catalog, ids) = catalog_with_games(&["Doom"]).await;
        let service = RecommendationService::new(catalog, Arc::new(MemoryGraphStore::new()));
        assert!(service.recommendations(ids[0]).await.unwrap().is_empty());
    }
}
