use std::sync::Arc;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::infrastructure::{CatalogEvent, CatalogStore, ProjectionRegistry};
use crate::models::{GameId, Rating, RatingId, RatingRequest, RatingWithUser, UserId};
use crate::services::validation;

#[derive(Clone)]
pub struct RatingService {
    catalog: Arc<dyn CatalogStore>,
    projections: Arc<ProjectionRegistry>,
}

impl RatingService {
    pub fn new(catalog: Arc<dyn CatalogStore>, projections: Arc<ProjectionRegistry>) -> Self {
        Self {
            catalog,
            projections,
        }
    }

    /// One rating per (game, user); a second submission overwrites the first.
    #[instrument(skip(self, request), fields(game_id = request.game_id))]
    pub async fn rate(&self, user_id: UserId, request: &RatingRequest) -> AppResult<Rating> {
        let value = validation::rating_value(request.rating)?;
        if !self.catalog.game_exists(request.game_id).await? {
            return Err(AppError::NotFound("Game not found".to_string()));
        }

        let rating = self
            .catalog
            .upsert_rating(request.game_id, user_id, value)
            .await?;
        self.projections
            .publish(&CatalogEvent::RatingUpserted(rating.clone()))
            .await;
        Ok(rating)
    }

    pub async fn ratings_for_game(&self, game_id: GameId) -> AppResult<Vec<RatingWithUser>> {
        self.catalog.ratings_for_game(game_id).await
    }

    pub async fn user_rating(&self, game_id: GameId, user_id: UserId) -> AppResult<Option<Rating>> {
        self.catalog.user_rating(game_id, user_id).await
    }

    /// Someone else's rating is reported as missing.
    #[instrument(skip(self))]
    pub async fn delete_rating(&self, id: RatingId, user_id: UserId) -> AppResult<()> {
        let rating = self
            .catalog
            .delete_rating(id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Rating not found".to_string()))?;
        self.projections
            .publish(&CatalogEvent::RatingDeleted(rating))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{
        game_key, CacheInvalidator, CacheStore, GraphProjector, GraphStore, MemoryCache,
        MemoryGraphStore, SqliteCatalogStore,
    };
    use crate::models::{GameNode, NewGame, NewUser, RelatedGame, Role};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixture {
        service: RatingService,
        cache: Arc<MemoryCache>,
        graph: Arc<MemoryGraphStore>,
        users: Vec<UserId>,
        games: Vec<GameId>,
    }

    /// Every graph write fails, as when the graph database is down.
    struct UnreachableGraph;

    #[async_trait]
    impl GraphStore for UnreachableGraph {
        async fn health_check(&self) -> AppResult<()> {
            Err(AppError::GraphError("unreachable".into()))
        }
        async fn ensure_constraints(&self) -> AppResult<()> {
            Err(AppError::GraphError("unreachable".into()))
        }
        async fn upsert_game(&self, _node: &GameNode) -> AppResult<()> {
            Err(AppError::GraphError("unreachable".into()))
        }
        async fn delete_game(&self, _game_id: GameId) -> AppResult<()> {
            Err(AppError::GraphError("unreachable".into()))
        }
        async fn record_rating(&self, _u: UserId, _g: GameId, _r: i32) -> AppResult<()> {
            Err(AppError::GraphError("unreachable".into()))
        }
        async fn reinforce_related(&self, _u: UserId, _g: GameId) -> AppResult<u64> {
            Err(AppError::GraphError("unreachable".into()))
        }
        async fn remove_rating(&self, _u: UserId, _g: GameId, _decay: bool) -> AppResult<()> {
            Err(AppError::GraphError("unreachable".into()))
        }
        async fn related_games(&self, _g: GameId, _limit: usize) -> AppResult<Vec<RelatedGame>> {
            Err(AppError::GraphError("unreachable".into()))
        }
    }

    async fn fixture() -> Fixture {
        let catalog = Arc::new(SqliteCatalogStore::new_in_memory().await.unwrap());
        fixture_with(catalog, None).await
    }

    async fn fixture_with(
        catalog: Arc<SqliteCatalogStore>,
        graph_override: Option<Arc<dyn GraphStore>>,
    ) -> Fixture {
        let cache = Arc::new(MemoryCache::new(16));
        let graph = Arc::new(MemoryGraphStore::new());
        let mut projections = ProjectionRegistry::new();
        projections.register(Box::new(CacheInvalidator::new(cache.clone())));
        let projected = graph_override.unwrap_or_else(|| graph.clone() as Arc<dyn GraphStore>);
        projections.register(Box::new(GraphProjector::new(projected, false)));

        let mut users = Vec::new();
        for (email, role) in [("a@example.com", Role::Admin), ("b@example.com", Role::User)] {
            let user = catalog
                .create_user(NewUser {
                    email: email.to_string(),
                    name: "Rater".to_string(),
                    role,
                    password_hash: "x".to_string(),
                })
                .await
                .unwrap();
            users.push(user.id);
        }

        let mut games = Vec::new();
        for title in ["Outer Wilds", "Subnautica"] {
            let game = catalog
                .create_game(NewGame {
                    title: title.to_string(),
                    description: None,
                    genre: Some("Exploration".to_string()),
                    platform: None,
                    release_date: None,
                    image_url: None,
                    trailer_url: None,
                    game_mode: Default::default(),
                    created_by: users[0],
                })
                .await
                .unwrap();
            games.push(game.id);
        }

        Fixture {
            service: RatingService::new(catalog, Arc::new(projections)),
            cache,
            graph,
            users,
            games,
        }
    }

    fn request(game_id: GameId, rating: i64) -> RatingRequest {
        RatingRequest { game_id, rating }
    }

    #[tokio::test]
    async fn rerating_overwrites_in_place() {
        let f = fixture().await;
        let (user, game) = (f.users[0], f.games[0]);

        let first = f.service.rate(user, &request(game, 4)).await.unwrap();
        let second = f.service.rate(user, &request(game, 3)).await.unwrap();
        assert_eq!(first.id, second.id);

        let all = f.service.ratings_for_game(game).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].rating.rating, 3);
        assert_eq!(
            f.service.user_rating(game, user).await.unwrap().unwrap().rating,
            3
        );
    }

    #[tokio::test]
    async fn rejects_unknown_games_and_out_of_range_values() {
        let f = fixture().await;
        assert!(matches!(
            f.service.rate(f.users[0], &request(9999, 4)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.service.rate(f.users[0], &request(f.games[0], 6)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn rating_invalidates_cache_and_links_games() {
        let f = fixture().await;
        let ttl = Duration::from_secs(60);
        f.cache.set_ex(&game_key(f.games[0]), "{}", ttl).await.unwrap();

        f.service.rate(f.users[1], &request(f.games[0], 5)).await.unwrap();
        f.service.rate(f.users[1], &request(f.games[1], 4)).await.unwrap();

        assert!(f.cache.get(&game_key(f.games[0])).await.unwrap().is_none());
        let related = f.graph.related_games(f.games[0], 5).await.unwrap();
        assert_eq!(related[0].game_id, f.games[1]);
    }

    #[tokio::test]
    async fn only_the_owner_can_delete() {
        let f = fixture().await;
        let rating = f.service.rate(f.users[0], &request(f.games[0], 2)).await.unwrap();

        assert!(matches!(
            f.service.delete_rating(rating.id, f.users[1]).await,
            Err(AppError::NotFound(_))
        ));
        f.service.delete_rating(rating.id, f.users[0]).await.unwrap();
        assert!(f
            .service
            .user_rating(f.games[0], f.users[0])
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_ratings_leave_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ratings.db").display());
        let catalog = SqliteCatalogStore::connect(&url, 4).await.unwrap();
        catalog.migrate().await.unwrap();
        let f = fixture_with(Arc::new(catalog), None).await;
        let (user, game) = (f.users[1], f.games[0]);

        let (a, b) = (f.service.clone(), f.service.clone());
        let (first, second) = tokio::join!(
            tokio::spawn(async move { a.rate(user, &request(game, 4)).await }),
            tokio::spawn(async move { b.rate(user, &request(game, 3)).await }),
        );
        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();
        assert_eq!(first.id, second.id);

        let all = f.service.ratings_for_game(game).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(matches!(all[0].rating.rating, 3 | 4));
    }

    #[tokio::test]
    async fn graph_outage_does_not_fail_the_rating() {
        let catalog = Arc::new(SqliteCatalogStore::new_in_memory().await.unwrap());
        let f = fixture_with(catalog, Some(Arc::new(UnreachableGraph))).await;
        let (user, game) = (f.users[1], f.games[0]);
        f.cache.set_ex(&game_key(game), "{}", Duration::from_secs(60)).await.unwrap();

        let rating = f.service.rate(user, &request(game, 5)).await.unwrap();
        assert_eq!(rating.rating, 5);
        assert_eq!(
            f.service.user_rating(game, user).await.unwrap().unwrap().rating,
            5
        );
        // Updaters registered before the graph still ran.
        assert!(f.cache.get(&game_key(game)).await.unwrap().is_none());
    }
}
