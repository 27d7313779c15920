// Game catalogue: cached reads, search and admin writes

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{
    game_key, CacheStore, CatalogEvent, CatalogStore, ProjectionRegistry, ALL_GAMES_KEY,
};
use crate::models::{Game, GameId, GameSummary, UpsertGameRequest, UserId};
use crate::services::validation;

/// Read responses are JSON text so a cache hit is returned byte-for-byte.
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogStore>,
    cache: Arc<dyn CacheStore>,
    projections: Arc<ProjectionRegistry>,
    cache_ttl: Duration,
}

impl CatalogService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        cache: Arc<dyn CacheStore>,
        projections: Arc<ProjectionRegistry>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            cache,
            projections,
            cache_ttl,
        }
    }

    /// `skip_cache` neither reads nor populates the cache.
    #[instrument(skip(self))]
    pub async fn list_games(&self, skip_cache: bool) -> AppResult<String> {
        if !skip_cache {
            if let Some(hit) = self.cached(ALL_GAMES_KEY).await {
                return Ok(hit);
            }
        }

        let games = self.catalog.list_games().await?;
        let payload = encode(&games)?;
        if !skip_cache {
            self.store(ALL_GAMES_KEY, &payload).await;
        }
        Ok(payload)
    }

    #[instrument(skip(self))]
    pub async fn get_game(&self, id: GameId) -> AppResult<String> {
        let key = game_key(id);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }

        let game = self
            .catalog
            .get_game(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Game not found".to_string()))?;
        let payload = encode(&game)?;
        self.store(&key, &payload).await;
        Ok(payload)
    }

    pub async fn search_games(&self, query: &str) -> AppResult<Vec<GameSummary>> {
        let pattern = validation::like_pattern(query)?;
        self.catalog.search_games(&pattern).await
    }

    #[instrument(skip(self, request))]
    pub async fn create_game(&self, request: &UpsertGameRequest, created_by: UserId) -> AppResult<Game> {
        let new_game = validation::new_game(request, created_by)?;
        let game = self.catalog.create_game(new_game).await?;
        self.projections
            .publish(&CatalogEvent::GameCreated(game.clone()))
            .await;
        Ok(game)
    }

    #[instrument(skip(self, request))]
    pub async fn update_game(&self, id: GameId, request: &UpsertGameRequest) -> AppResult<Game> {
        let changes = validation::game_changes(request)?;
        let game = self
            .catalog
            .update_game(id, &changes)
            .await?
            .ok_or_else(|| AppError::NotFound("Game not found".to_string()))?;
        self.projections
            .publish(&CatalogEvent::GameUpdated(game.clone()))
            .await;
        Ok(game)
    }

    #[instrument(skip(self))]
    pub async fn delete_game(&self, id: GameId) -> AppResult<()> {
        if !self.catalog.delete_game(id).await? {
            return Err(AppError::NotFound("Game not found".to_string()));
        }
        self.projections.publish(&CatalogEvent::GameDeleted(id)).await;
        Ok(())
    }

    async fn cached(&self, key: &str) -> Option<String> {
        match self.cache.get(key).await {
            Ok(Some(hit)) => {
                debug!(key, "Cache hit");
                Some(hit)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling back to store");
                None
            }
        }
    }

    async fn store(&self, key: &str, payload: &str) {
        if let Err(e) = self.cache.set_ex(key, payload, self.cache_ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize games: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{CacheInvalidator, MemoryCache, SqliteCatalogStore};
    use crate::models::{NewUser, Role};

    async fn setup() -> (CatalogService, Arc<SqliteCatalogStore>, Arc<MemoryCache>, UserId) {
        let catalog = Arc::new(SqliteCatalogStore::new_in_memory().await.unwrap());
        let cache = Arc::new(MemoryCache::new(64));
        let mut projections = ProjectionRegistry::new();
        projections.register(Box::new(CacheInvalidator::new(cache.clone())));

        let admin = catalog
            .create_user(NewUser {
                email: "admin@example.com".to_string(),
                name: "Admin".to_string(),
                role: Role::Admin,
                password_hash: "x".to_string(),
            })
            .await
            .unwrap();

        let service = CatalogService::new(
            catalog.clone(),
            cache.clone(),
            Arc::new(projections),
            Duration::from_secs(300),
        );
        (service, catalog, cache, admin.id)
    }

    fn request(title: &str) -> UpsertGameRequest {
        UpsertGameRequest {
            title: Some(title.to_string()),
            genre: Some("Platformer".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn listing_is_served_from_cache_until_a_write() {
        let (service, _, cache, admin) = setup().await;
        service.create_game(&request("Celeste"), admin).await.unwrap();

        let first = service.list_games(false).await.unwrap();
        assert!(cache.get(ALL_GAMES_KEY).await.unwrap().is_some());
        assert_eq!(service.list_games(false).await.unwrap(), first);

        service.create_game(&request("Hollow Knight"), admin).await.unwrap();
        assert!(cache.get(ALL_GAMES_KEY).await.unwrap().is_none());
        let after: Vec<GameSummary> =
            serde_json::from_str(&service.list_games(false).await.unwrap()).unwrap();
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn skip_cache_leaves_cache_untouched() {
        let (service, _, cache, admin) = setup().await;
        service.create_game(&request("Celeste"), admin).await.unwrap();

        service.list_games(true).await.unwrap();
        assert!(cache.get(ALL_GAMES_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_and_delete_evict_the_game_entry() {
        let (service, _, cache, admin) = setup().await;
        let game = service.create_game(&request("Celeste"), admin).await.unwrap();

        service.get_game(game.id).await.unwrap();
        assert!(cache.get(&game_key(game.id)).await.unwrap().is_some());

        let updated = service
            .update_game(
                game.id,
                &UpsertGameRequest {
                    platform: Some("Switch".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.platform.as_deref(), Some("Switch"));
        assert_eq!(updated.title, "Celeste");
        assert!(cache.get(&game_key(game.id)).await.unwrap().is_none());

        service.delete_game(game.id).await.unwrap();
        assert!(matches!(
            service.get_game(game.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_game(game.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let (service, _, _, admin) = setup().await;
        service.create_game(&request("100% Orange Juice"), admin).await.unwrap();
        service.create_game(&request("Celeste"), admin).await.unwrap();

        let hits = service.search_games("100%").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(service.search_games("_").await.unwrap().is_empty());
        assert_eq!(service.search_games("platform").await.unwrap().len(), 2);
        assert!(matches!(
            service.search_games("   ").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn missing_games_are_not_found() {
        let (service, _, _, _) = setup().await;
        assert!(matches!(service.get_game(404).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            service.update_game(404, &request("Nothing")).await,
            Err(AppError::NotFound(_))
        ));
    }
}
