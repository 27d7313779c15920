// Post-commit projection updaters.
//
// After a write to the catalogue store commits, the originating service
// publishes a CatalogEvent. Every registered updater sees the event in
// registration order; a failing updater is logged and skipped, never
// surfaced to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::cache_layer::{game_key, ALL_GAMES_KEY};
use crate::infrastructure::traits::{CacheStore, DocumentStore, GraphStore};
use crate::models::{Game, GameId, GameNode, Rating};

#[derive(Debug, Clone)]
pub enum CatalogEvent {
    GameCreated(Game),
    GameUpdated(Game),
    GameDeleted(GameId),
    RatingUpserted(Rating),
    RatingDeleted(Rating),
}

impl CatalogEvent {
    pub fn game_id(&self) -> GameId {
        match self {
            CatalogEvent::GameCreated(game) | CatalogEvent::GameUpdated(game) => game.id,
            CatalogEvent::GameDeleted(id) => *id,
            CatalogEvent::RatingUpserted(rating) | CatalogEvent::RatingDeleted(rating) => {
                rating.game_id
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CatalogEvent::GameCreated(_) => "game_created",
            CatalogEvent::GameUpdated(_) => "game_updated",
            CatalogEvent::GameDeleted(_) => "game_deleted",
            CatalogEvent::RatingUpserted(_) => "rating_upserted",
            CatalogEvent::RatingDeleted(_) => "rating_deleted",
        }
    }
}

/// A denormalized view kept in step with the catalogue store.
#[async_trait]
pub trait ProjectionUpdater: Send + Sync {
    fn name(&self) -> &str;

    async fn apply_game_created(&self, _game: &Game) -> AppResult<()> {
        Ok(())
    }

    async fn apply_game_updated(&self, _game: &Game) -> AppResult<()> {
        Ok(())
    }

    async fn apply_game_deleted(&self, _game_id: GameId) -> AppResult<()> {
        Ok(())
    }

    async fn apply_rating_upserted(&self, _rating: &Rating) -> AppResult<()> {
        Ok(())
    }

    async fn apply_rating_deleted(&self, _rating: &Rating) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct ProjectionRegistry {
    updaters: Vec<Box<dyn ProjectionUpdater>>,
}

impl ProjectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, updater: Box<dyn ProjectionUpdater>) {
        info!("Registered projection updater {}", updater.name());
        self.updaters.push(updater);
    }

    pub fn names(&self) -> Vec<&str> {
        self.updaters.iter().map(|u| u.name()).collect()
    }

    pub async fn publish(&self, event: &CatalogEvent) {
        debug!(event = event.kind(), game_id = event.game_id(), "Publishing catalog event");
        for updater in &self.updaters {
            let result = match event {
                CatalogEvent::GameCreated(game) => updater.apply_game_created(game).await,
                CatalogEvent::GameUpdated(game) => updater.apply_game_updated(game).await,
                CatalogEvent::GameDeleted(id) => updater.apply_game_deleted(*id).await,
                CatalogEvent::RatingUpserted(rating) => updater.apply_rating_upserted(rating).await,
                CatalogEvent::RatingDeleted(rating) => updater.apply_rating_deleted(rating).await,
            };
            if let Err(e) = result {
                warn!(
                    projection = updater.name(),
                    event = event.kind(),
                    game_id = event.game_id(),
                    error = %e,
                    "Projection update failed"
                );
            }
        }
    }
}

/// Runs every step, then reports all failures together.
fn all_steps(results: Vec<AppResult<()>>, wrap: fn(String) -> AppError) -> AppResult<()> {
    let errors: Vec<String> = results
        .into_iter()
        .filter_map(Result::err)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(wrap(errors.join("; ")))
    }
}

pub struct CacheInvalidator {
    cache: Arc<dyn CacheStore>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    async fn invalidate(&self, game_id: Option<GameId>) -> AppResult<()> {
        let mut results = vec![self.cache.delete(ALL_GAMES_KEY).await];
        if let Some(id) = game_id {
            results.push(self.cache.delete(&game_key(id)).await);
        }
        all_steps(results, AppError::CacheError)
    }
}

#[async_trait]
impl ProjectionUpdater for CacheInvalidator {
    fn name(&self) -> &str {
        "cache_invalidator"
    }

    async fn apply_game_created(&self, _game: &Game) -> AppResult<()> {
        self.invalidate(None).await
    }

    async fn apply_game_updated(&self, game: &Game) -> AppResult<()> {
        self.invalidate(Some(game.id)).await
    }

    async fn apply_game_deleted(&self, game_id: GameId) -> AppResult<()> {
        self.invalidate(Some(game_id)).await
    }

    async fn apply_rating_upserted(&self, rating: &Rating) -> AppResult<()> {
        self.invalidate(Some(rating.game_id)).await
    }

    async fn apply_rating_deleted(&self, rating: &Rating) -> AppResult<()> {
        self.invalidate(Some(rating.game_id)).await
    }
}

pub struct GraphProjector {
    graph: Arc<dyn GraphStore>,
    decay_related_weights: bool,
}

impl GraphProjector {
    pub fn new(graph: Arc<dyn GraphStore>, decay_related_weights: bool) -> Self {
        Self {
            graph,
            decay_related_weights,
        }
    }
}

#[async_trait]
impl ProjectionUpdater for GraphProjector {
    fn name(&self) -> &str {
        "graph_projector"
    }

    async fn apply_game_created(&self, game: &Game) -> AppResult<()> {
        self.graph.upsert_game(&GameNode::from(game)).await
    }

    async fn apply_game_updated(&self, game: &Game) -> AppResult<()> {
        self.graph.upsert_game(&GameNode::from(game)).await
    }

    async fn apply_game_deleted(&self, game_id: GameId) -> AppResult<()> {
        self.graph.delete_game(game_id).await
    }

    async fn apply_rating_upserted(&self, rating: &Rating) -> AppResult<()> {
        let recorded = self
            .graph
            .record_rating(rating.user_id, rating.game_id, rating.rating)
            .await;
        let reinforced = match self
            .graph
            .reinforce_related(rating.user_id, rating.game_id)
            .await
        {
            Ok(touched) => {
                debug!(game_id = rating.game_id, touched, "Reinforced related games");
                Ok(())
            }
            Err(e) => Err(e),
        };
        all_steps(vec![recorded, reinforced], AppError::GraphError)
    }

    async fn apply_rating_deleted(&self, rating: &Rating) -> AppResult<()> {
        self.graph
            .remove_rating(rating.user_id, rating.game_id, self.decay_related_weights)
            .await
    }
}

/// Removes a deleted game's comments and list entries.
pub struct OrphanedDocumentPurger {
    documents: Arc<dyn DocumentStore>,
}

impl OrphanedDocumentPurger {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl ProjectionUpdater for OrphanedDocumentPurger {
    fn name(&self) -> &str {
        "orphaned_document_purger"
    }

    async fn apply_game_deleted(&self, game_id: GameId) -> AppResult<()> {
        let comments = self.documents.delete_comments_for_game(game_id).await;
        let lists = self.documents.remove_game_from_lists(game_id).await;
        if let (Ok(comments), Ok(lists)) = (&comments, &lists) {
            info!(game_id, comments, lists, "Purged documents for deleted game");
        }
        all_steps(
            vec![comments.map(|_| ()), lists.map(|_| ())],
            AppError::DocumentError,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache_layer::MemoryCache;
    use crate::infrastructure::graph_store::MemoryGraphStore;
    use crate::models::GameMode;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Failing;

    #[async_trait]
    impl ProjectionUpdater for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn apply_game_deleted(&self, _game_id: GameId) -> AppResult<()> {
            Err(AppError::GraphError("graph unavailable".to_string()))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl ProjectionUpdater for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn apply_game_deleted(&self, _game_id: GameId) -> AppResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn game(id: GameId) -> Game {
        Game {
            id,
            title: "Portal".to_string(),
            description: None,
            genre: Some("Puzzle".to_string()),
            platform: None,
            release_date: None,
            image_url: None,
            trailer_url: None,
            game_mode: GameMode::Solo,
            created_by: Some(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failures_do_not_stop_later_updaters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ProjectionRegistry::new();
        registry.register(Box::new(Failing));
        registry.register(Box::new(Counting(calls.clone())));

        registry.publish(&CatalogEvent::GameDeleted(3)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.names(), vec!["failing", "counting"]);
    }

    #[tokio::test]
    async fn rating_events_invalidate_and_project() {
        let cache = Arc::new(MemoryCache::new(16));
        let graph = Arc::new(MemoryGraphStore::new());
        let mut registry = ProjectionRegistry::new();
        registry.register(Box::new(CacheInvalidator::new(cache.clone())));
        registry.register(Box::new(GraphProjector::new(graph.clone(), false)));

        let ttl = Duration::from_secs(60);
        cache.set_ex(ALL_GAMES_KEY, "[]", ttl).await.unwrap();
        cache.set_ex(&game_key(1), "{}", ttl).await.unwrap();
        cache.set_ex(&game_key(2), "{}", ttl).await.unwrap();

        registry.publish(&CatalogEvent::GameCreated(game(1))).await;
        assert!(graph.contains_game(1).await);

        let rating = |game_id, value| Rating {
            id: game_id,
            game_id,
            user_id: 9,
            rating: value,
            created_at: Utc::now(),
        };
        registry.publish(&CatalogEvent::RatingUpserted(rating(1, 4))).await;
        registry.publish(&CatalogEvent::RatingUpserted(rating(2, 5))).await;

        assert!(cache.get(ALL_GAMES_KEY).await.unwrap().is_none());
        assert!(cache.get(&game_key(1)).await.unwrap().is_none());
        assert!(cache.get(&game_key(2)).await.unwrap().is_none());
        assert_eq!(graph.related_games(1, 5).await.unwrap()[0].game_id, 2);
    }
}
