use crate::error::AppResult;
use crate::models::{
    Comment, Game, GameChanges, GameId, GameNode, GameSummary, NewComment, NewGame, NewUser,
    Rating, RatingId, RatingWithUser, RelatedGame, User, UserId, UserProfile,
};
use async_trait::async_trait;
use std::time::Duration;

/// System of record for users, games and ratings.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn migrate(&self) -> AppResult<()>;
    async fn health_check(&self) -> AppResult<()>;
    async fn close(&self);

    // Users
    async fn create_user(&self, user: NewUser) -> AppResult<User>;
    async fn find_user(&self, id: UserId) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn user_profiles(&self, ids: &[UserId]) -> AppResult<Vec<UserProfile>>;

    // Games, always read with their rating aggregate
    async fn list_games(&self) -> AppResult<Vec<GameSummary>>;
    async fn get_game(&self, id: GameId) -> AppResult<Option<GameSummary>>;
    async fn games_by_ids(&self, ids: &[GameId]) -> AppResult<Vec<GameSummary>>;
    /// `pattern` is a ready LIKE pattern using `\` as escape character.
    async fn search_games(&self, pattern: &str) -> AppResult<Vec<GameSummary>>;
    async fn game_exists(&self, id: GameId) -> AppResult<bool>;
    async fn create_game(&self, game: NewGame) -> AppResult<Game>;
    async fn update_game(&self, id: GameId, changes: &GameChanges) -> AppResult<Option<Game>>;
    async fn delete_game(&self, id: GameId) -> AppResult<bool>;

    // Ratings
    /// Insert-or-update keyed by (game, user) in a single statement.
    async fn upsert_rating(&self, game_id: GameId, user_id: UserId, rating: i32)
        -> AppResult<Rating>;
    async fn ratings_for_game(&self, game_id: GameId) -> AppResult<Vec<RatingWithUser>>;
    async fn user_rating(&self, game_id: GameId, user_id: UserId) -> AppResult<Option<Rating>>;
    /// Deletes only when the rating belongs to `user_id`.
    async fn delete_rating(&self, id: RatingId, user_id: UserId) -> AppResult<Option<Rating>>;
}

/// Short-lived key/value store holding serialized catalogue payloads.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;
    async fn delete(&self, key: &str) -> AppResult<()>;
    async fn health_check(&self) -> AppResult<()>;
}

/// Comments and per-user game lists.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn health_check(&self) -> AppResult<()>;
    async fn close(&self) {}

    /// Newest first.
    async fn comments_for_game(&self, game_id: GameId) -> AppResult<Vec<Comment>>;
    async fn insert_comment(&self, comment: NewComment) -> AppResult<Comment>;
    /// Matches on id and author together; `None` when either differs.
    async fn update_comment(
        &self,
        id: &str,
        user_id: UserId,
        content: &str,
    ) -> AppResult<Option<Comment>>;
    async fn delete_comment(&self, id: &str, user_id: UserId) -> AppResult<bool>;
    async fn delete_comments_for_game(&self, game_id: GameId) -> AppResult<u64>;

    async fn user_games(&self, user_id: UserId) -> AppResult<Vec<GameId>>;
    async fn add_user_game(&self, user_id: UserId, game_id: GameId) -> AppResult<Vec<GameId>>;
    async fn remove_user_game(&self, user_id: UserId, game_id: GameId) -> AppResult<Vec<GameId>>;
    async fn remove_game_from_lists(&self, game_id: GameId) -> AppResult<u64>;
}

/// Recommendation graph: game/user nodes, `RATED` and `RELATED_TO` edges.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn health_check(&self) -> AppResult<()>;
    async fn ensure_constraints(&self) -> AppResult<()>;

    async fn upsert_game(&self, node: &GameNode) -> AppResult<()>;
    /// Removes the node together with every attached edge.
    async fn delete_game(&self, game_id: GameId) -> AppResult<()>;

    /// Creates or overwrites the `RATED` edge for (user, game).
    async fn record_rating(&self, user_id: UserId, game_id: GameId, rating: i32) -> AppResult<()>;
    /// Adds one to `RELATED_TO` between `game_id` and every other game the
    /// user rated within one point. Returns the number of edges touched.
    async fn reinforce_related(&self, user_id: UserId, game_id: GameId) -> AppResult<u64>;
    /// Drops the `RATED` edge; with `decay` the reinforcement it contributed
    /// is subtracted first and edges reaching zero are removed.
    async fn remove_rating(&self, user_id: UserId, game_id: GameId, decay: bool) -> AppResult<()>;

    /// Neighbours by descending weight.
    async fn related_games(&self, game_id: GameId, limit: usize) -> AppResult<Vec<RelatedGame>>;
}
