use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::infrastructure::rows::{
    collect_games, read_error, write_error, GameRow, GameSummaryRow, ProfileRow, RatingRow,
    RatingWithUserRow, UserRow,
};
use crate::infrastructure::traits::CatalogStore;
use crate::models::{
    Game, GameChanges, GameId, GameSummary, NewGame, NewUser, Rating, RatingId, RatingWithUser,
    User, UserId, UserProfile,
};

const GAME_COLUMNS: &str = "id, title, description, genre, platform, release_date, image_url, \
     trailer_url, game_mode, created_by, created_at, updated_at";

const SUMMARY_SELECT: &str = r#"
    SELECT g.id, g.title, g.description, g.genre, g.platform, g.release_date, g.image_url,
           g.trailer_url, g.game_mode, g.created_by, g.created_at, g.updated_at,
           COALESCE(AVG(r.rating), 0.0) AS average_rating,
           COUNT(r.id) AS rating_count,
           u.name AS created_by_name
    FROM games g
    LEFT JOIN ratings r ON r.game_id = g.id
    LEFT JOIN users u ON u.id = g.created_by
"#;

const SUMMARY_GROUP: &str = " GROUP BY g.id ";

const RATING_COLUMNS: &str = "id, game_id, user_id, rating, created_at";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        name TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS games (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT,
        genre TEXT,
        platform TEXT,
        release_date TEXT,
        image_url TEXT,
        trailer_url TEXT,
        game_mode TEXT NOT NULL DEFAULT 'solo'
            CHECK (game_mode IN ('solo', 'multiplayer', 'both')),
        created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ratings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        created_at TEXT NOT NULL,
        UNIQUE (game_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ratings_game_id ON ratings(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_ratings_user_id ON ratings(user_id)",
];

/// SQLite catalogue store for local development and tests.
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` opens a separate database, so the
        // single connection must never be recycled.
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to SQLite: {}", e)))?;

        info!("Connected to SQLite at {}", database_url);
        Ok(Self { pool })
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        let store = Self::connect("sqlite::memory:", 1).await?;
        store.migrate().await?;
        Ok(store)
    }

    async fn fetch_summaries(
        &self,
        mut builder: QueryBuilder<'_, Sqlite>,
    ) -> AppResult<Vec<GameSummary>> {
        let rows = builder
            .build_query_as::<GameSummaryRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| read_error("Failed to load games", e))?;
        collect_games(rows)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn migrate(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to apply schema: {}", e)))?;
        }
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (email, password_hash, name, role, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id, email, name, role, password_hash, created_at",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error("Failed to create user", e))?;
        row.try_into()
    }

    async fn find_user(&self, id: UserId) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, role, password_hash, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error("Failed to load user", e))?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, role, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error("Failed to load user", e))?
        .map(User::try_from)
        .transpose()
    }

    async fn user_profiles(&self, ids: &[UserId]) -> AppResult<Vec<UserProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT id, email, name, role FROM users WHERE id IN (");
        let mut list = builder.separated(", ");
        for id in ids {
            list.push_bind(*id);
        }
        builder.push(")");

        let rows = builder
            .build_query_as::<ProfileRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| read_error("Failed to load users", e))?;
        rows.into_iter().map(UserProfile::try_from).collect()
    }

    async fn list_games(&self) -> AppResult<Vec<GameSummary>> {
        let mut builder = QueryBuilder::new(SUMMARY_SELECT);
        builder.push(SUMMARY_GROUP);
        builder.push("ORDER BY g.created_at DESC, g.id DESC");
        self.fetch_summaries(builder).await
    }

    async fn get_game(&self, id: GameId) -> AppResult<Option<GameSummary>> {
        let mut builder = QueryBuilder::new(SUMMARY_SELECT);
        builder.push(" WHERE g.id = ").push_bind(id);
        builder.push(SUMMARY_GROUP);
        Ok(self.fetch_summaries(builder).await?.pop())
    }

    async fn games_by_ids(&self, ids: &[GameId]) -> AppResult<Vec<GameSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::new(SUMMARY_SELECT);
        builder.push(" WHERE g.id IN (");
        let mut list = builder.separated(", ");
        for id in ids {
            list.push_bind(*id);
        }
        builder.push(")");
        builder.push(SUMMARY_GROUP);
        self.fetch_summaries(builder).await
    }

    async fn search_games(&self, pattern: &str) -> AppResult<Vec<GameSummary>> {
        let mut builder = QueryBuilder::new(SUMMARY_SELECT);
        builder
            .push(" WHERE g.title LIKE ")
            .push_bind(pattern.to_string())
            .push(r" ESCAPE '\' OR g.description LIKE ")
            .push_bind(pattern.to_string())
            .push(r" ESCAPE '\' OR g.genre LIKE ")
            .push_bind(pattern.to_string())
            .push(r" ESCAPE '\'");
        builder.push(SUMMARY_GROUP);
        builder.push("ORDER BY g.title ASC, g.id ASC");
        self.fetch_summaries(builder).await
    }

    async fn game_exists(&self, id: GameId) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM games WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error("Failed to load game", e))?;
        Ok(found.is_some())
    }

    async fn create_game(&self, game: NewGame) -> AppResult<Game> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO games (title, description, genre, platform, release_date, image_url, \
             trailer_url, game_mode, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            GAME_COLUMNS
        );
        let row = sqlx::query_as::<_, GameRow>(&sql)
            .bind(&game.title)
            .bind(&game.description)
            .bind(&game.genre)
            .bind(&game.platform)
            .bind(game.release_date)
            .bind(&game.image_url)
            .bind(&game.trailer_url)
            .bind(game.game_mode.as_str())
            .bind(game.created_by)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| write_error("Failed to create game", e))?;
        row.try_into()
    }

    async fn update_game(&self, id: GameId, changes: &GameChanges) -> AppResult<Option<Game>> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE games SET ");
        let mut set = builder.separated(", ");
        if let Some(title) = &changes.title {
            set.push("title = ").push_bind_unseparated(title.clone());
        }
        if let Some(description) = &changes.description {
            set.push("description = ")
                .push_bind_unseparated(description.clone());
        }
        if let Some(genre) = &changes.genre {
            set.push("genre = ").push_bind_unseparated(genre.clone());
        }
        if let Some(platform) = &changes.platform {
            set.push("platform = ").push_bind_unseparated(platform.clone());
        }
        if let Some(release_date) = changes.release_date {
            set.push("release_date = ")
                .push_bind_unseparated(release_date);
        }
        if let Some(image_url) = &changes.image_url {
            set.push("image_url = ").push_bind_unseparated(image_url.clone());
        }
        if let Some(trailer_url) = &changes.trailer_url {
            set.push("trailer_url = ")
                .push_bind_unseparated(trailer_url.clone());
        }
        if let Some(mode) = changes.game_mode {
            set.push("game_mode = ").push_bind_unseparated(mode.as_str());
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        builder.push(" WHERE id = ").push_bind(id);
        builder.push(" RETURNING ").push(GAME_COLUMNS);

        builder
            .build_query_as::<GameRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error("Failed to update game", e))?
            .map(Game::try_from)
            .transpose()
    }

    async fn delete_game(&self, id: GameId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM games WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error("Failed to delete game", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_rating(
        &self,
        game_id: GameId,
        user_id: UserId,
        rating: i32,
    ) -> AppResult<Rating> {
        let sql = format!(
            "INSERT INTO ratings (game_id, user_id, rating, created_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (game_id, user_id) \
             DO UPDATE SET rating = excluded.rating, created_at = excluded.created_at \
             RETURNING {}",
            RATING_COLUMNS
        );
        let row = sqlx::query_as::<_, RatingRow>(&sql)
            .bind(game_id)
            .bind(user_id)
            .bind(rating)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| write_error("Failed to save rating", e))?;
        Ok(row.into())
    }

    async fn ratings_for_game(&self, game_id: GameId) -> AppResult<Vec<RatingWithUser>> {
        let rows = sqlx::query_as::<_, RatingWithUserRow>(
            "SELECT r.id, r.game_id, r.user_id, r.rating, r.created_at, \
             u.name AS user_name, u.email AS user_email \
             FROM ratings r JOIN users u ON u.id = r.user_id \
             WHERE r.game_id = ? ORDER BY r.created_at DESC, r.id DESC",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("Failed to load ratings", e))?;
        Ok(rows.into_iter().map(RatingWithUser::from).collect())
    }

    async fn user_rating(&self, game_id: GameId, user_id: UserId) -> AppResult<Option<Rating>> {
        let sql = format!(
            "SELECT {} FROM ratings WHERE game_id = ? AND user_id = ?",
            RATING_COLUMNS
        );
        let row = sqlx::query_as::<_, RatingRow>(&sql)
            .bind(game_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error("Failed to load rating", e))?;
        Ok(row.map(Rating::from))
    }

    async fn delete_rating(&self, id: RatingId, user_id: UserId) -> AppResult<Option<Rating>> {
        let sql = format!(
            "DELETE FROM ratings WHERE id = ? AND user_id = ? RETURNING {}",
            RATING_COLUMNS
        );
        let row = sqlx::query_as::<_, RatingRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error("Failed to delete rating", e))?;
        Ok(row.map(Rating::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GameMode, Role};
    use chrono::NaiveDate;

    async fn store() -> SqliteCatalogStore {
        SqliteCatalogStore::new_in_memory().await.unwrap()
    }

    async fn user(store: &SqliteCatalogStore, email: &str) -> User {
        store
            .create_user(NewUser {
                email: email.to_string(),
                name: "Player".to_string(),
                role: Role::User,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap()
    }

    async fn game(store: &SqliteCatalogStore, title: &str, owner: UserId) -> Game {
        store
            .create_game(NewGame {
                title: title.to_string(),
                description: Some(format!("{} description", title)),
                genre: Some("RPG".to_string()),
                platform: None,
                release_date: NaiveDate::from_ymd_opt(2017, 3, 3),
                image_url: None,
                trailer_url: None,
                game_mode: GameMode::Solo,
                created_by: owner,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = store().await;
        user(&store, "a@example.com").await;
        let err = store
            .create_user(NewUser {
                email: "a@example.com".to_string(),
                name: "Again".to_string(),
                role: Role::User,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn rating_twice_keeps_a_single_row() {
        let store = store().await;
        let owner = user(&store, "a@example.com").await;
        let zelda = game(&store, "Zelda", owner.id).await;

        let first = store.upsert_rating(zelda.id, owner.id, 5).await.unwrap();
        let second = store.upsert_rating(zelda.id, owner.id, 3).await.unwrap();

        assert_eq!(first.id, second.id);
        let ratings = store.ratings_for_game(zelda.id).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].rating.rating, 3);
        assert_eq!(ratings[0].user_email, "a@example.com");
    }

    #[tokio::test]
    async fn summaries_carry_rating_aggregates() {
        let store = store().await;
        let a = user(&store, "a@example.com").await;
        let b = user(&store, "b@example.com").await;
        let zelda = game(&store, "Zelda", a.id).await;
        let unrated = game(&store, "Metroid", a.id).await;

        store.upsert_rating(zelda.id, a.id, 5).await.unwrap();
        store.upsert_rating(zelda.id, b.id, 4).await.unwrap();

        let summary = store.get_game(zelda.id).await.unwrap().unwrap();
        assert_eq!(summary.rating_count, 2);
        assert!((summary.average_rating - 4.5).abs() < f64::EPSILON);
        assert_eq!(summary.created_by_name.as_deref(), Some("Player"));

        let empty = store.get_game(unrated.id).await.unwrap().unwrap();
        assert_eq!(empty.rating_count, 0);
        assert_eq!(empty.average_rating, 0.0);

        let listing = store.list_games().await.unwrap();
        assert_eq!(listing[0].game.id, unrated.id);
        assert_eq!(listing[1].game.id, zelda.id);
    }

    #[tokio::test]
    async fn deleting_a_game_cascades_to_ratings() {
        let store = store().await;
        let a = user(&store, "a@example.com").await;
        let zelda = game(&store, "Zelda", a.id).await;
        store.upsert_rating(zelda.id, a.id, 4).await.unwrap();

        assert!(store.delete_game(zelda.id).await.unwrap());
        assert!(!store.delete_game(zelda.id).await.unwrap());
        assert!(store.user_rating(zelda.id, a.id).await.unwrap().is_none());
        assert!(store.get_game(zelda.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let store = store().await;
        let a = user(&store, "a@example.com").await;
        let zelda = game(&store, "Zelda", a.id).await;

        let changes = GameChanges {
            title: Some("Zelda: BotW".to_string()),
            genre: Some(None),
            ..Default::default()
        };
        let updated = store.update_game(zelda.id, &changes).await.unwrap().unwrap();
        assert_eq!(updated.title, "Zelda: BotW");
        assert_eq!(updated.genre, None);
        assert_eq!(updated.description, zelda.description);
        assert_eq!(updated.release_date, zelda.release_date);

        assert!(store.update_game(9999, &changes).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_matches_title_or_description() {
        let store = store().await;
        let a = user(&store, "a@example.com").await;
        game(&store, "Hollow Knight", a.id).await;
        game(&store, "Celeste", a.id).await;

        let found = store.search_games("%knight%").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].game.title, "Hollow Knight");

        let by_description = store.search_games("%celeste desc%").await.unwrap();
        assert_eq!(by_description.len(), 1);
    }

    #[tokio::test]
    async fn rating_is_only_deleted_by_its_author() {
        let store = store().await;
        let a = user(&store, "a@example.com").await;
        let b = user(&store, "b@example.com").await;
        let zelda = game(&store, "Zelda", a.id).await;
        let rating = store.upsert_rating(zelda.id, a.id, 2).await.unwrap();

        assert!(store.delete_rating(rating.id, b.id).await.unwrap().is_none());
        let removed = store.delete_rating(rating.id, a.id).await.unwrap().unwrap();
        assert_eq!(removed.game_id, zelda.id);
    }
}
