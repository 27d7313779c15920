use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
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
           COALESCE(AVG(r.rating)::float8, 0) AS average_rating,
           COUNT(r.id) AS rating_count,
           u.name AS created_by_name
    FROM games g
    LEFT JOIN ratings r ON r.game_id = g.id
    LEFT JOIN users u ON u.id = g.created_by
"#;

const SUMMARY_GROUP: &str = " GROUP BY g.id, u.name ";

const RATING_COLUMNS: &str = "id, game_id, user_id, rating, created_at";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email VARCHAR(255) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        name VARCHAR(255) NOT NULL,
        role VARCHAR(20) NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS games (
        id BIGSERIAL PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        description TEXT,
        genre TEXT,
        platform TEXT,
        release_date DATE,
        image_url TEXT,
        trailer_url TEXT,
        game_mode VARCHAR(20) NOT NULL DEFAULT 'solo'
            CHECK (game_mode IN ('solo', 'multiplayer', 'both')),
        created_by BIGINT REFERENCES users(id) ON DELETE SET NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ratings (
        id BIGSERIAL PRIMARY KEY,
        game_id BIGINT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (game_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ratings_game_id ON ratings(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_ratings_user_id ON ratings(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_games_title ON games(title)",
];

/// PostgreSQL catalogue store used in deployed environments.
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

        info!("Connected to PostgreSQL (max {} connections)", max_connections);
        Ok(Self { pool })
    }

    async fn fetch_summaries(
        &self,
        mut builder: QueryBuilder<'_, Postgres>,
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
impl CatalogStore for PostgresCatalogStore {
    async fn migrate(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to apply schema: {}", e)))?;
        }
        info!("Relational schema is up to date");
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
            "INSERT INTO users (email, password_hash, name, role) VALUES ($1, $2, $3, $4) \
             RETURNING id, email, name, role, password_hash, created_at",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error("Failed to create user", e))?;
        row.try_into()
    }

    async fn find_user(&self, id: UserId) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, role, password_hash, created_at FROM users WHERE id = $1",
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
            "SELECT id, email, name, role, password_hash, created_at FROM users WHERE email = $1",
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
        let rows = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, email, name, role FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
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
        builder.push(" WHERE g.id = ANY(").push_bind(ids.to_vec()).push(")");
        builder.push(SUMMARY_GROUP);
        self.fetch_summaries(builder).await
    }

    async fn search_games(&self, pattern: &str) -> AppResult<Vec<GameSummary>> {
        let mut builder = QueryBuilder::new(SUMMARY_SELECT);
        builder
            .push(" WHERE g.title ILIKE ")
            .push_bind(pattern.to_string())
            .push(r" ESCAPE '\' OR g.description ILIKE ")
            .push_bind(pattern.to_string())
            .push(r" ESCAPE '\' OR g.genre ILIKE ")
            .push_bind(pattern.to_string())
            .push(r" ESCAPE '\'");
        builder.push(SUMMARY_GROUP);
        builder.push("ORDER BY g.title ASC, g.id ASC");
        self.fetch_summaries(builder).await
    }

    async fn game_exists(&self, id: GameId) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM games WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error("Failed to load game", e))?;
        Ok(found.is_some())
    }

    async fn create_game(&self, game: NewGame) -> AppResult<Game> {
        let sql = format!(
            "INSERT INTO games (title, description, genre, platform, release_date, image_url, \
             trailer_url, game_mode, created_by) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {}",
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
            .fetch_one(&self.pool)
            .await
            .map_err(|e| write_error("Failed to create game", e))?;
        row.try_into()
    }

    async fn update_game(&self, id: GameId, changes: &GameChanges) -> AppResult<Option<Game>> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE games SET ");
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
        set.push("updated_at = NOW()");
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
        let result = sqlx::query("DELETE FROM games WHERE id = $1")
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
            "INSERT INTO ratings (game_id, user_id, rating) VALUES ($1, $2, $3) \
             ON CONFLICT (game_id, user_id) \
             DO UPDATE SET rating = EXCLUDED.rating, created_at = NOW() \
             RETURNING {}",
            RATING_COLUMNS
        );
        let row = sqlx::query_as::<_, RatingRow>(&sql)
            .bind(game_id)
            .bind(user_id)
            .bind(rating)
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
             WHERE r.game_id = $1 ORDER BY r.created_at DESC, r.id DESC",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error("Failed to load ratings", e))?;
        Ok(rows.into_iter().map(RatingWithUser::from).collect())
    }

    async fn user_rating(&self, game_id: GameId, user_id: UserId) -> AppResult<Option<Rating>> {
        let sql = format!(
            "SELECT {} FROM ratings WHERE game_id = $1 AND user_id = $2",
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
            "DELETE FROM ratings WHERE id = $1 AND user_id = $2 RETURNING {}",
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
