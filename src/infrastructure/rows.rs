//! Row shapes shared by the Postgres and SQLite catalogue stores.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, AppResult};
use crate::models::{Game, GameSummary, Rating, RatingWithUser, User, UserProfile};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> AppResult<Self> {
        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role.parse().map_err(AppError::DatabaseError)?,
            password_hash: row.password_hash,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProfileRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = AppError;

    fn try_from(row: ProfileRow) -> AppResult<Self> {
        Ok(UserProfile {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role.parse().map_err(AppError::DatabaseError)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GameRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub platform: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub trailer_url: Option<String>,
    pub game_mode: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<GameRow> for Game {
    type Error = AppError;

    fn try_from(row: GameRow) -> AppResult<Self> {
        Ok(Game {
            id: row.id,
            title: row.title,
            description: row.description,
            genre: row.genre,
            platform: row.platform,
            release_date: row.release_date,
            image_url: row.image_url,
            trailer_url: row.trailer_url,
            game_mode: row.game_mode.parse().map_err(AppError::DatabaseError)?,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GameSummaryRow {
    #[sqlx(flatten)]
    pub game: GameRow,
    pub average_rating: f64,
    pub rating_count: i64,
    pub created_by_name: Option<String>,
}

impl TryFrom<GameSummaryRow> for GameSummary {
    type Error = AppError;

    fn try_from(row: GameSummaryRow) -> AppResult<Self> {
        Ok(GameSummary {
            game: row.game.try_into()?,
            average_rating: row.average_rating,
            rating_count: row.rating_count,
            created_by_name: row.created_by_name,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RatingRow {
    pub id: i64,
    pub game_id: i64,
    pub user_id: i64,
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

impl From<RatingRow> for Rating {
    fn from(row: RatingRow) -> Self {
        Rating {
            id: row.id,
            game_id: row.game_id,
            user_id: row.user_id,
            rating: row.rating,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RatingWithUserRow {
    #[sqlx(flatten)]
    pub rating: RatingRow,
    pub user_name: String,
    pub user_email: String,
}

impl From<RatingWithUserRow> for RatingWithUser {
    fn from(row: RatingWithUserRow) -> Self {
        RatingWithUser {
            rating: row.rating.into(),
            user_name: row.user_name,
            user_email: row.user_email,
        }
    }
}

pub(crate) fn collect_games(rows: Vec<GameSummaryRow>) -> AppResult<Vec<GameSummary>> {
    rows.into_iter().map(GameSummary::try_from).collect()
}

/// Maps a failed write, turning constraint violations into client errors.
pub(crate) fn write_error(context: &str, err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::Conflict("User already exists".to_string());
        }
        if db_err.is_foreign_key_violation() {
            return AppError::NotFound("Game not found".to_string());
        }
    }
    AppError::DatabaseError(format!("{}: {}", context, err))
}

pub(crate) fn read_error(context: &str, err: sqlx::Error) -> AppError {
    AppError::DatabaseError(format!("{}: {}", context, err))
}
