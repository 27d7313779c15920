use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{GameId, UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Solo,
    Multiplayer,
    Both,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Solo => "solo",
            GameMode::Multiplayer => "multiplayer",
            GameMode::Both => "both",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solo" => Ok(GameMode::Solo),
            "multiplayer" => Ok(GameMode::Multiplayer),
            "both" => Ok(GameMode::Both),
            other => Err(format!(
                "gameMode must be one of solo, multiplayer, both (got '{}')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub platform: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub trailer_url: Option<String>,
    pub game_mode: GameMode,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A game annotated with its rating aggregate, computed at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    #[serde(flatten)]
    pub game: Game,
    pub average_rating: f64,
    pub rating_count: i64,
    pub created_by_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGame {
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub platform: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub trailer_url: Option<String>,
    pub game_mode: GameMode,
    pub created_by: UserId,
}

/// Partial update. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub genre: Option<Option<String>>,
    pub platform: Option<Option<String>>,
    pub release_date: Option<Option<NaiveDate>>,
    pub image_url: Option<Option<String>>,
    pub trailer_url: Option<Option<String>>,
    pub game_mode: Option<GameMode>,
}

impl GameChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.genre.is_none()
            && self.platform.is_none()
            && self.release_date.is_none()
            && self.image_url.is_none()
            && self.trailer_url.is_none()
            && self.game_mode.is_none()
    }
}

/// Admin create/update body. Every field is optional at the wire level;
/// create additionally requires `title`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertGameRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub platform: Option<String>,
    pub release_date: Option<String>,
    pub image_url: Option<String>,
    pub trailer_url: Option<String>,
    pub game_mode: Option<String>,
}
