use serde::{Deserialize, Serialize};

use super::{Game, GameId};

/// Projection of a game kept in the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameNode {
    pub id: GameId,
    pub title: String,
    pub genre: String,
}

impl From<&Game> for GameNode {
    fn from(game: &Game) -> Self {
        Self {
            id: game.id,
            title: game.title.clone(),
            genre: game.genre.clone().unwrap_or_default(),
        }
    }
}

/// A neighbour reached through a `RELATED_TO` edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedGame {
    pub game_id: GameId,
    pub weight: i64,
}
