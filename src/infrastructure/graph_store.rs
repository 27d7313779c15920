use async_trait::async_trait;
use neo4rs::{query, Graph, Query};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::infrastructure::traits::GraphStore;
use crate::models::{GameId, GameNode, RelatedGame, UserId};

/// Ratings at most this far apart count as agreement.
pub const AGREEMENT_DISTANCE: i32 = 1;

const CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT game_id_unique IF NOT EXISTS FOR (g:Game) REQUIRE g.id IS UNIQUE",
    "CREATE CONSTRAINT user_id_unique IF NOT EXISTS FOR (u:User) REQUIRE u.id IS UNIQUE",
];

// RELATED_TO always points from the lower game id to the higher one, so each
// unordered pair has exactly one edge.
const REINFORCE_RELATED: &str = r#"
    MATCH (u:User {id: $userId})-[r1:RATED]->(g1:Game {id: $gameId})
    MATCH (u)-[r2:RATED]->(g2:Game)
    WHERE g1.id <> g2.id AND abs(r1.rating - r2.rating) <= $distance
    WITH CASE WHEN g1.id < g2.id THEN g1 ELSE g2 END AS a,
         CASE WHEN g1.id < g2.id THEN g2 ELSE g1 END AS b
    MERGE (a)-[rel:RELATED_TO]->(b)
      ON CREATE SET rel.weight = 1
      ON MATCH SET rel.weight = rel.weight + 1
    RETURN count(rel) AS touched
"#;

const DECAY_RELATED: &str = r#"
    MATCH (u:User {id: $userId})-[r1:RATED]->(g1:Game {id: $gameId})
    MATCH (u)-[r2:RATED]->(g2:Game)
    WHERE g1.id <> g2.id AND abs(r1.rating - r2.rating) <= $distance
    MATCH (g1)-[rel:RELATED_TO]-(g2)
    SET rel.weight = rel.weight - 1
    WITH rel WHERE rel.weight <= 0
    DELETE rel
"#;

const RELATED_GAMES: &str = r#"
    MATCH (g:Game {id: $gameId})-[r:RELATED_TO]-(g2:Game)
    RETURN g2.id AS id, r.weight AS weight
    ORDER BY r.weight DESC, g2.id ASC
    LIMIT $limit
"#;

fn graph_error(context: &str, err: impl std::fmt::Display) -> AppError {
    AppError::GraphError(format!("{}: {}", context, err))
}

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    pub async fn connect(uri: &str, user: &str, password: &str) -> AppResult<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| graph_error("Failed to connect to Neo4j", e))?;
        let store = Self { graph };
        store.health_check().await?;

        info!("Connected to Neo4j at {}", uri);
        Ok(store)
    }

    async fn run(&self, context: &str, q: Query) -> AppResult<()> {
        self.graph.run(q).await.map_err(|e| graph_error(context, e))
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn health_check(&self) -> AppResult<()> {
        self.run("Neo4j health check failed", query("RETURN 1"))
            .await
    }

    async fn ensure_constraints(&self) -> AppResult<()> {
        for statement in CONSTRAINTS {
            self.run("Failed to create graph constraint", query(statement))
                .await?;
        }
        Ok(())
    }

    async fn upsert_game(&self, node: &GameNode) -> AppResult<()> {
        self.run(
            "Failed to upsert game node",
            query("MERGE (g:Game {id: $id}) SET g.title = $title, g.genre = $genre")
                .param("id", node.id)
                .param("title", node.title.as_str())
                .param("genre", node.genre.as_str()),
        )
        .await
    }

    async fn delete_game(&self, game_id: GameId) -> AppResult<()> {
        self.run(
            "Failed to delete game node",
            query("MATCH (g:Game {id: $id}) DETACH DELETE g").param("id", game_id),
        )
        .await
    }

    async fn record_rating(&self, user_id: UserId, game_id: GameId, rating: i32) -> AppResult<()> {
        self.run(
            "Failed to record rating edge",
            query(
                "MERGE (u:User {id: $userId}) \
                 MERGE (g:Game {id: $gameId}) \
                 MERGE (u)-[r:RATED]->(g) \
                 SET r.rating = $rating, r.updatedAt = timestamp()",
            )
            .param("userId", user_id)
            .param("gameId", game_id)
            .param("rating", i64::from(rating)),
        )
        .await
    }

    async fn reinforce_related(&self, user_id: UserId, game_id: GameId) -> AppResult<u64> {
        let mut rows = self
            .graph
            .execute(
                query(REINFORCE_RELATED)
                    .param("userId", user_id)
                    .param("gameId", game_id)
                    .param("distance", i64::from(AGREEMENT_DISTANCE)),
            )
            .await
            .map_err(|e| graph_error("Failed to reinforce related games", e))?;

        let mut touched = 0;
        if let Some(row) = rows
            .next()
            .await
            .map_err(|e| graph_error("Failed to read reinforcement result", e))?
        {
            touched = row
                .get::<i64>("touched")
                .map_err(|e| graph_error("Malformed reinforcement result", e))?;
        }
        Ok(touched.max(0) as u64)
    }

    async fn remove_rating(&self, user_id: UserId, game_id: GameId, decay: bool) -> AppResult<()> {
        if decay {
            self.run(
                "Failed to decay related games",
                query(DECAY_RELATED)
                    .param("userId", user_id)
                    .param("gameId", game_id)
                    .param("distance", i64::from(AGREEMENT_DISTANCE)),
            )
            .await?;
        }
        self.run(
            "Failed to remove rating edge",
            query("MATCH (:User {id: $userId})-[r:RATED]->(:Game {id: $gameId}) DELETE r")
                .param("userId", user_id)
                .param("gameId", game_id),
        )
        .await
    }

    async fn related_games(&self, game_id: GameId, limit: usize) -> AppResult<Vec<RelatedGame>> {
        let mut rows = self
            .graph
            .execute(
                query(RELATED_GAMES)
                    .param("gameId", game_id)
                    .param("limit", limit as i64),
            )
            .await
            .map_err(|e| graph_error("Failed to query related games", e))?;

        let mut related = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| graph_error("Failed to read related games", e))?
        {
            related.push(RelatedGame {
                game_id: row
                    .get::<i64>("id")
                    .map_err(|e| graph_error("Malformed related game id", e))?,
                weight: row
                    .get::<i64>("weight")
                    .map_err(|e| graph_error("Malformed related game weight", e))?,
            });
        }
        Ok(related)
    }
}

fn edge_key(a: GameId, b: GameId) -> (GameId, GameId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Default)]
struct MemoryGraph {
    games: HashMap<GameId, GameNode>,
    rated: HashMap<(UserId, GameId), i32>,
    related: HashMap<(GameId, GameId), i64>,
}

impl MemoryGraph {
    /// Games the user rated within agreement distance of their rating of `game_id`.
    fn agreeing_games(&self, user_id: UserId, game_id: GameId) -> Vec<GameId> {
        let Some(anchor) = self.rated.get(&(user_id, game_id)) else {
            return Vec::new();
        };
        self.rated
            .iter()
            .filter(|((user, other), rating)| {
                *user == user_id
                    && *other != game_id
                    && (*rating - anchor).abs() <= AGREEMENT_DISTANCE
            })
            .map(|((_, other), _)| *other)
            .collect()
    }
}

/// In-process graph used when no Neo4j URI is configured.
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: RwLock<MemoryGraph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains_game(&self, game_id: GameId) -> bool {
        self.inner.read().await.games.contains_key(&game_id)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    async fn ensure_constraints(&self) -> AppResult<()> {
        Ok(())
    }

    async fn upsert_game(&self, node: &GameNode) -> AppResult<()> {
        self.inner
            .write()
            .await
            .games
            .insert(node.id, node.clone());
        Ok(())
    }

    async fn delete_game(&self, game_id: GameId) -> AppResult<()> {
        let mut graph = self.inner.write().await;
        graph.games.remove(&game_id);
        graph.rated.retain(|(_, game), _| *game != game_id);
        graph
            .related
            .retain(|(a, b), _| *a != game_id && *b != game_id);
        Ok(())
    }

    async fn record_rating(&self, user_id: UserId, game_id: GameId, rating: i32) -> AppResult<()> {
        let mut graph = self.inner.write().await;
        graph.games.entry(game_id).or_insert_with(|| GameNode {
            id: game_id,
            title: String::new(),
            genre: String::new(),
        });
        graph.rated.insert((user_id, game_id), rating);
        Ok(())
    }

    async fn reinforce_related(&self, user_id: UserId, game_id: GameId) -> AppResult<u64> {
        let mut graph = self.inner.write().await;
        let others = graph.agreeing_games(user_id, game_id);
        for other in &others {
            *graph.related.entry(edge_key(game_id, *other)).or_insert(0) += 1;
        }
        Ok(others.len() as u64)
    }

    async fn remove_rating(&self, user_id: UserId, game_id: GameId, decay: bool) -> AppResult<()> {
        let mut graph = self.inner.write().await;
        if decay {
            let others = graph.agreeing_games(user_id, game_id);
            for other in others {
                let key = edge_key(game_id, other);
                if let Some(weight) = graph.related.get_mut(&key) {
                    *weight -= 1;
                    if *weight <= 0 {
                        graph.related.remove(&key);
                    }
                }
            }
        }
        graph.rated.remove(&(user_id, game_id));
        Ok(())
    }

    async fn related_games(&self, game_id: GameId, limit: usize) -> AppResult<Vec<RelatedGame>> {
        let graph = self.inner.read().await;
        let mut related: Vec<RelatedGame> = graph
            .related
            .iter()
            .filter_map(|((a, b), weight)| {
                let other = if *a == game_id {
                    *b
                } else if *b == game_id {
                    *a
                } else {
                    return None;
                };
                Some(RelatedGame {
                    game_id: other,
                    weight: *weight,
                })
            })
            .collect();
        related.sort_by(|x, y| y.weight.cmp(&x.weight).then(x.game_id.cmp(&y.game_id)));
        related.truncate(limit);
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn rate(graph: &MemoryGraphStore, user: UserId, game: GameId, rating: i32) -> u64 {
        graph.record_rating(user, game, rating).await.unwrap();
        graph.reinforce_related(user, game).await.unwrap()
    }

    #[tokio::test]
    async fn agreeing_users_strengthen_the_pair() {
        let graph = MemoryGraphStore::new();
        // Users 1 and 2 rate game 1 five and game 2 four; user 3 only rates game 1.
        rate(&graph, 1, 1, 5).await;
        assert_eq!(rate(&graph, 1, 2, 4).await, 1);
        rate(&graph, 2, 1, 5).await;
        rate(&graph, 2, 2, 4).await;
        assert_eq!(rate(&graph, 3, 1, 4).await, 0);

        let related = graph.related_games(1, 10).await.unwrap();
        assert_eq!(
            related,
            vec![RelatedGame {
                game_id: 2,
                weight: 2
            }]
        );
        assert_eq!(graph.related_games(2, 10).await.unwrap()[0].game_id, 1);
    }

    #[tokio::test]
    async fn distant_ratings_do_not_relate() {
        let graph = MemoryGraphStore::new();
        rate(&graph, 1, 1, 5).await;
        assert_eq!(rate(&graph, 1, 2, 2).await, 0);
        assert!(graph.related_games(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn neighbours_sort_by_weight_then_id() {
        let graph = MemoryGraphStore::new();
        rate(&graph, 1, 1, 4).await;
        rate(&graph, 1, 3, 4).await;
        rate(&graph, 1, 2, 4).await;
        rate(&graph, 2, 1, 3).await;
        rate(&graph, 2, 3, 3).await;

        let related = graph.related_games(1, 10).await.unwrap();
        let ids: Vec<GameId> = related.iter().map(|r| r.game_id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(graph.related_games(1, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn decay_removes_exhausted_edges() {
        let graph = MemoryGraphStore::new();
        rate(&graph, 1, 1, 5).await;
        rate(&graph, 1, 2, 5).await;

        graph.remove_rating(1, 2, false).await.unwrap();
        assert_eq!(graph.related_games(1, 10).await.unwrap()[0].weight, 1);

        rate(&graph, 1, 2, 5).await;
        assert_eq!(graph.related_games(1, 10).await.unwrap()[0].weight, 2);
        graph.remove_rating(1, 2, true).await.unwrap();
        assert_eq!(graph.related_games(1, 10).await.unwrap()[0].weight, 1);

        rate(&graph, 2, 1, 5).await;
        rate(&graph, 2, 2, 5).await;
        graph.delete_game(2).await.unwrap();
        assert!(graph.related_games(1, 10).await.unwrap().is_empty());
        assert!(!graph.contains_game(2).await);
    }
}
