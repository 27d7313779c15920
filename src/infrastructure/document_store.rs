use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::infrastructure::traits::DocumentStore;
use crate::models::{Comment, GameId, NewComment, UserId};

const COMMENTS: &str = "comments";
const USER_GAMES: &str = "usergames";

/// Comment ids are 24-character hex object ids; anything else is a client error.
pub fn parse_comment_id(id: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| AppError::Validation("Invalid comment id".to_string()))
}

fn to_utc(value: BsonDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or_default()
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    game_id: i64,
    user_id: i64,
    content: String,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

impl From<CommentDocument> for Comment {
    fn from(doc: CommentDocument) -> Self {
        Comment {
            id: doc.id.to_hex(),
            game_id: doc.game_id,
            user_id: doc.user_id,
            content: doc.content,
            created_at: to_utc(doc.created_at),
            updated_at: to_utc(doc.updated_at),
            user_name: None,
            user_email: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserGamesDocument {
    user_id: i64,
    #[serde(default)]
    games: Vec<i64>,
}

fn mongo_error(context: &str, err: mongodb::error::Error) -> AppError {
    AppError::DocumentError(format!("{}: {}", context, err))
}

pub struct MongoDocumentStore {
    client: Client,
    database: Database,
}

impl MongoDocumentStore {
    pub async fn connect(uri: &str, database_name: &str) -> AppResult<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| AppError::ConfigurationError(format!("Invalid MongoDB URI: {}", e)))?;
        options.app_name = Some("game-platform".to_string());

        let client = Client::with_options(options)
            .map_err(|e| mongo_error("Failed to create MongoDB client", e))?;
        let store = Self {
            database: client.database(database_name),
            client,
        };
        // The driver connects lazily; ping so startup retries see real failures.
        store.health_check().await?;
        store.ensure_indexes().await?;

        info!("Connected to MongoDB database {}", database_name);
        Ok(store)
    }

    fn comments(&self) -> Collection<CommentDocument> {
        self.database.collection(COMMENTS)
    }

    fn user_games_collection(&self) -> Collection<UserGamesDocument> {
        self.database.collection(USER_GAMES)
    }

    async fn ensure_indexes(&self) -> AppResult<()> {
        let by_game = IndexModel::builder()
            .keys(doc! { "gameId": 1, "createdAt": -1 })
            .build();
        self.comments()
            .create_index(by_game, None)
            .await
            .map_err(|e| mongo_error("Failed to index comments", e))?;

        let by_user = IndexModel::builder()
            .keys(doc! { "userId": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.user_games_collection()
            .create_index(by_user, None)
            .await
            .map_err(|e| mongo_error("Failed to index user game lists", e))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn health_check(&self) -> AppResult<()> {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| mongo_error("MongoDB ping failed", e))?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }

    async fn comments_for_game(&self, game_id: GameId) -> AppResult<Vec<Comment>> {
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .build();
        let cursor = self
            .comments()
            .find(doc! { "gameId": game_id }, options)
            .await
            .map_err(|e| mongo_error("Failed to query comments", e))?;
        let documents: Vec<CommentDocument> = cursor
            .try_collect()
            .await
            .map_err(|e| mongo_error("Failed to read comments", e))?;
        Ok(documents.into_iter().map(Comment::from).collect())
    }

    async fn insert_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let now = BsonDateTime::now();
        let document = CommentDocument {
            id: ObjectId::new(),
            game_id: comment.game_id,
            user_id: comment.user_id,
            content: comment.content,
            created_at: now,
            updated_at: now,
        };
        self.comments()
            .insert_one(&document, None)
            .await
            .map_err(|e| mongo_error("Failed to insert comment", e))?;
        Ok(document.into())
    }

    async fn update_comment(
        &self,
        id: &str,
        user_id: UserId,
        content: &str,
    ) -> AppResult<Option<Comment>> {
        let id = parse_comment_id(id)?;
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .comments()
            .find_one_and_update(
                doc! { "_id": id, "userId": user_id },
                doc! { "$set": { "content": content, "updatedAt": BsonDateTime::now() } },
                options,
            )
            .await
            .map_err(|e| mongo_error("Failed to update comment", e))?;
        Ok(updated.map(Comment::from))
    }

    async fn delete_comment(&self, id: &str, user_id: UserId) -> AppResult<bool> {
        let id = parse_comment_id(id)?;
        let result = self
            .comments()
            .delete_one(doc! { "_id": id, "userId": user_id }, None)
            .await
            .map_err(|e| mongo_error("Failed to delete comment", e))?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_comments_for_game(&self, game_id: GameId) -> AppResult<u64> {
        let result = self
            .comments()
            .delete_many(doc! { "gameId": game_id }, None)
            .await
            .map_err(|e| mongo_error("Failed to delete comments", e))?;
        Ok(result.deleted_count)
    }

    async fn user_games(&self, user_id: UserId) -> AppResult<Vec<GameId>> {
        let document = self
            .user_games_collection()
            .find_one(doc! { "userId": user_id }, None)
            .await
            .map_err(|e| mongo_error("Failed to load game list", e))?;
        Ok(document.map(|d| d.games).unwrap_or_default())
    }

    async fn add_user_game(&self, user_id: UserId, game_id: GameId) -> AppResult<Vec<GameId>> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let document = self
            .user_games_collection()
            .find_one_and_update(
                doc! { "userId": user_id },
                doc! {
                    "$addToSet": { "games": game_id },
                    "$set": { "updatedAt": BsonDateTime::now() },
                },
                options,
            )
            .await
            .map_err(|e| mongo_error("Failed to add game to list", e))?;
        Ok(document.map(|d| d.games).unwrap_or_default())
    }

    async fn remove_user_game(&self, user_id: UserId, game_id: GameId) -> AppResult<Vec<GameId>> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let document = self
            .user_games_collection()
            .find_one_and_update(
                doc! { "userId": user_id },
                doc! {
                    "$pull": { "games": game_id },
                    "$set": { "updatedAt": BsonDateTime::now() },
                },
                options,
            )
            .await
            .map_err(|e| mongo_error("Failed to remove game from list", e))?;
        Ok(document.map(|d| d.games).unwrap_or_default())
    }

    async fn remove_game_from_lists(&self, game_id: GameId) -> AppResult<u64> {
        let result = self
            .user_games_collection()
            .update_many(
                doc! { "games": game_id },
                doc! { "$pull": { "games": game_id } },
                None,
            )
            .await
            .map_err(|e| mongo_error("Failed to purge game from lists", e))?;
        Ok(result.modified_count)
    }
}

#[derive(Default)]
struct MemoryDocuments {
    comments: Vec<Comment>,
    lists: HashMap<UserId, Vec<GameId>>,
}

/// In-process document store used when no MongoDB URI is configured.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<MemoryDocuments>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    async fn comments_for_game(&self, game_id: GameId) -> AppResult<Vec<Comment>> {
        let inner = self.inner.read().await;
        let mut comments: Vec<Comment> = inner
            .comments
            .iter()
            .rev()
            .filter(|c| c.game_id == game_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    async fn insert_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let now = Utc::now();
        let stored = Comment {
            id: ObjectId::new().to_hex(),
            game_id: comment.game_id,
            user_id: comment.user_id,
            content: comment.content,
            created_at: now,
            updated_at: now,
            user_name: None,
            user_email: None,
        };
        self.inner.write().await.comments.push(stored.clone());
        Ok(stored)
    }

    async fn update_comment(
        &self,
        id: &str,
        user_id: UserId,
        content: &str,
    ) -> AppResult<Option<Comment>> {
        let id = parse_comment_id(id)?.to_hex();
        let mut inner = self.inner.write().await;
        let found = inner
            .comments
            .iter_mut()
            .find(|c| c.id == id && c.user_id == user_id);
        Ok(found.map(|comment| {
            comment.content = content.to_string();
            comment.updated_at = Utc::now();
            comment.clone()
        }))
    }

    async fn delete_comment(&self, id: &str, user_id: UserId) -> AppResult<bool> {
        let id = parse_comment_id(id)?.to_hex();
        let mut inner = self.inner.write().await;
        let before = inner.comments.len();
        inner
            .comments
            .retain(|c| !(c.id == id && c.user_id == user_id));
        Ok(inner.comments.len() < before)
    }

    async fn delete_comments_for_game(&self, game_id: GameId) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.comments.len();
        inner.comments.retain(|c| c.game_id != game_id);
        Ok((before - inner.comments.len()) as u64)
    }

    async fn user_games(&self, user_id: UserId) -> AppResult<Vec<GameId>> {
        let inner = self.inner.read().await;
        Ok(inner.lists.get(&user_id).cloned().unwrap_or_default())
    }

    async fn add_user_game(&self, user_id: UserId, game_id: GameId) -> AppResult<Vec<GameId>> {
        let mut inner = self.inner.write().await;
        let games = inner.lists.entry(user_id).or_default();
        if !games.contains(&game_id) {
            games.push(game_id);
        }
        Ok(games.clone())
    }

    async fn remove_user_game(&self, user_id: UserId, game_id: GameId) -> AppResult<Vec<GameId>> {
        let mut inner = self.inner.write().await;
        match inner.lists.get_mut(&user_id) {
            Some(games) => {
                games.retain(|g| *g != game_id);
                Ok(games.clone())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn remove_game_from_lists(&self, game_id: GameId) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        let mut touched = 0;
        for games in inner.lists.values_mut() {
            let before = games.len();
            games.retain(|g| *g != game_id);
            if games.len() < before {
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_comment(game_id: GameId, user_id: UserId, content: &str) -> NewComment {
        NewComment {
            game_id,
            user_id,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn adding_twice_keeps_one_entry() {
        let store = MemoryDocumentStore::new();
        store.add_user_game(1, 10).await.unwrap();
        let games = store.add_user_game(1, 10).await.unwrap();
        assert_eq!(games, vec![10]);

        let games = store.add_user_game(1, 11).await.unwrap();
        assert_eq!(games, vec![10, 11]);
    }

    #[tokio::test]
    async fn removing_absent_game_succeeds() {
        let store = MemoryDocumentStore::new();
        assert!(store.remove_user_game(1, 99).await.unwrap().is_empty());
        store.add_user_game(1, 10).await.unwrap();
        assert_eq!(store.remove_user_game(1, 99).await.unwrap(), vec![10]);
        assert!(store.remove_user_game(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn comments_are_owner_scoped() {
        let store = MemoryDocumentStore::new();
        let comment = store.insert_comment(new_comment(5, 1, "Great")).await.unwrap();

        assert!(store
            .update_comment(&comment.id, 2, "Hijacked")
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete_comment(&comment.id, 2).await.unwrap());

        let updated = store
            .update_comment(&comment.id, 1, "Still great")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "Still great");
        assert!(store.delete_comment(&comment.id, 1).await.unwrap());
        assert!(store.comments_for_game(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_comment_id_is_rejected() {
        let store = MemoryDocumentStore::new();
        let err = store.delete_comment("not-an-id", 1).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn comments_are_newest_first_and_purged_with_game() {
        let store = MemoryDocumentStore::new();
        store.insert_comment(new_comment(5, 1, "first")).await.unwrap();
        store.insert_comment(new_comment(5, 2, "second")).await.unwrap();
        store.insert_comment(new_comment(6, 2, "elsewhere")).await.unwrap();

        let comments = store.comments_for_game(5).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].content, "second");

        store.add_user_game(1, 5).await.unwrap();
        assert_eq!(store.delete_comments_for_game(5).await.unwrap(), 2);
        assert_eq!(store.remove_game_from_lists(5).await.unwrap(), 1);
        assert_eq!(store.comments_for_game(6).await.unwrap().len(), 1);
    }
}
