use std::sync::Arc;

use crate::error::AppResult;
use crate::infrastructure::DocumentStore;
use crate::models::{GameId, UserGameList, UserId};

/// Per-user bookmark list. Both add and remove are idempotent.
#[derive(Clone)]
pub struct UserListService {
    documents: Arc<dyn DocumentStore>,
}

impl UserListService {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn list(&self, user_id: UserId) -> AppResult<UserGameList> {
        let games = self.documents.user_games(user_id).await?;
        Ok(UserGameList { games })
    }

    pub async fn add(&self, user_id: UserId, game_id: GameId) -> AppResult<UserGameList> {
        let games = self.documents.add_user_game(user_id, game_id).await?;
        Ok(UserGameList { games })
    }

    pub async fn remove(&self, user_id: UserId, game_id: GameId) -> AppResult<UserGameList> {
        let games = self.documents.remove_user_game(user_id, game_id).await?;
        Ok(UserGameList { games })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryDocumentStore;

    #[tokio::test]
    async fn list_behaves_like_a_set() {
        let lists = UserListService::new(Arc::new(MemoryDocumentStore::new()));
        assert!(lists.list(1).await.unwrap().games.is_empty());

        lists.add(1, 7).await.unwrap();
        lists.add(1, 8).await.unwrap();
        assert_eq!(lists.add(1, 7).await.unwrap().games, vec![7, 8]);

        assert_eq!(lists.remove(1, 9).await.unwrap().games, vec![7, 8]);
        assert_eq!(lists.remove(1, 7).await.unwrap().games, vec![8]);
        assert!(lists.remove(2, 7).await.unwrap().games.is_empty());
    }
}
