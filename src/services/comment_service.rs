// Game comments, stored in the document store and annotated with author profiles

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::infrastructure::{CatalogStore, DocumentStore};
use crate::models::{
    Comment, CommentRequest, GameId, NewComment, UpdateCommentRequest, UserId, UserProfile,
};
use crate::services::validation;

const COMMENT_NOT_FOUND: &str = "Comment not found";

#[derive(Clone)]
pub struct CommentService {
    catalog: Arc<dyn CatalogStore>,
    documents: Arc<dyn DocumentStore>,
}

impl CommentService {
    pub fn new(catalog: Arc<dyn CatalogStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { catalog, documents }
    }

    /// Newest first. Authors are resolved with one batched profile lookup.
    #[instrument(skip(self))]
    pub async fn comments_for_game(&self, game_id: GameId) -> AppResult<Vec<Comment>> {
        let mut comments = self.documents.comments_for_game(game_id).await?;
        if comments.is_empty() {
            return Ok(comments);
        }

        let authors: Vec<UserId> = comments
            .iter()
            .map(|c| c.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let profiles: HashMap<UserId, UserProfile> = self
            .catalog
            .user_profiles(&authors)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        for comment in &mut comments {
            if let Some(profile) = profiles.get(&comment.user_id) {
                comment.user_name = Some(profile.name.clone());
                comment.user_email = Some(profile.email.clone());
            }
        }
        Ok(comments)
    }

    pub async fn create(&self, user_id: UserId, request: &CommentRequest) -> AppResult<Comment> {
        let content = validation::comment_content(&request.content)?;
        self.documents
            .insert_comment(NewComment {
                game_id: request.game_id,
                user_id,
                content,
            })
            .await
    }

    /// Ownership is part of the match, so another user's comment is "not found".
    pub async fn update(
        &self,
        id: &str,
        user_id: UserId,
        request: &UpdateCommentRequest,
    ) -> AppResult<Comment> {
        let content = validation::comment_content(request.content.as_deref().unwrap_or_default())?;
        self.documents
            .update_comment(id, user_id, &content)
            .await?
            .ok_or_else(|| AppError::NotFound(COMMENT_NOT_FOUND.to_string()))
    }

    pub async fn delete(&self, id: &str, user_id: UserId) -> AppResult<()> {
        if self.documents.delete_comment(id, user_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(COMMENT_NOT_FOUND.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MemoryDocumentStore, SqliteCatalogStore};
    use crate::models::{NewUser, Role};

    async fn service() -> (CommentService, UserId, UserId) {
        let catalog = Arc::new(SqliteCatalogStore::new_in_memory().await.unwrap());
        let mut ids = Vec::new();
        for (email, name) in [("ann@example.com", "Ann"), ("ben@example.com", "Ben")] {
            let user = catalog
                .create_user(NewUser {
                    email: email.to_string(),
                    name: name.to_string(),
                    role: Role::User,
                    password_hash: "x".to_string(),
                })
                .await
                .unwrap();
            ids.push(user.id);
        }
        let service = CommentService::new(catalog, Arc::new(MemoryDocumentStore::new()));
        (service, ids[0], ids[1])
    }

    fn post(game_id: GameId, content: &str) -> CommentRequest {
        CommentRequest {
            game_id,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn listing_attaches_author_profiles() {
        let (service, ann, ben) = service().await;
        service.create(ann, &post(1, "First!")).await.unwrap();
        service.create(ben, &post(1, "  Second  ")).await.unwrap();
        service.create(ben, &post(2, "Elsewhere")).await.unwrap();

        let comments = service.comments_for_game(1).await.unwrap();
        assert_eq!(comments.len(), 2);
        let ben_comment = comments.iter().find(|c| c.user_id == ben).unwrap();
        assert_eq!(ben_comment.content, "Second");
        assert_eq!(ben_comment.user_name.as_deref(), Some("Ben"));
        assert_eq!(ben_comment.user_email.as_deref(), Some("ben@example.com"));
    }

    #[tokio::test]
    async fn content_bounds_apply_to_create_and_update() {
        let (service, ann, _) = service().await;
        assert!(matches!(
            service.create(ann, &post(1, &"x".repeat(1001))).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.create(ann, &post(1, "   ")).await,
            Err(AppError::Validation(_))
        ));

        let comment = service.create(ann, &post(1, "ok")).await.unwrap();
        let missing = UpdateCommentRequest { content: None };
        assert!(matches!(
            service.update(&comment.id, ann, &missing).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn non_owners_see_not_found() {
        let (service, ann, ben) = service().await;
        let comment = service.create(ann, &post(1, "mine")).await.unwrap();
        let edit = UpdateCommentRequest {
            content: Some("hijacked".to_string()),
        };

        assert!(matches!(
            service.update(&comment.id, ben, &edit).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(&comment.id, ben).await,
            Err(AppError::NotFound(_))
        ));

        let edited = service
            .update(
                &comment.id,
                ann,
                &UpdateCommentRequest {
                    content: Some(" edited ".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.content, "edited");
        service.delete(&comment.id, ann).await.unwrap();
        assert!(service.comments_for_game(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected() {
        let (service, ann, _) = service().await;
        assert!(matches!(
            service.delete("not-an-object-id", ann).await,
            Err(AppError::Validation(_))
        ));
    }
}
