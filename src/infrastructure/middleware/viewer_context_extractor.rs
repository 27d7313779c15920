// Handler-facing extractors over the ViewerContext placed by the middleware.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use crate::error::AppError;
use crate::infrastructure::viewer::viewer::{Identity, ViewerContext};

/// Thin `Arc<ViewerContext>` wrapper with reference-like access.
#[derive(Debug, Clone)]
pub struct Vc(Arc<ViewerContext>);

impl Vc {
    pub fn new(vc: Arc<ViewerContext>) -> Self {
        Self(vc)
    }
}

impl std::ops::Deref for Vc {
    type Target = ViewerContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Vc
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<ViewerContext>>()
            .map(|vc| Vc(vc.clone()))
            .ok_or_else(|| AppError::Internal("Viewer context middleware not installed".to_string()))
    }
}

/// Any authenticated caller; 401 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let vc = Vc::from_request_parts(parts, state).await?;
        vc.identity
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// Authenticated caller holding the admin role; 401 or 403 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Identity);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use axum::http::Request;

    fn parts_with(vc: Option<ViewerContext>) -> Parts {
        let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        if let Some(vc) = vc {
            parts.extensions.insert(Arc::new(vc));
        }
        parts
    }

    #[tokio::test]
    async fn anonymous_callers_are_unauthorized() {
        let mut parts = parts_with(Some(ViewerContext::anonymous("req-1".into())));
        let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn regular_users_are_not_admins() {
        let mut parts = parts_with(Some(ViewerContext::authenticated("req-2".into(), 3, Role::User)));
        let AuthUser(identity) = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(identity.user_id, 3);

        let err = AdminUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mut parts = parts_with(Some(ViewerContext::authenticated("req-3".into(), 1, Role::Admin)));
        assert!(AdminUser::from_request_parts(&mut parts, &()).await.is_ok());
    }

    #[tokio::test]
    async fn missing_middleware_is_an_internal_error() {
        let mut parts = parts_with(None);
        let err = Vc::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
