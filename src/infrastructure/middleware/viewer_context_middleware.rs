// Builds the request-scoped ViewerContext from the bearer token and injects it
// into request extensions. Access decisions are left to the extractors.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::infrastructure::security::SecurityService;
use crate::infrastructure::viewer::viewer::ViewerContext;

/// Application state that can verify identity tokens.
pub trait HasSecurityService {
    fn security(&self) -> &SecurityService;
}

pub async fn viewer_context_middleware<T>(
    State(app_state): State<T>,
    mut request: Request,
    next: Next,
) -> Response
where
    T: HasSecurityService + Clone + Send + Sync + 'static,
{
    let viewer_context = create_viewer_context(request.headers(), app_state.security());
    request.extensions_mut().insert(Arc::new(viewer_context));
    next.run(request).await
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn create_viewer_context(headers: &HeaderMap, security: &SecurityService) -> ViewerContext {
    let request_id = format!("req-{}", Uuid::new_v4());

    match bearer_token(headers).map(|token| security.validate_token(token)) {
        Some(Ok(claims)) => ViewerContext::authenticated(request_id, claims.user_id, claims.role),
        Some(Err(e)) => {
            debug!(request_id = %request_id, "Ignoring unverifiable bearer token: {}", e);
            ViewerContext::anonymous(request_id)
        }
        None => ViewerContext::anonymous(request_id),
    }
}
