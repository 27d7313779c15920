// HTTP surface: route table and the layers wrapped around it

pub mod admin;
pub mod auth;
pub mod comments;
pub mod extract;
pub mod games;
pub mod health;
pub mod ratings;
pub mod user_games;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::app_state::AppState;
use crate::infrastructure::middleware::{rate_limit_middleware, viewer_context_middleware};

pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route_layer(middleware::from_fn_with_state(
            state.auth_limiter.clone(),
            rate_limit_middleware,
        ))
        .route("/me", get(auth::me));

    let game_routes = Router::new()
        .route("/", get(games::list_games))
        .route("/search/{query}", get(games::search_games))
        .route("/{id}", get(games::get_game))
        .route("/{id}/recommendations", get(games::recommendations));

    let rating_routes = Router::new()
        .route("/", post(ratings::rate_game))
        .route("/game/{game_id}", get(ratings::ratings_for_game))
        .route("/game/{game_id}/user", get(ratings::my_rating))
        .route("/{id}", delete(ratings::delete_rating));

    let comment_routes = Router::new()
        .route("/", post(comments::create_comment))
        .route("/game/{game_id}", get(comments::comments_for_game))
        .route(
            "/{id}",
            put(comments::update_comment).delete(comments::delete_comment),
        );

    let user_game_routes = Router::new()
        .route("/my-list", get(user_games::my_list))
        .route("/add", post(user_games::add_game))
        .route("/remove", post(user_games::remove_game));

    let admin_routes = Router::new()
        .route("/games", post(admin::create_game))
        .route(
            "/games/{id}",
            put(admin::update_game).delete(admin::delete_game),
        );

    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/games", game_routes)
        .nest("/ratings", rating_routes)
        .nest("/comments", comment_routes)
        .nest("/user-games", user_game_routes)
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(
            state.api_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            viewer_context_middleware::<AppState>,
        ))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(cors_layer(&state.config.server.frontend_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Only the configured front end may call with credentials.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!("FRONTEND_URL is not a valid origin, cross-origin calls disabled: {}", e);
            cors
        }
    }
}
