// One service per functional area, each a cheap-to-clone handle over the stores

pub mod auth_service;
pub mod catalog_service;
pub mod comment_service;
pub mod rating_service;
pub mod recommendation_service;
pub mod user_list_service;
pub mod validation;

pub use auth_service::AuthService;
pub use catalog_service::CatalogService;
pub use comment_service::CommentService;
pub use rating_service::RatingService;
pub use recommendation_service::{RecommendationService, RECOMMENDATION_LIMIT};
pub use user_list_service::UserListService;
