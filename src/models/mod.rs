// Domain records and API payloads shared by services, stores and handlers

pub mod engagement;
pub mod game;
pub mod graph_models;
pub mod user;

pub use engagement::{
    Comment, CommentRequest, NewComment, Rating, RatingRequest, RatingWithUser, UpdateCommentRequest,
    UserGameList, UserGameRequest,
};
pub use game::{Game, GameChanges, GameMode, GameSummary, NewGame, UpsertGameRequest};
pub use graph_models::{GameNode, RelatedGame};
pub use user::{AuthResponse, LoginRequest, NewUser, RegisterRequest, Role, User, UserProfile};

pub type UserId = i64;
pub type GameId = i64;
pub type RatingId = i64;
