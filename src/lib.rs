// Game catalogue and review service

// HTTP surface: router, handlers and extractors
pub mod api;

// Dependency-injected store handles and services
pub mod app_state;

// Environment-driven configuration
pub mod config;

// Store backends, security primitives and request middleware
pub mod infrastructure;

// Domain records and request/response payloads
pub mod models;

// Business rules per functional area
pub mod services;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use app_state::AppState;
pub use error::{AppError, AppResult};
