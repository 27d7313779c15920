// Store backends, security primitives and request plumbing
pub mod cache_layer;           // Catalogue read cache (Redis / in-process LRU)
pub mod database;              // PostgreSQL catalogue store
pub mod document_store;        // Comments and user lists (MongoDB / in-process)
pub mod graph_store;           // Recommendation graph (Neo4j / in-process)
pub mod middleware;            // Viewer context, extractors, rate limiting
pub mod monitoring;            // Tracing subscriber setup
pub mod projections;           // Post-commit projection updaters
mod rows;                      // Shared relational row shapes
pub mod security;              // Credential hashing and identity tokens
pub mod sqlite_database;       // SQLite catalogue store
pub mod traits;                // Store traits
pub mod viewer;                // Viewer context

pub use cache_layer::{game_key, MemoryCache, RedisCache, ALL_GAMES_KEY};
pub use database::PostgresCatalogStore;
pub use document_store::{MemoryDocumentStore, MongoDocumentStore};
pub use graph_store::{MemoryGraphStore, Neo4jGraphStore};
pub use monitoring::initialize_monitoring;
pub use projections::{
    CacheInvalidator, CatalogEvent, GraphProjector, OrphanedDocumentPurger, ProjectionRegistry,
    ProjectionUpdater,
};
pub use security::{Claims, SecurityService};
pub use sqlite_database::SqliteCatalogStore;
pub use traits::{CacheStore, CatalogStore, DocumentStore, GraphStore};
pub use viewer::{Identity, ViewerContext};
