// Application state: store handles, services and limiters, built once at startup
// and cloned into every handler.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{Config, StartupConfig};
use crate::error::{AppError, AppResult};
use crate::infrastructure::middleware::{HasSecurityService, RateLimiter};
use crate::infrastructure::monitoring::ComponentHealth;
use crate::infrastructure::{
    CacheInvalidator, CacheStore, CatalogStore, DocumentStore, GraphProjector, GraphStore,
    MemoryCache, MemoryDocumentStore, MemoryGraphStore, MongoDocumentStore, Neo4jGraphStore,
    OrphanedDocumentPurger, PostgresCatalogStore, ProjectionRegistry, RedisCache,
    SecurityService, SqliteCatalogStore,
};
use crate::models::GameNode;
use crate::services::{
    AuthService, CatalogService, CommentService, RatingService, RecommendationService,
    UserListService,
};

/// The four backing stores, already connected.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub cache: Arc<dyn CacheStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub graph: Arc<dyn GraphStore>,
}

impl Stores {
    /// Connects every configured backend, falling back to in-process stores
    /// for the optional ones.
    pub async fn connect(config: &Config) -> AppResult<Self> {
        let startup = &config.startup;

        let catalog = connect_catalog(config).await?;

        let cache: Arc<dyn CacheStore> = match &config.cache.redis_url {
            Some(url) => Arc::new(with_retry("redis", startup, || RedisCache::connect(url)).await?),
            None => {
                info!("REDIS_URL not set, using in-process cache");
                Arc::new(MemoryCache::new(config.cache.capacity))
            }
        };

        let documents: Arc<dyn DocumentStore> = match &config.documents.mongodb_uri {
            Some(uri) => Arc::new(
                with_retry("mongodb", startup, || {
                    MongoDocumentStore::connect(uri, &config.documents.database_name)
                })
                .await?,
            ),
            None => {
                info!("MONGODB_URI not set, using in-process document store");
                Arc::new(MemoryDocumentStore::new())
            }
        };

        let graph: Arc<dyn GraphStore> = match &config.graph.uri {
            Some(uri) => Arc::new(
                with_retry("neo4j", startup, || {
                    Neo4jGraphStore::connect(uri, &config.graph.user, &config.graph.password)
                })
                .await?,
            ),
            None => {
                info!("NEO4J_URI not set, using in-process graph");
                Arc::new(MemoryGraphStore::new())
            }
        };

        Ok(Self {
            catalog,
            cache,
            documents,
            graph,
        })
    }
}

async fn connect_catalog(config: &Config) -> AppResult<Arc<dyn CatalogStore>> {
    let url = config.database.url.as_str();
    let max_connections = config.database.max_connections;
    let startup = &config.startup;

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let store = with_retry("postgres", startup, || {
            PostgresCatalogStore::connect(url, max_connections)
        })
        .await?;
        Ok(Arc::new(store))
    } else if url.starts_with("sqlite:") {
        let store = with_retry("sqlite", startup, || {
            SqliteCatalogStore::connect(url, max_connections)
        })
        .await?;
        Ok(Arc::new(store))
    } else {
        Err(AppError::ConfigurationError(
            "DATABASE_URL must start with postgres://, postgresql:// or sqlite:".to_string(),
        ))
    }
}

/// Retries `attempt` with a fixed delay; the last failure is returned.
async fn with_retry<T, F, Fut>(store: &str, startup: &StartupConfig, mut attempt: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let attempts = startup.connect_retries.max(1);
    let delay = Duration::from_millis(startup.retry_delay_ms);

    for n in 1..=attempts {
        match attempt().await {
            Ok(connected) => return Ok(connected),
            Err(e) if n < attempts => {
                warn!(store, attempt = n, attempts, error = %e, "Connection failed, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(store, attempts, error = %e, "Giving up on connection");
                return Err(e);
            }
        }
    }
    Err(AppError::ConfigurationError(format!(
        "No connection attempts made for {}",
        store
    )))
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Stores,
    pub security: Arc<SecurityService>,
    pub projections: Arc<ProjectionRegistry>,
    pub catalog: CatalogService,
    pub auth: AuthService,
    pub ratings: RatingService,
    pub recommendations: RecommendationService,
    pub comments: CommentService,
    pub user_lists: UserListService,
    pub api_limiter: Arc<RateLimiter>,
    pub auth_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Connects the stores, prepares their schemas and bootstraps the admin.
    pub async fn connect(config: Config) -> AppResult<Self> {
        let stores = Stores::connect(&config).await?;
        let state = Self::from_stores(config, stores)?;
        state.prepare().await?;
        Ok(state)
    }

    pub fn from_stores(config: Config, stores: Stores) -> AppResult<Self> {
        let security = Arc::new(SecurityService::new(&config.security)?);
        let projections = Arc::new(projection_registry(&config, &stores));

        let window = Duration::from_secs(config.rate_limit.window_secs);
        let api_limiter = Arc::new(RateLimiter::new("api", config.rate_limit.max_requests, window));
        let auth_limiter = Arc::new(RateLimiter::new(
            "auth",
            config.rate_limit.auth_max_requests,
            window,
        ));

        Ok(Self {
            catalog: CatalogService::new(
                stores.catalog.clone(),
                stores.cache.clone(),
                projections.clone(),
                config.cache_ttl(),
            ),
            auth: AuthService::new(stores.catalog.clone(), security.clone()),
            ratings: RatingService::new(stores.catalog.clone(), projections.clone()),
            recommendations: RecommendationService::new(
                stores.catalog.clone(),
                stores.graph.clone(),
            ),
            comments: CommentService::new(stores.catalog.clone(), stores.documents.clone()),
            user_lists: UserListService::new(stores.documents.clone()),
            config: Arc::new(config),
            stores,
            security,
            projections,
            api_limiter,
            auth_limiter,
        })
    }

    async fn prepare(&self) -> AppResult<()> {
        self.stores.catalog.migrate().await?;
        info!("Relational schema ready");

        if let Err(e) = self.stores.graph.ensure_constraints().await {
            warn!(error = %e, "Could not ensure graph constraints");
        }
        self.resync_graph().await?;

        if let Some(admin) = &self.config.admin {
            self.auth.bootstrap_admin(admin).await?;
        }
        Ok(())
    }

    /// Re-projects every game node into the graph, one game at a time.
    async fn resync_graph(&self) -> AppResult<()> {
        let games = self.stores.catalog.list_games().await?;
        let mut failed = 0usize;
        for summary in &games {
            if let Err(e) = self
                .stores
                .graph
                .upsert_game(&GameNode::from(&summary.game))
                .await
            {
                failed += 1;
                warn!(game_id = summary.game.id, error = %e, "Graph resync failed for game");
            }
        }
        info!(games = games.len(), failed, "Graph nodes resynced");
        Ok(())
    }

    pub async fn component_health(&self) -> BTreeMap<&'static str, ComponentHealth> {
        let mut components = BTreeMap::new();

        let started = Instant::now();
        let result = self.stores.catalog.health_check().await;
        components.insert("database", ComponentHealth::from_probe(result, started));

        let started = Instant::now();
        let result = self.stores.cache.health_check().await;
        components.insert("cache", ComponentHealth::from_probe(result, started));

        let started = Instant::now();
        let result = self.stores.documents.health_check().await;
        components.insert("documents", ComponentHealth::from_probe(result, started));

        let started = Instant::now();
        let result = self.stores.graph.health_check().await;
        components.insert("graph", ComponentHealth::from_probe(result, started));

        components
    }

    pub async fn shutdown(&self) {
        self.stores.catalog.close().await;
        self.stores.documents.close().await;
        info!("Store connections closed");
    }
}

impl HasSecurityService for AppState {
    fn security(&self) -> &SecurityService {
        &self.security
    }
}

fn projection_registry(config: &Config, stores: &Stores) -> ProjectionRegistry {
    let mut registry = ProjectionRegistry::new();
    registry.register(Box::new(CacheInvalidator::new(stores.cache.clone())));
    registry.register(Box::new(GraphProjector::new(
        stores.graph.clone(),
        config.consistency.decay_related_weights,
    )));
    if config.consistency.purge_orphaned_documents {
        registry.register(Box::new(OrphanedDocumentPurger::new(
            stores.documents.clone(),
        )));
    }
    registry
}
