use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub documents: DocumentConfig,
    pub graph: GraphConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub consistency: ConsistencyConfig,
    pub startup: StartupConfig,
    pub admin: Option<AdminBootstrap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Unset selects the in-process cache.
    pub redis_url: Option<String>,
    pub ttl_secs: u64,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Unset selects the in-process document store.
    pub mongodb_uri: Option<String>,
    pub database_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Unset selects the in-process graph.
    pub uri: Option<String>,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
    pub auth_max_requests: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    pub purge_orphaned_documents: bool,
    pub decay_related_weights: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupConfig {
    pub connect_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3001,
                frontend_url: "http://localhost:3000".to_string(),
                max_body_bytes: 10 * 1024 * 1024,
            },
            cache: CacheConfig {
                redis_url: None,
                ttl_secs: 300,
                capacity: 1000,
            },
            documents: DocumentConfig {
                mongodb_uri: None,
                database_name: "gameplatform".to_string(),
            },
            graph: GraphConfig {
                uri: None,
                user: "neo4j".to_string(),
                password: String::new(),
            },
            security: SecurityConfig {
                jwt_secret: "local-development-secret".to_string(),
                token_ttl_secs: 7 * 24 * 3600,
                argon2_memory_kib: 19 * 1024,
                argon2_iterations: 2,
            },
            rate_limit: RateLimitConfig {
                window_secs: 15 * 60,
                max_requests: 500,
                auth_max_requests: 10,
            },
            consistency: ConsistencyConfig::default(),
            startup: StartupConfig {
                connect_retries: 10,
                retry_delay_ms: 2000,
            },
            admin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let admin = match (optional("ADMIN_EMAIL"), optional("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap {
                email,
                password,
                name: optional("ADMIN_NAME").unwrap_or_else(|| "Admin".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:game_platform.db".to_string()),
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 20)?,
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("SERVER_PORT", 3001)?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or(defaults.server.frontend_url),
                max_body_bytes: parsed("MAX_BODY_BYTES", defaults.server.max_body_bytes)?,
            },
            cache: CacheConfig {
                redis_url: optional("REDIS_URL"),
                ttl_secs: parsed("CACHE_TTL_SECS", defaults.cache.ttl_secs)?,
                capacity: parsed("CACHE_CAPACITY", defaults.cache.capacity)?,
            },
            documents: DocumentConfig {
                mongodb_uri: optional("MONGODB_URI"),
                database_name: env::var("MONGODB_DATABASE")
                    .unwrap_or(defaults.documents.database_name),
            },
            graph: GraphConfig {
                uri: optional("NEO4J_URI"),
                user: env::var("NEO4J_USER").unwrap_or(defaults.graph.user),
                password: env::var("NEO4J_PASSWORD").unwrap_or_default(),
            },
            security: SecurityConfig {
                jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
                token_ttl_secs: parsed("TOKEN_TTL_SECS", defaults.security.token_ttl_secs)?,
                argon2_memory_kib: defaults.security.argon2_memory_kib,
                argon2_iterations: defaults.security.argon2_iterations,
            },
            rate_limit: RateLimitConfig {
                window_secs: parsed("RATE_LIMIT_WINDOW_SECS", defaults.rate_limit.window_secs)?,
                max_requests: parsed("RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit.max_requests)?,
                auth_max_requests: parsed(
                    "AUTH_RATE_LIMIT_MAX_REQUESTS",
                    defaults.rate_limit.auth_max_requests,
                )?,
            },
            consistency: ConsistencyConfig {
                purge_orphaned_documents: parsed("PURGE_ORPHANED_DOCUMENTS", false)?,
                decay_related_weights: parsed("DECAY_RELATED_WEIGHTS", false)?,
            },
            startup: StartupConfig {
                connect_retries: parsed("CONNECT_RETRIES", defaults.startup.connect_retries)?,
                retry_delay_ms: parsed("CONNECT_RETRY_DELAY_MS", defaults.startup.retry_delay_ms)?,
            },
            admin,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.startup.retry_delay_ms)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_fully_in_process() {
        let config = Config::default();
        assert!(config.cache.redis_url.is_none());
        assert!(config.documents.mongodb_uri.is_none());
        assert!(config.graph.uri.is_none());
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.security.token_ttl_secs, 604_800);
    }

    #[test]
    fn parsed_falls_back_when_unset() {
        let value: u32 = parsed("GAME_PLATFORM_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
