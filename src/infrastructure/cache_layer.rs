// Catalogue read cache: Redis when configured, a bounded in-process LRU otherwise.

use async_trait::async_trait;
use lru::LruCache;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::infrastructure::traits::CacheStore;
use crate::models::GameId;

/// Key holding the serialized full game listing.
pub const ALL_GAMES_KEY: &str = "games:all";

pub fn game_key(id: GameId) -> String {
    format!("games:{}", id)
}

/// Cached payload with its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: String,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(data: String, ttl: Duration) -> Self {
        Self {
            data,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// In-process cache used when no Redis URL is configured.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .put(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.lock().await.pop(key);
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}

pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid Redis URL: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to connect to Redis: {}", e)))?;

        info!("Connected to Redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get(key)
            .await
            .map_err(|e| AppError::CacheError(format!("GET {} failed: {}", key, e)))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| AppError::CacheError(format!("SETEX {} failed: {}", key, e)))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AppError::CacheError(format!("DEL {} failed: {}", key, e)))
    }

    async fn health_check(&self) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::CacheError(format!("PING failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new(8);
        cache
            .set_ex(ALL_GAMES_KEY, "[]", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(cache.get(ALL_GAMES_KEY).await.unwrap().as_deref(), Some("[]"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(ALL_GAMES_KEY).await.unwrap().is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let cache = MemoryCache::new(8);
        cache
            .set_ex(&game_key(3), "{}", Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete(&game_key(3)).await.unwrap();
        cache.delete("games:missing").await.unwrap();
        assert!(cache.get(&game_key(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recent() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set_ex("a", "1", ttl).await.unwrap();
        cache.set_ex("b", "2", ttl).await.unwrap();
        cache.get("a").await.unwrap();
        cache.set_ex("c", "3", ttl).await.unwrap();

        assert!(cache.get("b").await.unwrap().is_none());
        assert!(cache.get("a").await.unwrap().is_some());
        assert_eq!(game_key(12), "games:12");
    }
}
