//! Shared cache tier
//!
//! Provides:
//! - `SharedCache`, the cross-process key-value interface (get / set-with-TTL / delete)
//! - `RedisCache`, a Redis implementation with key prefixing and a per-id
//!   dependency index kept in Redis sets
//! - `MemorySharedCache`, an in-process implementation for tests and single-node runs
//! - Deterministic cache key construction

pub mod keys;

pub use keys::CacheKeyBuilder;

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Cross-process cache. Values are opaque JSON strings.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Record that `key` was derived from each of `dependency_ids`
    async fn index_dependencies(&self, key: &str, dependency_ids: &[String], ttl: Duration)
        -> Result<()>;

    /// Keys recorded as derived from `dependency_id`
    async fn dependents_of(&self, dependency_id: &str) -> Result<Vec<String>>;

    /// Drop the dependency index of `dependency_id`
    async fn clear_dependents(&self, dependency_id: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

/// Redis-backed shared tier
pub struct RedisCache {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Connect to Redis
    pub async fn new(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(url).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
        })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    fn deps_key(&self, dependency_id: &str) -> String {
        format!("{}:deps:{}", self.key_prefix, dependency_id)
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn.get(&full_key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to get key '{}': {}", full_key, e),
        })?;

        debug!(key = %full_key, hit = value.is_some(), "Shared cache lookup");
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();

        conn.set_ex::<_, _, ()>(&full_key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set key '{}': {}", full_key, e),
            })?;

        debug!(key = %full_key, ttl_secs = ttl.as_secs(), "Shared cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();

        let deleted: i32 = conn.del(&full_key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to delete key '{}': {}", full_key, e),
        })?;

        debug!(key = %full_key, deleted = deleted > 0, "Shared cache delete");
        Ok(deleted > 0)
    }

    async fn index_dependencies(
        &self,
        key: &str,
        dependency_ids: &[String],
        ttl: Duration,
    ) -> Result<()> {
        if dependency_ids.is_empty() {
            return Ok(());
        }

        // Index sets outlive the entries they point at by one TTL at most
        let mut pipe = redis::pipe();
        for id in dependency_ids {
            let deps_key = self.deps_key(id);
            pipe.sadd(&deps_key, key).ignore();
            pipe.expire(&deps_key, ttl.as_secs().max(1) as i64).ignore();
        }

        let mut conn = self.connection.clone();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn dependents_of(&self, dependency_id: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.smembers(self.deps_key(dependency_id)).await?;
        Ok(keys)
    }

    async fn clear_dependents(&self, dependency_id: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(self.deps_key(dependency_id)).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

/// In-process shared tier
#[derive(Default)]
pub struct MemorySharedCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    dependents: RwLock<HashMap<String, HashSet<String>>>,
    offline: AtomicBool,
}

impl MemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `CacheError`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::CacheError {
                message: "shared cache is offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn index_dependencies(
        &self,
        key: &str,
        dependency_ids: &[String],
        _ttl: Duration,
    ) -> Result<()> {
        self.check()?;
        let mut dependents = self.dependents.write().await;
        for id in dependency_ids {
            dependents
                .entry(id.clone())
                .or_default()
                .insert(key.to_string());
        }
        Ok(())
    }

    async fn dependents_of(&self, dependency_id: &str) -> Result<Vec<String>> {
        self.check()?;
        let dependents = self.dependents.read().await;
        let mut keys: Vec<String> = dependents
            .get(dependency_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn clear_dependents(&self, dependency_id: &str) -> Result<()> {
        self.check()?;
        self.dependents.write().await.remove(dependency_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_ttl() {
        let cache = MemorySharedCache::new();
        cache
            .set_raw("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_raw("k").await.unwrap().as_deref(), Some("v"));

        tokio_test::assert_ok!(cache.set_raw("gone", "v", Duration::ZERO).await);
        assert_eq!(cache.get_raw("gone").await.unwrap(), None);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_cache_dependency_index() {
        let cache = MemorySharedCache::new();
        let ttl = Duration::from_secs(60);
        cache
            .index_dependencies("k1", &["a".to_string(), "b".to_string()], ttl)
            .await
            .unwrap();
        cache
            .index_dependencies("k2", &["b".to_string()], ttl)
            .await
            .unwrap();

        assert_eq!(cache.dependents_of("a").await.unwrap(), vec!["k1"]);
        assert_eq!(cache.dependents_of("b").await.unwrap(), vec!["k1", "k2"]);

        cache.clear_dependents("b").await.unwrap();
        assert!(cache.dependents_of("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_cache_offline() {
        let cache = MemorySharedCache::new();
        tokio_test::assert_ok!(cache.ping().await);

        cache.set_offline(true);
        let err = tokio_test::assert_err!(cache.get_raw("k").await);
        assert!(matches!(err, AppError::CacheError { .. }));
        tokio_test::assert_err!(cache.ping().await);
    }
}
