//! Redis-backed cache for durability across process restarts.

use nearcast_core::cache::{Cache, CacheError, CacheInfo};
use redis::AsyncCommands;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default time-to-live for Redis entries. Long on purpose: the shared cache
/// is what lets a restarted pipeline keep answering from cache instead of
/// re-calling the generator.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Redis cache backend.
///
/// Uses one multiplexed connection per operation via the client's connection
/// manager; expiry is delegated to Redis (`SET ... EX`), so unlike the
/// in-memory backend there are never stale keys to sweep and
/// `total_keys == active_keys`.
pub struct RedisCache {
    client: redis::Client,
    default_ttl: Duration,
}

impl RedisCache {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379/0`).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the URL is invalid.
    pub fn new(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            default_ttl: DEFAULT_TTL,
        })
    }

    /// Override the default TTL.
    #[must_use]
    pub const fn with_default_ttl(mut self, default_ttl: Duration) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    /// The TTL applied when callers have no more specific policy.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}

impl Cache for RedisCache {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let value: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(value)
        })
    }

    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let ttl_secs = ttl.as_secs().max(1);
            let _: () = conn
                .set_ex(&key, value, ttl_secs)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(())
        })
    }

    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let removed: u64 = conn
                .del(&key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(removed > 0)
        })
    }

    fn exists(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let exists: bool = conn
                .exists(&key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(exists)
        })
    }

    fn info(&self) -> Pin<Box<dyn Future<Output = Result<CacheInfo, CacheError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let total: usize = redis::cmd("DBSIZE")
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(CacheInfo {
                status: "redis",
                total_keys: total,
                active_keys: total,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(
            RedisCache::new("not a url"),
            Err(CacheError::Backend(_))
        ));
    }

    #[test]
    fn default_ttl_is_a_day() {
        let cache = RedisCache::new("redis://localhost:6379/0");
        if let Ok(cache) = cache {
            assert_eq!(cache.default_ttl(), Duration::from_secs(86_400));
        }
    }
}
