//! In-process cache with per-entry expiry.

use nearcast_core::cache::{Cache, CacheError, CacheInfo};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default time-to-live for entries stored without an explicit TTL source.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache backend.
///
/// Expiry is lazy: entries past their deadline are only removed when a read
/// touches them, so `total_keys` can exceed `active_keys` between reads.
/// All operations are synchronous under a single mutex; the async trait
/// surface exists only so the backend is substitutable with [`RedisCache`]
/// (crate::RedisCache).
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl MemoryCache {
    /// Create a cache with the standard default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Create a cache with a custom default TTL.
    #[must_use]
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// The TTL applied when callers have no more specific policy.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_sync(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(key);
                None
            },
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.get_sync(&key)) })
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
            let entry = Entry {
                value,
                expires_at: Instant::now() + ttl,
            };
            self.lock().insert(key, entry);
            Ok(())
        })
    }

    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let removed = self.lock().remove(&key);
            Ok(matches!(removed, Some(entry) if !entry.is_expired(Instant::now())))
        })
    }

    fn exists(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.get_sync(&key).is_some()) })
    }

    fn info(&self) -> Pin<Box<dyn Future<Output = Result<CacheInfo, CacheError>> + Send + '_>> {
        Box::pin(async move {
            let entries = self.lock();
            let now = Instant::now();
            let active = entries.values().filter(|e| !e.is_expired(now)).count();
            Ok(CacheInfo {
                status: "in-memory",
                total_keys: entries.len(),
                active_keys: active,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_millis(40)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_live_entry() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();

        assert!(cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
        // Deleting again reports nothing was there.
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn info_distinguishes_active_from_total() {
        let cache = MemoryCache::new();
        cache.set("live", "v", Duration::from_secs(60)).await.unwrap();
        cache.set("dead", "v", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let info = cache.info().await.unwrap();
        assert_eq!(info.status, "in-memory");
        assert_eq!(info.total_keys, 2);
        assert_eq!(info.active_keys, 1);
    }
}
