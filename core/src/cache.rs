//! Key/value cache contract with per-entry expiry.
//!
//! Used by the notification stage to avoid redundant generation calls for
//! the same (user profile, place) pair. Two interchangeable backends exist
//! in the cache crate: an in-process map with lazy expiry and a Redis-backed
//! store with a longer default TTL for durability across restarts. The stage
//! only ever sees `Arc<dyn Cache>`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors from a cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backend was unreachable or the operation failed.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Summary of a cache backend's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    /// Backend identifier (e.g. `"in-memory"`, `"redis"`).
    pub status: &'static str,
    /// Total keys currently stored, expired entries included.
    pub total_keys: usize,
    /// Keys that have not yet expired.
    pub active_keys: usize,
}

/// Key/value store with per-entry TTL.
///
/// All operations are fallible: a transient backend failure must never take
/// the pipeline down, so callers treat errors as a miss (reads) or a no-op
/// (writes) and count the fallback.
pub trait Cache: Send + Sync {
    /// Look up a key. Expired entries read as absent.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the backend is unreachable.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>>;

    /// Store a value under a key with the given time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the backend is unreachable.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    /// Remove a key. Returns whether a live entry was removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the backend is unreachable.
    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, CacheError>> + Send + '_>>;

    /// Whether a live (unexpired) entry exists for the key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the backend is unreachable.
    fn exists(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, CacheError>> + Send + '_>>;

    /// Backend status and key counts.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the backend is unreachable.
    fn info(&self) -> Pin<Box<dyn Future<Output = Result<CacheInfo, CacheError>> + Send + '_>>;
}
