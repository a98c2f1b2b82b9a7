//! # Nearcast Cache
//!
//! The two cache backends behind the [`Cache`](nearcast_core::cache::Cache)
//! contract from the core crate:
//!
//! - [`MemoryCache`] - in-process map with per-entry expiry instants and lazy
//!   expiry on read. Fast, but empty after every restart; suited to single
//!   instances and tests.
//! - [`RedisCache`] - shared Redis store with a 24-hour default TTL, so
//!   generated messages survive process restarts and are shared across
//!   pipeline instances.
//!
//! The notification stage only ever holds `Arc<dyn Cache>` and does not know
//! which backend it talks to.

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;
