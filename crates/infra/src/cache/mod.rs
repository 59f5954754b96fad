//! Cache: read-through storage for resolved permission sets and the access
//! token blacklist.
//!
//! The cache is never authoritative. Callers treat every `CacheError` as a
//! miss and fall back to the relational store, so a broken cache degrades
//! latency, not correctness.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// String key/value cache with per-entry expiry and prefix deletion.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key` for `ttl`; overwrites any existing entry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete every key starting with `prefix`. Returns entries removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}
