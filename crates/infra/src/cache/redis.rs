//! Redis-backed cache, enabled with the `redis` feature.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{Cache, CacheError};

/// Cache over a multiplexed Redis connection.
///
/// The connection handle is cheap to clone; commands from concurrent tasks
/// interleave over the single underlying connection.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    /// Connects to `redis_url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Backend(format!("invalid redis url: {e}")))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(format!("redis connection failed: {e}")))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        conn.get(key)
            .await
            .map_err(|e| CacheError::Backend(format!("redis GET failed: {e}")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        // SETEX takes whole seconds; sub-second TTLs round up to 1.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex(key, value, seconds)
            .await
            .map_err(|e| CacheError::Backend(format!("redis SETEX failed: {e}")))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn
            .keys(format!("{prefix}*"))
            .await
            .map_err(|e| CacheError::Backend(format!("redis KEYS failed: {e}")))?;

        if keys.is_empty() {
            return Ok(0);
        }

        conn.del(keys)
            .await
            .map_err(|e| CacheError::Backend(format!("redis DEL failed: {e}")))
    }
}
