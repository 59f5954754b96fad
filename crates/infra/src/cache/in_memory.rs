//! In-process cache for tests and single-node deployments.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{Cache, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// `RwLock<HashMap>` cache with lazy expiry: stale entries are dropped on
/// read, not swept in the background.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict under the write lock.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.to_owned(),
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_owned(), entry);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_within_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("perms:u1:t1", r#"["USER_READ"]"#, Duration::from_secs(300))
            .await
            .unwrap();

        let value = cache.get("perms:u1:t1").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"["USER_READ"]"#));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let cache = InMemoryCache::new();
        cache
            .set("blacklist:tok", "1", Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("blacklist:tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_prefix_removes_only_matching_keys() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("perms:u1:t1", "a", ttl).await.unwrap();
        cache.set("perms:u1:t2", "b", ttl).await.unwrap();
        cache.set("perms:u2:t1", "c", ttl).await.unwrap();

        let removed = cache.delete_prefix("perms:u1:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get("perms:u1:t1").await.unwrap().is_none());
        assert!(cache.get("perms:u2:t1").await.unwrap().is_some());
    }
}
