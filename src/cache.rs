//! Persistent TTL cache for forecast and routing lookups.
//!
//! Entries are postcard-encoded and stored in a fjall keyspace. The cache is
//! process-global and optional: until [`init`] is called every lookup misses
//! and every store is dropped.

use anyhow::{Result, anyhow};
use fjall::Keyspace;
use serde::Deserialize;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tokio::task;

static GLOBAL_CACHE: OnceCell<PersistentCache> = OnceCell::const_new();

#[derive(Serialize, Deserialize)]
struct StoredEntry<T> {
    value: T,
    expires_at: u64, // Unix timestamp (seconds)
}

pub struct PersistentCache {
    store: Keyspace,
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
    Ok(store.get(key)?.map(|v| v.to_vec()))
}

impl PersistentCache {
    fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = fjall::Database::builder(&path).open()?;
        let items = db.keyspace("powder", fjall::KeyspaceCreateOptions::default)?;
        Ok(PersistentCache { store: items })
    }

    /// Stores a serializable value with a time-to-live (TTL).
    #[tracing::instrument(name = "put_cache", level = "debug", skip(self, value))]
    pub async fn put<T: Serialize + Send + Debug + 'static>(
        &self,
        key: &str,
        value: T,
        ttl: Duration,
    ) -> Result<()> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        let expires_at = SystemTime::now()
            .checked_add(ttl)
            .ok_or(anyhow!("TTL overflow"))?
            .duration_since(UNIX_EPOCH)?
            .as_secs();
        let entry = StoredEntry { value, expires_at };
        let bytes = postcard::to_stdvec(&entry)?;

        task::spawn_blocking(move || store.insert(key, bytes)).await??;
        Ok(())
    }

    /// Retrieves a value if it exists and has not expired.
    /// Returns `None` for cache misses, expired entries and entries that no
    /// longer decode into `T`.
    #[tracing::instrument(name = "query_cache", level = "debug", skip(self))]
    pub async fn get<T: DeserializeOwned + Send + 'static>(&self, key: &str) -> Result<Option<T>> {
        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();

        let maybe_bytes: Option<Vec<u8>> =
            task::spawn_blocking(move || get_from_store(store, key_bytes)).await??;

        let Some(bytes) = maybe_bytes else {
            tracing::debug!("Key not found");
            return Ok(None);
        };

        let entry: StoredEntry<T> = match postcard::from_bytes(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "Dropping undecodable entry");
                self.remove(key).await?;
                return Ok(None);
            }
        };
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        if now < entry.expires_at {
            tracing::debug!("Key found and still fresh");
            Ok(Some(entry.value))
        } else {
            tracing::debug!("Key found but expired");
            self.remove(key).await?;
            Ok(None)
        }
    }

    /// Manually removes a key from the cache.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let key = key.as_bytes().to_vec();
        let store = self.store.clone();
        task::spawn_blocking(move || store.remove(key)).await??;
        Ok(())
    }
}

/// Initializes the global persistent cache.
pub fn init(path: impl AsRef<Path>) -> Result<()> {
    let cache = PersistentCache::new(path)?;
    GLOBAL_CACHE
        .set(cache)
        .map_err(|_| anyhow!("Cache already initialized"))?;
    Ok(())
}

/// Whether [`init`] has run in this process.
#[must_use]
pub fn is_enabled() -> bool {
    GLOBAL_CACHE.initialized()
}

pub async fn put<T: Serialize + Send + Debug + 'static>(key: &str, value: T, ttl: Duration) -> Result<()> {
    match GLOBAL_CACHE.get() {
        Some(cache) => cache.put(key, value, ttl).await,
        None => Ok(()),
    }
}

pub async fn get<T: DeserializeOwned + Send + 'static>(key: &str) -> Result<Option<T>> {
    match GLOBAL_CACHE.get() {
        Some(cache) => cache.get(key).await,
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get_returns_fresh_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path()).unwrap();

        cache
            .put("route:a-b", 5400u64, Duration::from_secs(3600))
            .await
            .unwrap();
        let value: Option<u64> = cache.get("route:a-b").await.unwrap();
        assert_eq!(value, Some(5400));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::new(dir.path()).unwrap();

        cache
            .put("weather:44.53:-72.79:2025-01-15", 1.5f64, Duration::ZERO)
            .await
            .unwrap();
        let value: Option<f64> = cache.get("weather:44.53:-72.79:2025-01-15").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_uninitialized_global_cache_misses() {
        let value: Option<String> = get("never-initialized").await.unwrap();
        assert!(value.is_none());
        put("never-initialized", "x".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
    }
}
