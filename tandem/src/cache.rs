//! TTL'd in-memory caches for model info and IDE mappings.
//!
//! Best-effort-consistent: entries expire lazily on read. Eviction callbacks
//! are synchronous and must not call back into the owning component.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache error: {0}")]
    Other(String),
}

/// Eviction callback, invoked synchronously when an entry is deleted or expires.
pub type EvictFn<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

/// Key-value cache with optional TTL.
#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Clone + Send + Sync,
{
    /// Returns the value for `key`, or `None` when missing or expired.
    async fn get(&self, key: &K) -> Option<V>;

    /// Stores a value. `ttl: None` never expires.
    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn delete(&self, key: &K) -> Result<(), CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory TTL cache with optional eviction callback.
pub struct InMemoryCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    on_evict: Option<EvictFn<K, V>>,
}

impl<K, V> InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            on_evict: None,
        }
    }

    /// Registers an eviction callback fired when entries expire or are deleted.
    pub fn with_evict_callback(on_evict: EvictFn<K, V>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            on_evict: Some(on_evict),
        }
    }

    fn notify_evict(&self, key: &K, value: &V) {
        if let Some(cb) = &self.on_evict {
            cb(key, value);
        }
    }
}

impl<K, V> Default for InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(e) if !e.expired() => return Some(e.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: remove under the write lock and notify.
        let mut entries = self.entries.write().await;
        if let Some(e) = entries.get(key) {
            if e.expired() {
                if let Some(e) = entries.remove(key) {
                    self.notify_evict(key, &e.value);
                }
                return None;
            }
            return Some(e.value.clone());
        }
        None
    }

    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.entries.write().await.insert(key, entry);
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), CacheError> {
        if let Some(e) = self.entries.write().await.remove(key) {
            self.notify_evict(key, &e.value);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn set_get_roundtrip() {
        let cache = InMemoryCache::new();
        cache.set("k".to_string(), 7u32, None).await.unwrap();
        assert_eq!(cache.get(&"k".to_string()).await, Some(7));
    }

    #[tokio::test]
    async fn expired_entry_is_gone_and_evicted() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = evictions.clone();
        let cache: InMemoryCache<String, u32> =
            InMemoryCache::with_evict_callback(Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        cache
            .set("k".to_string(), 1, Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get(&"k".to_string()).await, None);
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_fires_eviction_once() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = evictions.clone();
        let cache: InMemoryCache<String, u32> =
            InMemoryCache::with_evict_callback(Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        cache.set("k".to_string(), 1, None).await.unwrap();
        cache.delete(&"k".to_string()).await.unwrap();
        cache.delete(&"k".to_string()).await.unwrap();
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }
}
