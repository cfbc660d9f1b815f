//! Read-through caching layer used by [`crate::registry::Registry`].
//!
//! The registry caches entries it has already loaded from storage, and the
//! search/facet layer caches recent query results. Both use the same
//! [`CacheStore`] trait so the backend can be swapped (in-memory today;
//! a distributed backend is a drop-in implementation of the trait).
//!
//! | Data type | Cache key | TTL | Invalidation |
//! |-----------|-----------|-----|--------------|
//! | Entry by id | `entry:{id}` | 30min | On update/delete |
//! | Search results | `search:{query_hash}` | 2min | On any write |
//! | Dependency closure | `deps:{id}` | 5min | On update/delete |

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::Result;

/// Configuration for cache TTLs and behavior.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for cached entries.
    pub entry_ttl: Duration,
    /// TTL for cached search results.
    pub search_ttl: Duration,
    /// TTL for cached dependency closures.
    pub dependency_ttl: Duration,
    /// Maximum entries in the in-memory cache (0 = unlimited), bounded by
    /// `RegistryConfig::max_cache_entries` per spec §5.
    pub max_entries: usize,
    /// Enable cache statistics tracking.
    pub track_stats: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(1800),
            search_ttl: Duration::from_secs(120),
            dependency_ttl: Duration::from_secs(300),
            max_entries: 100_000,
            track_stats: true,
        }
    }
}

/// Cache key helpers.
pub mod keys {
    /// Cache key for an entry by id.
    pub fn entry(id: &str) -> String {
        format!("entry:{id}")
    }

    /// Cache key for a search result set, keyed by a hash of the request.
    pub fn search(query_hash: &str) -> String {
        format!("search:{query_hash}")
    }

    /// Cache key for a resolved dependency closure.
    pub fn dependencies(id: &str) -> String {
        format!("deps:{id}")
    }

    /// Pattern matching every cached search result (invalidated on any write).
    pub fn search_pattern() -> String {
        "search:*".to_string()
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total cache hits.
    pub hits: u64,
    /// Total cache misses.
    pub misses: u64,
    /// Entries currently cached.
    pub entries: u64,
    /// Approximate bytes stored.
    pub bytes: u64,
    /// Entries evicted for capacity.
    pub evictions: u64,
    /// Entries removed due to TTL expiration.
    pub expirations: u64,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Abstract cache store interface.
///
/// Implementations must be thread-safe and treat every operation as
/// fallible so a remote backend can report connectivity errors without
/// changing the trait shape.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a cached value by key. Returns `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Set a cached value with an optional TTL (`None` never expires).
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;
    /// Delete a cached value; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Delete all keys matching a `*`-glob pattern; returns count deleted.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;
    /// Check whether a key exists and is not expired.
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Snapshot of cache statistics.
    async fn stats(&self) -> Result<CacheStats>;
    /// Drop every cached entry.
    async fn clear(&self) -> Result<()>;
}

/// Get a typed value from cache (deserialized from JSON).
pub async fn cache_get_json<T: DeserializeOwned>(
    cache: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>> {
    match cache.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Set a typed value in cache (serialized to JSON).
pub async fn cache_set_json<T: Serialize>(
    cache: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    cache.set(key, &bytes, ttl).await
}

struct CacheEntry {
    data: Vec<u8>,
    created_at: Instant,
    ttl: Option<Duration>,
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }
}

/// In-memory cache store with TTL expiration and LRU eviction over capacity.
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    stats: RwLock<CacheStats>,
}

impl InMemoryCacheStore {
    /// Create a new in-memory cache store.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Create with default configuration.
    pub fn default_config() -> Self {
        Self::new(CacheConfig::default())
    }

    async fn maybe_evict(&self) {
        let mut entries = self.entries.write().await;
        let mut stats = self.stats.write().await;

        let before_count = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        stats.expirations += (before_count - entries.len()) as u64;

        if self.config.max_entries > 0 && entries.len() > self.config.max_entries {
            let to_evict = entries.len() - self.config.max_entries;
            let mut by_access: Vec<_> = entries
                .iter()
                .map(|(k, v)| (k.clone(), v.last_accessed))
                .collect();
            by_access.sort_by_key(|(_, accessed)| *accessed);
            for (key, _) in by_access.into_iter().take(to_evict) {
                entries.remove(&key);
                stats.evictions += 1;
            }
        }
    }

    fn pattern_matches(pattern: &str, key: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            return key.starts_with(prefix);
        }
        if let Some(suffix) = pattern.strip_prefix('*') {
            return key.ends_with(suffix);
        }
        pattern == key
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(key) {
            if entry.is_expired() {
                entries.remove(key);
                if self.config.track_stats {
                    let mut stats = self.stats.write().await;
                    stats.misses += 1;
                    stats.expirations += 1;
                }
                return Ok(None);
            }
            entry.last_accessed = Instant::now();
            if self.config.track_stats {
                self.stats.write().await.hits += 1;
            }
            return Ok(Some(entry.data.clone()));
        }

        if self.config.track_stats {
            self.stats.write().await.misses += 1;
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.maybe_evict().await;

        let now = Instant::now();
        let entry = CacheEntry {
            data: value.to_vec(),
            created_at: now,
            ttl,
            last_accessed: now,
        };

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);

        if self.config.track_stats {
            let mut stats = self.stats.write().await;
            stats.entries = entries.len() as u64;
            stats.bytes = entries.values().map(|e| e.data.len() as u64).sum();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let existed = entries.remove(key).is_some();
        if self.config.track_stats && existed {
            let mut stats = self.stats.write().await;
            stats.entries = entries.len() as u64;
            stats.bytes = entries.values().map(|e| e.data.len() as u64).sum();
        }
        Ok(existed)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let keys_to_delete: Vec<_> = entries
            .keys()
            .filter(|k| Self::pattern_matches(pattern, k))
            .cloned()
            .collect();

        let count = keys_to_delete.len();
        for key in keys_to_delete {
            entries.remove(&key);
        }

        if self.config.track_stats && count > 0 {
            let mut stats = self.stats.write().await;
            stats.entries = entries.len() as u64;
            stats.bytes = entries.values().map(|e| e.data.len() as u64).sum();
        }
        Ok(count)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|e| !e.is_expired()))
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(self.stats.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        if self.config.track_stats {
            let mut stats = self.stats.write().await;
            stats.entries = 0;
            stats.bytes = 0;
        }
        Ok(())
    }
}

/// A cache store that does nothing (always misses). Useful when caching
/// should be disabled entirely.
pub struct NoOpCacheStore;

#[async_trait]
impl CacheStore for NoOpCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }
    async fn delete_pattern(&self, _pattern: &str) -> Result<usize> {
        Ok(0)
    }
    async fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }
    async fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats::default())
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = InMemoryCacheStore::default_config();
        cache.set("entry:a", b"hello", None).await.unwrap();
        assert_eq!(cache.get("entry:a").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_get() {
        let cache = InMemoryCacheStore::new(CacheConfig {
            entry_ttl: Duration::from_millis(1),
            ..CacheConfig::default()
        });
        cache
            .set("entry:a", b"hello", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get("entry:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_pattern_removes_matching_keys() {
        let cache = InMemoryCacheStore::default_config();
        cache.set("search:aaa", b"1", None).await.unwrap();
        cache.set("search:bbb", b"2", None).await.unwrap();
        cache.set("entry:c", b"3", None).await.unwrap();

        let deleted = cache.delete_pattern(&keys::search_pattern()).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(cache.get("entry:c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn hit_rate_tracks_gets() {
        let cache = InMemoryCacheStore::default_config();
        cache.set("entry:a", b"1", None).await.unwrap();
        let _ = cache.get("entry:a").await.unwrap();
        let _ = cache.get("entry:missing").await.unwrap();
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
