//! TTL caches for resolver lookups

use super::singleflight::Singleflight;
use crate::error::Result;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default cache TTL (60 seconds)
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false, every lookup goes to the store (single-flight still applies)
    pub enabled: bool,

    /// Time-to-live for cached entries
    pub ttl: Duration,

    /// Maximum number of entries per cache
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// Pass-through configuration: nothing is ever stored
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Statistics about cache performance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: usize,
    /// Number of cache misses
    pub misses: usize,
    /// Number of expired entries encountered
    pub expirations: usize,
    /// Number of entries removed by invalidation
    pub invalidations: usize,
    /// Total number of entries in cache
    pub entries: usize,
}

impl CacheStats {
    /// Calculates the cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe TTL cache
pub struct TtlCache<K, V>
where
    K: Hash + Eq,
{
    entries: Arc<DashMap<K, CacheEntry<V>>>,
    config: CacheConfig,
    stats: Arc<DashMap<&'static str, usize>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
            stats: Arc::new(DashMap::new()),
        }
    }

    /// Get a cached value if present and not expired
    pub fn get(&self, key: &K) -> Option<V> {
        if !self.config.enabled {
            return None;
        }

        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(self.config.ttl) {
                drop(entry);
                self.entries.remove(key);
                self.increment_stat("expirations");
                self.increment_stat("misses");
                return None;
            }

            self.increment_stat("hits");
            return Some(entry.value.clone());
        }

        self.increment_stat("misses");
        None
    }

    /// Store a value
    pub fn insert(&self, key: K, value: V) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }

        if self.entries.len() >= self.config.max_entries {
            self.evict();
        }

        self.entries.insert(key, CacheEntry::new(value));
    }

    /// Remove every entry whose key matches; returns the number removed
    pub fn remove_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.add_stat("invalidations", removed);
        }
        removed
    }

    /// Clear the entire cache
    pub fn clear(&self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.add_stat("invalidations", removed);
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            invalidations: self.get_stat("invalidations"),
            entries: self.entries.len(),
        }
    }

    /// Drop expired entries, then up to 10% of the rest if still full
    fn evict(&self) {
        let ttl = self.config.ttl;
        self.entries.retain(|_, entry| !entry.is_expired(ttl));

        if self.entries.len() < self.config.max_entries {
            return;
        }

        let to_remove = (self.config.max_entries / 10).max(1);
        let mut removed = 0;
        self.entries.retain(|_, _| {
            if removed < to_remove {
                removed += 1;
                false
            } else {
                true
            }
        });
    }

    fn increment_stat(&self, key: &'static str) {
        self.add_stat(key, 1);
    }

    fn add_stat(&self, key: &'static str, count: usize) {
        self.stats
            .entry(key)
            .and_modify(|total| *total += count)
            .or_insert(count);
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// TTL cache fronted by a singleflight
///
/// Invalidation first forgets matching in-flight lookups, then removes
/// matching entries. A leader publishes under its in-flight entry lock, so it
/// either publishes before the forget (and the removal then clears it) or is
/// no longer registered and does not publish at all.
pub struct LookupCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    cache: TtlCache<K, V>,
    flights: Singleflight<K, V>,
}

impl<K, V> LookupCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache: TtlCache::new(config),
            flights: Singleflight::new(),
        }
    }

    /// Cached value for `key`, or the result of one shared `load`
    pub async fn get_or_load<F>(&self, key: K, load: F) -> Result<V>
    where
        F: FnOnce() -> BoxFuture<'static, Result<V>>,
    {
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }

        let cache = &self.cache;
        let publish_key = key.clone();
        self.flights
            .run(key, load, move |value| cache.insert(publish_key, value.clone()))
            .await
    }

    /// Invalidate every key matching the predicate
    pub fn invalidate_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        self.flights.forget(&predicate);
        self.cache.remove_where(&predicate)
    }

    /// Invalidate everything
    pub fn clear(&self) {
        self.flights.forget(|_| true);
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
