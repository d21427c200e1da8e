//! Bounded keyed cache with LRU eviction.
//!
//! Replaces the pattern of an unbounded map accumulating lookup results for
//! the lifetime of the process: capacity is fixed up front, the least
//! recently used entry is evicted when full, and the cache is owned by the
//! caller and passed by handle to whatever component needs it.

use crate::pipeline::Metrics;
use anyhow::Result;
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Fixed-capacity cache keyed by `K`, with LRU eviction.
pub struct BoundedCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, V>>,

    /// Optional metrics for hit/miss tracking
    metrics: Option<Arc<Metrics>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, V>> {
        self.inner.lock().expect("cache lock poisoned")
    }

    /// Look up `key`, filling it with `fill` on a miss.
    ///
    /// A failed fill is not cached; the next lookup for the same key runs
    /// `fill` again. Two threads racing on the same missing key may both run
    /// `fill`; the later insert wins, which is benign for deterministic fill
    /// functions.
    pub fn get_or_insert_with<F>(&self, key: K, fill: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        {
            let mut cache = self.lock();
            if let Some(value) = cache.get(&key) {
                if let Some(ref m) = self.metrics {
                    m.add_cache_hit();
                }
                return Ok(value.clone());
            }
        }

        // Fill without holding the lock
        let value = fill()?;

        let mut cache = self.lock();
        cache.put(key, value.clone());
        if let Some(ref m) = self.metrics {
            m.add_cache_miss();
        }
        Ok(value)
    }

    /// Look up `key` without filling.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Drop all cached entries.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_then_hit() {
        let cache: BoundedCache<String, f64> = BoundedCache::new(8, None);

        let v1 = cache
            .get_or_insert_with("a".to_string(), || Ok(1.5))
            .unwrap();
        assert_eq!(v1, 1.5);

        // Second lookup must not call fill again
        let v2 = cache
            .get_or_insert_with("a".to_string(), || panic!("fill called on hit"))
            .unwrap();
        assert_eq!(v2, 1.5);
    }

    #[test]
    fn test_lru_eviction() {
        let cache: BoundedCache<u64, u64> = BoundedCache::new(2, None);

        cache.get_or_insert_with(1, || Ok(10)).unwrap();
        cache.get_or_insert_with(2, || Ok(20)).unwrap();
        cache.get_or_insert_with(3, || Ok(30)).unwrap();

        // Key 1 is the least recently used and must be gone
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
        assert_eq!(cache.get(&3), Some(30));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_fill_not_cached() {
        let cache: BoundedCache<String, f64> = BoundedCache::new(8, None);

        let result =
            cache.get_or_insert_with("a".to_string(), || Err(anyhow::anyhow!("lookup failed")));
        assert!(result.is_err());
        assert!(cache.is_empty());

        // Next lookup runs fill again and succeeds
        let value = cache
            .get_or_insert_with("a".to_string(), || Ok(2.0))
            .unwrap();
        assert_eq!(value, 2.0);
    }

    #[test]
    fn test_metrics_accounting() {
        let metrics = Metrics::new();
        let cache: BoundedCache<u64, u64> = BoundedCache::new(8, Some(metrics.clone()));

        cache.get_or_insert_with(1, || Ok(1)).unwrap();
        cache.get_or_insert_with(1, || Ok(1)).unwrap();
        cache.get_or_insert_with(1, || Ok(1)).unwrap();
        cache.get_or_insert_with(2, || Ok(2)).unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.cache_misses, 2);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let cache: BoundedCache<u64, u64> = BoundedCache::new(0, None);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_clear() {
        let cache: BoundedCache<u64, u64> = BoundedCache::new(4, None);
        cache.get_or_insert_with(1, || Ok(1)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
