//! Result caching for updates.
//!
//! Keeps the buffered outputs of recent executions. An entry is reusable when
//! it belongs to the same node, was produced at the node's current pipeline
//! stamp (nothing upstream changed since), and its buffered region covers the
//! new request.

use crate::core::error::NodeId;
use crate::core::raster::Raster;
use crate::core::region::Region;
use crate::core::timestamp::Stamp;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CAPACITY: usize = 64;

/// Identifies one buffered execution of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey<const D: usize> {
    /// The node ID.
    pub node_id: NodeId,
    /// Pipeline stamp the outputs were computed at.
    pub stamp: Stamp,
    /// Buffered region of every output.
    pub region: Region<D>,
}

/// Cached entry with metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<const D: usize> {
    /// The cached outputs, one per output index.
    pub outputs: Vec<Arc<Raster<D>>>,
    /// How long the original computation took.
    pub computation_time: Duration,
    /// Approximate memory size in bytes.
    pub memory_size: usize,
}

impl<const D: usize> CacheEntry<D> {
    /// Create a new cache entry.
    pub fn new(outputs: Vec<Arc<Raster<D>>>, computation_time: Duration) -> Self {
        let memory_size = outputs.iter().map(|r| r.memory_size()).sum();
        Self {
            outputs,
            computation_time,
            memory_size,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted.
    pub evictions: u64,
    /// Total time saved by cache hits.
    pub time_saved: Duration,
}

impl CacheStats {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Thread-safe result cache.
pub struct ResultCache<const D: usize> {
    /// The LRU cache.
    cache: Mutex<LruCache<CacheKey<D>, CacheEntry<D>>>,
    /// Maximum memory usage in bytes.
    max_memory: usize,
    /// Current memory usage.
    current_memory: Mutex<usize>,
    /// Cache statistics.
    stats: Mutex<CacheStats>,
}

impl<const D: usize> ResultCache<D> {
    /// Create a new cache with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            max_memory: 512 * 1024 * 1024, // 512 MB default
            current_memory: Mutex::new(0),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Create a cache with custom memory limit.
    pub fn with_memory_limit(capacity: usize, max_memory_mb: usize) -> Self {
        let mut cache = Self::new(capacity);
        cache.max_memory = max_memory_mb * 1024 * 1024;
        cache
    }

    /// Find outputs of `node_id` computed at `stamp` whose buffered region
    /// covers `region`.
    pub fn get_covering(
        &self,
        node_id: NodeId,
        stamp: Stamp,
        region: &Region<D>,
    ) -> Option<Vec<Arc<Raster<D>>>> {
        let mut cache = self.cache.lock();

        let key = cache
            .iter()
            .map(|(k, _)| *k)
            .find(|k| k.node_id == node_id && k.stamp == stamp && k.region.contains(region));

        let mut stats = self.stats.lock();
        match key.and_then(|k| cache.get(&k)) {
            Some(entry) => {
                stats.hits += 1;
                stats.time_saved += entry.computation_time;
                Some(entry.outputs.clone())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Store a result in the cache.
    ///
    /// Entries of the same node computed at older stamps can never be reused
    /// and are dropped.
    pub fn put(&self, key: CacheKey<D>, outputs: Vec<Arc<Raster<D>>>, computation_time: Duration) {
        let entry = CacheEntry::new(outputs, computation_time);
        let entry_size = entry.memory_size;
        if entry_size > self.max_memory {
            return;
        }

        let mut cache = self.cache.lock();
        let mut current = self.current_memory.lock();
        let mut stats = self.stats.lock();

        let stale: Vec<CacheKey<D>> = cache
            .iter()
            .map(|(k, _)| *k)
            .filter(|k| k.node_id == key.node_id && k.stamp < key.stamp)
            .collect();
        for k in stale {
            if let Some(evicted) = cache.pop(&k) {
                *current = current.saturating_sub(evicted.memory_size);
                stats.evictions += 1;
            }
        }

        // Evict entries if needed to stay under memory limit
        while *current + entry_size > self.max_memory {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current = current.saturating_sub(evicted.memory_size);
                    stats.evictions += 1;
                }
                None => break,
            }
        }

        if let Some((_, replaced)) = cache.push(key, entry) {
            *current = current.saturating_sub(replaced.memory_size);
        }
        *current += entry_size;
    }

    /// Invalidate all entries for a node.
    pub fn invalidate_node(&self, node_id: NodeId) {
        let mut cache = self.cache.lock();
        let keys_to_remove: Vec<_> = cache
            .iter()
            .filter(|(k, _)| k.node_id == node_id)
            .map(|(k, _)| *k)
            .collect();

        let mut total_freed = 0;
        for key in keys_to_remove {
            if let Some(entry) = cache.pop(&key) {
                total_freed += entry.memory_size;
            }
        }

        let mut current = self.current_memory.lock();
        *current = current.saturating_sub(total_freed);
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        let mut cache = self.cache.lock();
        cache.clear();
        *self.current_memory.lock() = 0;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        *self.current_memory.lock()
    }

    /// Get number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const D: usize> Default for ResultCache<D> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
