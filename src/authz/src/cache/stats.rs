//! Cache statistics

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counted cache events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stat {
    Hits,
    Misses,
    Expirations,
    Stale,
    Invalidations,
    InvalidationFailures,
    BackendErrors,
    Evictions,
}

impl Stat {
    const COUNT: usize = 8;
}

/// Lock-free counters shared by the cache and its backends
#[derive(Debug, Default)]
pub(crate) struct Counters {
    counts: [AtomicUsize; Stat::COUNT],
}

impl Counters {
    pub(crate) fn increment(&self, stat: Stat) {
        self.add(stat, 1);
    }

    pub(crate) fn add(&self, stat: Stat, n: usize) {
        self.counts[stat as usize].fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn get(&self, stat: Stat) -> usize {
        self.counts[stat as usize].load(Ordering::Relaxed)
    }
}

/// Permission cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    /// Includes expired and stale entries
    pub misses: usize,
    /// Entries older than the configured TTL
    pub expirations: usize,
    /// Entries written before the user's last invalidation
    pub stale: usize,
    pub invalidations: usize,
    /// Invalidations whose backend delete failed after every retry
    pub invalidation_failures: usize,
    /// Backend get/set failures served by falling back to the resolver
    pub backend_errors: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory backend statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendStats {
    pub entries: usize,
    pub capacity: usize,
    pub expirations: usize,
    pub evictions: usize,
}
