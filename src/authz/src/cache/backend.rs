//! Key-value cache backends

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::stats::{BackendStats, Counters, Stat};
use crate::error::Result;
use crate::types::EffectiveAccess;

/// Value stored per user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccess {
    pub access: EffectiveAccess,
    /// Invalidation generation the entry was computed under
    pub generation: u64,
    pub cached_at: DateTime<Utc>,
}

impl CachedAccess {
    pub fn new(access: EffectiveAccess, generation: u64) -> Self {
        Self {
            access,
            generation,
            cached_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => Utc::now() - self.cached_at > ttl,
            Err(_) => false,
        }
    }
}

/// TTL key-value store behind the permission cache
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedAccess>>;

    async fn set(&self, key: &str, value: CachedAccess, ttl: Duration) -> Result<()>;

    /// Removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Clone)]
struct CachedEntry {
    value: CachedAccess,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map_or(false, |expires_at| Instant::now() >= expires_at)
    }
}

/// In-memory backend on a sharded concurrent map
///
/// Expired entries are dropped lazily on read and swept when the map reaches
/// capacity; if it is still full the entries closest to expiry are evicted.
pub struct InMemoryCacheBackend {
    entries: Arc<DashMap<String, CachedEntry>>,
    capacity: usize,
    counters: Counters,
}

impl InMemoryCacheBackend {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            counters: Counters::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> BackendStats {
        BackendStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            expirations: self.counters.get(Stat::Expirations),
            evictions: self.counters.get(Stat::Evictions),
        }
    }

    fn make_room(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let expired = before.saturating_sub(self.entries.len());
        self.counters.add(Stat::Expirations, expired);

        if self.entries.len() < self.capacity {
            return;
        }

        // Remove roughly 10% so a full map doesn't sweep on every insert
        let to_remove = (self.capacity / 10).max(1);
        let mut by_expiry: Vec<(String, Option<Instant>)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().expires_at))
            .collect();
        // Entries that never expire go last
        by_expiry.sort_by_key(|(_, expires_at)| (expires_at.is_none(), *expires_at));

        for (key, _) in by_expiry.into_iter().take(to_remove) {
            if self.entries.remove(&key).is_some() {
                self.counters.increment(Stat::Evictions);
            }
        }

        debug!(capacity = self.capacity, removed = to_remove, "Evicted cache entries");
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CachedAccess>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                self.counters.increment(Stat::Expirations);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: CachedAccess, ttl: Duration) -> Result<()> {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.make_room();
        }

        self.entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
