//! Permission cache
//!
//! TTL-bounded cache of each user's [`EffectiveAccess`] in front of the
//! [`PermissionResolver`]. Entries live in a pluggable [`CacheBackend`].
//!
//! Every user carries an in-process invalidation generation. Entries record
//! the generation they were computed under and are treated as misses once it
//! moves on, so a resolution racing an invalidation, or a backend delete that
//! keeps failing, never serves stale access from this process. The TTL
//! bounds staleness everywhere else.
//!
//! A generation only matters while entries computed under an older one can
//! still be served, i.e. for one TTL after the bump. Older generations are
//! pruned once the tracked users outnumber the cache capacity, which keeps
//! the map bounded by `capacity` plus the users invalidated within one TTL.

mod backend;
mod stats;

pub use backend::{CacheBackend, CachedAccess, InMemoryCacheBackend};
pub use stats::{BackendStats, CacheStats};

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::resolver::PermissionResolver;
use crate::store::DataStore;
use crate::types::{EffectiveAccess, PermissionSet, UserId};
use stats::{Counters, Stat};

/// Backend key for a user's cached access
pub fn cache_key(user_id: UserId) -> String {
    format!("effective_access:{}", user_id)
}

#[derive(Debug, Clone, Copy)]
struct Generation {
    value: u64,
    bumped_at: Instant,
}

/// Caching front for the permission resolver
pub struct PermissionCache {
    resolver: PermissionResolver,
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    generations: DashMap<UserId, Generation>,
    counters: Counters,
}

impl PermissionCache {
    pub fn new(
        resolver: PermissionResolver,
        backend: Arc<dyn CacheBackend>,
        config: CacheConfig,
    ) -> Self {
        Self {
            resolver,
            backend,
            config,
            generations: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Cache over `store` with an [`InMemoryCacheBackend`] sized from `config`
    pub fn in_memory(store: Arc<dyn DataStore>, config: CacheConfig) -> Self {
        let backend = Arc::new(InMemoryCacheBackend::new(config.capacity));
        Self::new(PermissionResolver::new(store), backend, config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Current invalidation generation for a user
    pub fn generation(&self, user_id: UserId) -> u64 {
        self.generations.get(&user_id).map(|g| g.value).unwrap_or(0)
    }

    /// Number of users with a tracked invalidation generation
    pub fn tracked_generations(&self) -> usize {
        self.generations.len()
    }

    /// Forget generations bumped more than one TTL ago
    ///
    /// Every entry computed before such a bump has expired, so the user can
    /// safely fall back to generation 0. Returns the number removed.
    pub fn prune_generations(&self) -> usize {
        let ttl = self.config.ttl;
        let before = self.generations.len();
        self.generations.retain(|_, g| g.bumped_at.elapsed() < ttl);
        let pruned = before.saturating_sub(self.generations.len());
        if pruned > 0 {
            debug!(pruned, "Pruned invalidation generations");
        }
        pruned
    }

    /// Cached access for a user, resolving and storing it on a miss
    ///
    /// Backend failures fall back to the resolver; resolver failures
    /// (`NotFound`, `Storage`) propagate.
    pub async fn get_or_compute(&self, user_id: UserId) -> Result<EffectiveAccess> {
        let key = cache_key(user_id);
        let generation = self.generation(user_id);

        match self.backend.get(&key).await {
            Ok(Some(cached)) => {
                if cached.generation != generation {
                    self.counters.increment(Stat::Stale);
                    debug!(%user_id, "Ignoring entry from before invalidation");
                } else if cached.is_expired(self.config.ttl) {
                    self.counters.increment(Stat::Expirations);
                    debug!(%user_id, "Cached access expired");
                } else {
                    self.counters.increment(Stat::Hits);
                    debug!(%user_id, "Permission cache hit");
                    return Ok(cached.access);
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.counters.increment(Stat::BackendErrors);
                warn!(%user_id, error = %e, "Cache backend read failed, resolving directly");
            }
        }

        self.counters.increment(Stat::Misses);
        debug!(%user_id, "Permission cache miss");

        let access = self.resolver.compute_effective_access(user_id).await?;

        if self.generation(user_id) != generation {
            debug!(%user_id, "Invalidated during resolution, not caching");
            return Ok(access);
        }

        let entry = CachedAccess::new(access.clone(), generation);
        if let Err(e) = self.backend.set(&key, entry, self.config.ttl).await {
            self.counters.increment(Stat::BackendErrors);
            warn!(%user_id, error = %e, "Failed to populate permission cache");
        }

        Ok(access)
    }

    /// Resolve straight from the data store, leaving the cache untouched
    pub async fn resolve_uncached(&self, user_id: UserId) -> Result<EffectiveAccess> {
        self.resolver.compute_effective_access(user_id).await
    }

    pub async fn effective_permissions(&self, user_id: UserId) -> Result<PermissionSet> {
        Ok(self.get_or_compute(user_id).await?.permissions)
    }

    pub async fn effective_roles(&self, user_id: UserId) -> Result<BTreeSet<String>> {
        Ok(self.get_or_compute(user_id).await?.roles)
    }

    pub async fn has_permission(&self, user_id: UserId, permission: &str) -> Result<bool> {
        Ok(self.get_or_compute(user_id).await?.has_permission(permission))
    }

    pub async fn has_role(&self, user_id: UserId, role: &str) -> Result<bool> {
        Ok(self.get_or_compute(user_id).await?.has_role(role))
    }

    /// Drop a user's cached access
    ///
    /// The generation bump takes effect in-process before the backend is
    /// touched. The backend delete is retried `invalidation_retries` times;
    /// if it still fails the error is logged and returned.
    pub async fn invalidate(&self, user_id: UserId) -> Result<()> {
        self.bump_generation(user_id);

        let key = cache_key(user_id);
        let attempts = self.config.invalidation_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.backend.delete(&key).await {
                Ok(()) => {
                    self.counters.increment(Stat::Invalidations);
                    debug!(%user_id, attempt, "Invalidated cached access");
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(%user_id, attempt, error = %e, "Cache invalidation failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => {
                    self.counters.increment(Stat::InvalidationFailures);
                    error!(
                        %user_id,
                        attempts,
                        error = %e,
                        "Cache invalidation failed; entry is ignored in-process until TTL expiry"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Invalidate several users, continuing past failures
    ///
    /// Returns the number of users whose backend delete failed.
    pub async fn invalidate_all<I>(&self, user_ids: I) -> usize
    where
        I: IntoIterator<Item = UserId>,
    {
        let mut failures = 0;
        for user_id in user_ids {
            if self.invalidate(user_id).await.is_err() {
                failures += 1;
            }
        }
        failures
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.get(Stat::Hits),
            misses: self.counters.get(Stat::Misses),
            expirations: self.counters.get(Stat::Expirations),
            stale: self.counters.get(Stat::Stale),
            invalidations: self.counters.get(Stat::Invalidations),
            invalidation_failures: self.counters.get(Stat::InvalidationFailures),
            backend_errors: self.counters.get(Stat::BackendErrors),
        }
    }

    fn bump_generation(&self, user_id: UserId) {
        if !self.generations.contains_key(&user_id)
            && self.generations.len() >= self.config.capacity
        {
            self.prune_generations();
        }

        let now = Instant::now();
        self.generations
            .entry(user_id)
            .and_modify(|g| {
                g.value = g.value.wrapping_add(1);
                g.bumped_at = now;
            })
            .or_insert(Generation {
                value: 1,
                bumped_at: now,
            });
    }
}
