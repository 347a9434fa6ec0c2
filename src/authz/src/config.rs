//! Access-control configuration
//!
//! Environment variables:
//! - `RBAC_CACHE_TTL` - permission cache TTL in seconds (default: 300)
//! - `RBAC_CACHE_CAPACITY` - in-memory cache capacity (default: 10000)
//! - `RBAC_INVALIDATION_RETRIES` - extra attempts for a failed invalidation
//!   (default: 3, capped at 10)
//! - `RBAC_ROLE_CHANGE_INVALIDATION` - `cascade` or `ttl_only` (default: cascade)

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// How role/permission content changes reach cached entries
///
/// The TTL bounds staleness under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleChangeInvalidation {
    /// Ask the data store which users hold the role and invalidate each
    #[default]
    Cascade,
    /// Leave affected entries to expire
    TtlOnly,
}

impl FromStr for RoleChangeInvalidation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cascade" => Ok(Self::Cascade),
            "ttl_only" | "ttl" => Ok(Self::TtlOnly),
            other => Err(format!("unknown invalidation policy '{}'", other)),
        }
    }
}

/// Permission cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live for cached effective access
    #[serde(with = "millis")]
    pub ttl: Duration,

    /// Maximum number of entries in the in-memory backend
    pub capacity: usize,

    /// Extra delete attempts after a failed invalidation
    pub invalidation_retries: u32,

    /// Delay between invalidation attempts
    #[serde(with = "millis")]
    pub retry_backoff: Duration,

    pub role_change_invalidation: RoleChangeInvalidation,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            capacity: 10_000,
            invalidation_retries: 3,
            retry_backoff: Duration::from_millis(25),
            role_change_invalidation: RoleChangeInvalidation::Cascade,
        }
    }
}

impl CacheConfig {
    /// Upper bound applied to `RBAC_INVALIDATION_RETRIES`
    pub const MAX_INVALIDATION_RETRIES: u32 = 10;

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Load from the process environment, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            ttl: parse(&lookup, "RBAC_CACHE_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
            capacity: parse(&lookup, "RBAC_CACHE_CAPACITY").unwrap_or(defaults.capacity),
            invalidation_retries: parse(&lookup, "RBAC_INVALIDATION_RETRIES")
                .map(clamp_retries)
                .unwrap_or(defaults.invalidation_retries),
            retry_backoff: defaults.retry_backoff,
            role_change_invalidation: parse(&lookup, "RBAC_ROLE_CHANGE_INVALIDATION")
                .unwrap_or(defaults.role_change_invalidation),
        }
    }
}

fn clamp_retries(retries: u32) -> u32 {
    if retries > CacheConfig::MAX_INVALIDATION_RETRIES {
        warn!(
            retries,
            max = CacheConfig::MAX_INVALIDATION_RETRIES,
            "Invalidation retries above maximum, clamping"
        );
        return CacheConfig::MAX_INVALIDATION_RETRIES;
    }
    retries
}

fn parse<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Invalid configuration value, using default");
            None
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
