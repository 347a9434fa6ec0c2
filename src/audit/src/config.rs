//! Audit configuration
//!
//! Environment variables:
//! - `AUDIT_ENABLED` - record anything at all (default: true)
//! - `AUDIT_LOG_MODELS` - record model changes (default: true)
//! - `AUDIT_LOG_REQUESTS` - record HTTP requests (default: true)
//! - `AUDIT_LOG_AUTHENTICATION` - record authentication events (default: true)
//! - `AUDIT_SENSITIVE_FIELDS` - comma separated extra blocklist entries
//! - `AUDIT_STORE_CAPACITY` - reject appends to the in-memory store past this
//!   many events (default: unbounded)

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::sanitize::SensitiveFieldMatcher;

/// Audit recorder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Master switch
    pub enabled: bool,

    /// Record model changes
    pub log_models: bool,

    /// Record HTTP requests
    pub log_requests: bool,

    /// Record authentication events
    pub log_authentication: bool,

    /// Extra sensitive key substrings on top of the default blocklist
    pub sensitive_fields: Vec<String>,

    /// Event limit for the in-memory audit store; `None` is unbounded
    pub store_capacity: Option<usize>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_models: true,
            log_requests: true,
            log_authentication: true,
            sensitive_fields: Vec::new(),
            store_capacity: None,
        }
    }
}

impl AuditConfig {
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

        let sensitive_fields = lookup("AUDIT_SENSITIVE_FIELDS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            enabled: parse_bool(&lookup, "AUDIT_ENABLED", defaults.enabled),
            log_models: parse_bool(&lookup, "AUDIT_LOG_MODELS", defaults.log_models),
            log_requests: parse_bool(&lookup, "AUDIT_LOG_REQUESTS", defaults.log_requests),
            log_authentication: parse_bool(
                &lookup,
                "AUDIT_LOG_AUTHENTICATION",
                defaults.log_authentication,
            ),
            sensitive_fields,
            store_capacity: match lookup("AUDIT_STORE_CAPACITY") {
                Some(raw) => match raw.trim().parse() {
                    Ok(capacity) => Some(capacity),
                    Err(_) => {
                        warn!(key = "AUDIT_STORE_CAPACITY", value = %raw, "Invalid number, using default");
                        defaults.store_capacity
                    }
                },
                None => defaults.store_capacity,
            },
        }
    }

    /// Matcher for the default blocklist plus configured extras
    pub fn matcher(&self) -> SensitiveFieldMatcher {
        SensitiveFieldMatcher::with_additional(&self.sensitive_fields)
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(key, value = %raw, "Invalid boolean, using default");
            default
        }
    }
}
