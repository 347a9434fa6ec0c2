//! Sensitive-field redaction for audit payloads
//!
//! Keys are matched case-insensitively against a blocklist of substrings.
//! A matching key keeps its place in the map but its value is replaced by
//! [`REDACTED`]. Nested maps are walked recursively, and so are lists: map
//! elements of a list are sanitized, nested lists are walked, scalar elements
//! pass through untouched.

use serde_json::{Map, Value};

/// JSON object used for old/new values, metadata and request data
pub type ValueMap = Map<String, Value>;

/// Replacement written in place of a sensitive value
pub const REDACTED: &str = "[REDACTED]";

/// Default blocklist of sensitive key substrings
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "password_hash",
    "token",
    "secret",
    "key",
    "authorization",
    "cookie",
    "session",
    "csrf_token",
];

/// Case-insensitive substring matcher over a blocklist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveFieldMatcher {
    /// Lowercased, non-empty needles
    needles: Vec<String>,
}

impl SensitiveFieldMatcher {
    /// Build a matcher from an explicit blocklist
    ///
    /// Empty entries are dropped; they would otherwise match every key.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut needles: Vec<String> = fields
            .into_iter()
            .map(|f| f.as_ref().trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        needles.sort();
        needles.dedup();

        Self { needles }
    }

    /// Default blocklist extended with additional fields
    pub fn with_additional<I, S>(additional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extra: Vec<String> = additional
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();

        Self::new(
            DEFAULT_SENSITIVE_FIELDS
                .iter()
                .map(|s| s.to_string())
                .chain(extra),
        )
    }

    /// Whether `key` contains any blocklisted substring
    pub fn is_sensitive(&self, key: &str) -> bool {
        let key_lower = key.to_lowercase();
        self.needles.iter().any(|needle| key_lower.contains(needle.as_str()))
    }

    /// Current blocklist (lowercased, sorted)
    pub fn fields(&self) -> &[String] {
        &self.needles
    }
}

impl Default for SensitiveFieldMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_FIELDS)
    }
}

/// Recursive map sanitizer
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    matcher: SensitiveFieldMatcher,
}

impl Sanitizer {
    pub fn new(matcher: SensitiveFieldMatcher) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &SensitiveFieldMatcher {
        &self.matcher
    }

    /// Return a sanitized copy of `map`
    pub fn sanitize_map(&self, map: &ValueMap) -> ValueMap {
        map.iter()
            .map(|(key, value)| {
                let sanitized = if self.matcher.is_sensitive(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    self.sanitize_value(value)
                };
                (key.clone(), sanitized)
            })
            .collect()
    }

    fn sanitize_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.sanitize_map(map)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.sanitize_value(item)).collect())
            }
            other => other.clone(),
        }
    }
}
