//! # Rolegate Audit
//!
//! Structured, sanitized audit trail for access-control systems.
//!
//! ## Features
//!
//! - **Sanitization** of old/new values, metadata and request data against a
//!   configurable blocklist before anything is persisted
//! - **Append-only stores**: in-memory (optionally capped, never evicting),
//!   PostgreSQL behind the `postgres` feature
//! - **Audit wrapper** recording `ACTION` / `ACTION_FAILED` around any async
//!   operation without touching its result
//!
//! ## Example
//!
//! ```rust
//! use rolegate_audit::{AuditConfig, AuditRecorder, CallerContext, InMemoryAuditStore, NewAuditEvent};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), rolegate_audit::AuditError> {
//! let store = Arc::new(InMemoryAuditStore::new());
//! let recorder = AuditRecorder::new(store.clone(), AuditConfig::default());
//!
//! let event = NewAuditEvent::new("SETTINGS_CHANGED")
//!     .context(&CallerContext::anonymous())
//!     .metadata_entry("api_key", "abc123");
//! recorder.record(event).await?;
//!
//! assert_eq!(store.events().await[0].metadata["api_key"], "[REDACTED]");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod recorder;
pub mod sanitize;
pub mod store;
pub mod wrapper;

pub use config::AuditConfig;
pub use context::CallerContext;
pub use error::{AuditError, Result};
pub use event::{AuditEvent, AuditEventId, NewAuditEvent, ResourceRef};
pub use recorder::AuditRecorder;
pub use sanitize::{Sanitizer, SensitiveFieldMatcher, ValueMap, REDACTED};
pub use store::{AuditQuery, AuditStore, InMemoryAuditStore};
pub use wrapper::AuditWrapper;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
