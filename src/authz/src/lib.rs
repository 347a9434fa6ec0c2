//! # Rolegate Access Control
//!
//! Role-based access control with a consistency-bounded permission cache.
//!
//! ## Features
//!
//! - **Effective permission resolution** over active roles and active permissions
//! - **Superuser bypass** modelled as [`PermissionSet::All`]
//! - **TTL-bounded cache** with per-user invalidation and generation tracking
//! - **Authorization guard** wrapping any async operation
//! - **Audited mutations** (store, then invalidate, then audit)
//! - **Async-first design** using Tokio runtime
//!
//! ## Example
//!
//! ```rust
//! use rolegate_audit::{AuditConfig, AuditRecorder, CallerContext, InMemoryAuditStore};
//! use rolegate_authz::{
//!     AccessControlService, CacheConfig, InMemoryDataStore, NewPermission, NewRole,
//!     PermissionCache, User,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryDataStore::new());
//!     let cache = Arc::new(PermissionCache::in_memory(store.clone(), CacheConfig::default()));
//!     let recorder = Arc::new(AuditRecorder::new(
//!         Arc::new(InMemoryAuditStore::new()),
//!         AuditConfig::default(),
//!     ));
//!     let service = AccessControlService::new(store.clone(), cache, recorder);
//!
//!     let alice = User::new("alice");
//!     store.upsert_user(alice.clone()).await;
//!
//!     let admin = CallerContext::anonymous();
//!     service
//!         .create_permission(&admin, NewPermission::new("doc.view", "doc", "view"))
//!         .await?;
//!     service
//!         .create_role(&admin, NewRole::new("viewer").with_permissions(["doc.view"]))
//!         .await?;
//!     service.assign_role(&admin, alice.id, "viewer").await?;
//!
//!     if service.has_permission(alice.id, "doc.view").await? {
//!         println!("Access granted!");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use cache::{
    cache_key, BackendStats, CacheBackend, CacheStats, CachedAccess, InMemoryCacheBackend,
    PermissionCache,
};
pub use config::{CacheConfig, RoleChangeInvalidation};
pub use error::{AuthorizationError, RbacError, Result};
pub use guard::{AuthorizationGuard, Requirement};
pub use resolver::PermissionResolver;
pub use service::{actions, AccessControlService};
pub use store::{DataStore, InMemoryDataStore};
pub use types::{
    Change, EffectiveAccess, NewPermission, NewRole, Permission, PermissionId, PermissionSet,
    Role, RoleGrant, RoleId, User, UserId,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
