//! Effective permission resolution
//!
//! Computes what a user may do from the role/permission graph held by the
//! [`DataStore`]. Only active roles and active permissions contribute;
//! superusers resolve to [`PermissionSet::All`].
//!
//! # Example
//!
//! ```rust
//! use rolegate_authz::{DataStore, InMemoryDataStore, NewPermission, NewRole, PermissionResolver, User};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), rolegate_authz::RbacError> {
//! let store = Arc::new(InMemoryDataStore::new());
//! let alice = User::new("alice");
//! store.upsert_user(alice.clone()).await;
//!
//! store.create_permission(&NewPermission::new("doc.view", "doc", "view"), None).await?;
//! let viewer = store.create_role(&NewRole::new("viewer").with_permissions(["doc.view"]), None).await?;
//! store.link_user_role(alice.id, viewer.id).await?;
//!
//! let resolver = PermissionResolver::new(store);
//! assert!(resolver.has_permission(alice.id, "doc.view").await?);
//! assert!(resolver.has_role(alice.id, "viewer").await?);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{RbacError, Result};
use crate::store::DataStore;
use crate::types::{EffectiveAccess, PermissionSet, RoleGrant, User, UserId};

/// Resolves effective access straight from the data store (no caching)
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn DataStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Effective permissions and roles in one data store round-trip
    pub async fn compute_effective_access(&self, user_id: UserId) -> Result<EffectiveAccess> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| RbacError::not_found(format!("user {}", user_id)))?;

        let grants = self.store.get_active_roles_with_permissions(user_id).await?;
        let access = Self::fold(&user, &grants);

        debug!(
            %user_id,
            superuser = user.superuser,
            roles = access.roles.len(),
            "Resolved effective access"
        );

        Ok(access)
    }

    /// Fold role grants into effective access
    ///
    /// Grants are filtered again here so a store that returns inactive rows
    /// still cannot widen access.
    pub fn fold(user: &User, grants: &[RoleGrant]) -> EffectiveAccess {
        let active: Vec<&RoleGrant> = grants.iter().filter(|g| g.role.active).collect();

        let roles: BTreeSet<String> = active.iter().map(|g| g.role.name.clone()).collect();

        let permissions = if user.superuser {
            PermissionSet::All
        } else {
            active
                .iter()
                .flat_map(|g| g.permissions.iter())
                .filter(|p| p.active)
                .map(|p| p.name.clone())
                .collect()
        };

        EffectiveAccess { permissions, roles }
    }

    pub async fn compute_effective_permissions(&self, user_id: UserId) -> Result<PermissionSet> {
        Ok(self.compute_effective_access(user_id).await?.permissions)
    }

    pub async fn compute_effective_roles(&self, user_id: UserId) -> Result<BTreeSet<String>> {
        Ok(self.compute_effective_access(user_id).await?.roles)
    }

    pub async fn has_permission(&self, user_id: UserId, permission: &str) -> Result<bool> {
        Ok(self
            .compute_effective_permissions(user_id)
            .await?
            .contains(permission))
    }

    pub async fn has_role(&self, user_id: UserId, role: &str) -> Result<bool> {
        Ok(self.compute_effective_roles(user_id).await?.contains(role))
    }
}
