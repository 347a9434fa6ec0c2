//! Access control service
//!
//! Mutations over the role/permission graph. Each one runs in a fixed order:
//!
//! 1. update the [`DataStore`]
//! 2. invalidate the affected users' cached access
//! 3. emit an audit event
//!
//! A store failure stops the sequence before anything is invalidated or
//! recorded. Invalidation and audit failures are logged and never undo the
//! committed store update or change the caller's result.

use rolegate_audit::{AuditRecorder, CallerContext, ResourceRef, ValueMap};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::PermissionCache;
use crate::config::RoleChangeInvalidation;
use crate::error::{RbacError, Result};
use crate::guard::{AuthorizationGuard, Requirement};
use crate::store::DataStore;
use crate::types::{
    Change, EffectiveAccess, NewPermission, NewRole, Permission, PermissionSet, Role, RoleId,
    User, UserId,
};

/// Audit action names
pub mod actions {
    pub const ROLE_ASSIGNED: &str = "ROLE_ASSIGNED";
    pub const ROLE_REVOKED: &str = "ROLE_REVOKED";
    pub const ROLE_CREATED: &str = "ROLE_CREATED";
    pub const ROLE_UPDATED: &str = "ROLE_UPDATED";
    pub const PERMISSION_CREATED: &str = "PERMISSION_CREATED";
    pub const PERMISSION_UPDATED: &str = "PERMISSION_UPDATED";
    pub const ROLE_PERMISSION_GRANTED: &str = "ROLE_PERMISSION_GRANTED";
    pub const ROLE_PERMISSION_REVOKED: &str = "ROLE_PERMISSION_REVOKED";
}

/// Role and permission management with cache upkeep and auditing
pub struct AccessControlService {
    store: Arc<dyn DataStore>,
    cache: Arc<PermissionCache>,
    guard: AuthorizationGuard,
    recorder: Arc<AuditRecorder>,
    mutation_requirement: Option<Requirement>,
}

impl AccessControlService {
    pub fn new(
        store: Arc<dyn DataStore>,
        cache: Arc<PermissionCache>,
        recorder: Arc<AuditRecorder>,
    ) -> Self {
        let guard = AuthorizationGuard::new(cache.clone());
        Self {
            store,
            cache,
            guard,
            recorder,
            mutation_requirement: None,
        }
    }

    /// Require callers of every mutation to satisfy `requirement`
    pub fn with_mutation_requirement(mut self, requirement: Requirement) -> Self {
        self.mutation_requirement = Some(requirement);
        self
    }

    pub fn guard(&self) -> &AuthorizationGuard {
        &self.guard
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn effective_access(&self, user_id: UserId, use_cache: bool) -> Result<EffectiveAccess> {
        if use_cache {
            self.cache.get_or_compute(user_id).await
        } else {
            self.cache.resolve_uncached(user_id).await
        }
    }

    pub async fn user_permissions(&self, user_id: UserId) -> Result<PermissionSet> {
        self.cache.effective_permissions(user_id).await
    }

    pub async fn user_roles(&self, user_id: UserId) -> Result<BTreeSet<String>> {
        self.cache.effective_roles(user_id).await
    }

    pub async fn has_permission(&self, user_id: UserId, permission: &str) -> Result<bool> {
        self.cache.has_permission(user_id, permission).await
    }

    pub async fn has_role(&self, user_id: UserId, role: &str) -> Result<bool> {
        self.cache.has_role(user_id, role).await
    }

    // ------------------------------------------------------------------
    // User/role assignment
    // ------------------------------------------------------------------

    /// Assign an active role to a user
    ///
    /// Assigning a role the user already holds is `Unchanged`.
    pub async fn assign_role(
        &self,
        ctx: &CallerContext,
        user_id: UserId,
        role_name: &str,
    ) -> Result<Change> {
        self.authorize(ctx).await?;

        let user = self.require_user(user_id).await?;
        let role = match self.store.get_role_by_name(role_name).await? {
            Some(role) if role.active => role,
            _ => return Err(RbacError::not_found(format!("active role {}", role_name))),
        };

        if !self.store.link_user_role(user.id, role.id).await? {
            debug!(%user_id, role = role_name, "User already holds role");
            return Ok(Change::Unchanged);
        }

        self.invalidate_user(user.id).await;
        info!(%user_id, role = role_name, "Assigned role");

        self.audit(
            actions::ROLE_ASSIGNED,
            &assignment_ref(&user, &role),
            ctx,
            None,
            Some(assignment_values(&user, &role)),
        )
        .await;

        Ok(Change::Applied)
    }

    /// Remove a role from a user; inactive roles can still be revoked
    pub async fn revoke_role(
        &self,
        ctx: &CallerContext,
        user_id: UserId,
        role_name: &str,
    ) -> Result<Change> {
        self.authorize(ctx).await?;

        let user = self.require_user(user_id).await?;
        let role = self.require_role(role_name).await?;

        if !self.store.unlink_user_role(user.id, role.id).await? {
            debug!(%user_id, role = role_name, "User does not hold role");
            return Ok(Change::Unchanged);
        }

        self.invalidate_user(user.id).await;
        info!(%user_id, role = role_name, "Revoked role");

        self.audit(
            actions::ROLE_REVOKED,
            &assignment_ref(&user, &role),
            ctx,
            Some(assignment_values(&user, &role)),
            None,
        )
        .await;

        Ok(Change::Applied)
    }

    // ------------------------------------------------------------------
    // Roles and permissions
    // ------------------------------------------------------------------

    /// Create a role, linking any of its named permissions that are active
    pub async fn create_role(&self, ctx: &CallerContext, new_role: NewRole) -> Result<Role> {
        self.authorize(ctx).await?;

        let role = self.store.create_role(&new_role, ctx.actor_id).await?;
        info!(role = %role.name, role_id = %role.id, "Created role");

        // Nobody holds a new role yet, so there is nothing to invalidate
        let mut values = role.audit_values();
        values.insert("permissions".into(), json!(new_role.permissions));

        self.audit(actions::ROLE_CREATED, &role.resource_ref(), ctx, None, Some(values))
            .await;

        Ok(role)
    }

    pub async fn create_permission(
        &self,
        ctx: &CallerContext,
        new_permission: NewPermission,
    ) -> Result<Permission> {
        self.authorize(ctx).await?;

        let permission = self
            .store
            .create_permission(&new_permission, ctx.actor_id)
            .await?;
        info!(permission = %permission.name, permission_id = %permission.id, "Created permission");

        self.audit(
            actions::PERMISSION_CREATED,
            &permission.resource_ref(),
            ctx,
            None,
            Some(permission.audit_values()),
        )
        .await;

        Ok(permission)
    }

    /// Activate or deactivate a role
    pub async fn set_role_active(
        &self,
        ctx: &CallerContext,
        role_name: &str,
        active: bool,
    ) -> Result<Change> {
        self.authorize(ctx).await?;

        let role = self.require_role(role_name).await?;
        if role.active == active {
            return Ok(Change::Unchanged);
        }

        let updated = self.store.set_role_active(role.id, active).await?;
        info!(role = role_name, active, "Updated role");

        self.invalidate_role_holders(&[updated.id]).await;

        self.audit(
            actions::ROLE_UPDATED,
            &updated.resource_ref(),
            ctx,
            Some(active_values(role.active)),
            Some(active_values(updated.active)),
        )
        .await;

        Ok(Change::Applied)
    }

    /// Activate or deactivate a permission
    pub async fn set_permission_active(
        &self,
        ctx: &CallerContext,
        permission_name: &str,
        active: bool,
    ) -> Result<Change> {
        self.authorize(ctx).await?;

        let permission = self.require_permission(permission_name).await?;
        if permission.active == active {
            return Ok(Change::Unchanged);
        }

        let updated = self.store.set_permission_active(permission.id, active).await?;
        info!(permission = permission_name, active, "Updated permission");

        self.invalidate_permission_holders(&updated).await;

        self.audit(
            actions::PERMISSION_UPDATED,
            &updated.resource_ref(),
            ctx,
            Some(active_values(permission.active)),
            Some(active_values(updated.active)),
        )
        .await;

        Ok(Change::Applied)
    }

    /// Link a permission to a role
    pub async fn grant_permission(
        &self,
        ctx: &CallerContext,
        role_name: &str,
        permission_name: &str,
    ) -> Result<Change> {
        self.authorize(ctx).await?;

        let role = self.require_role(role_name).await?;
        let permission = self.require_permission(permission_name).await?;

        if !self.store.link_role_permission(role.id, permission.id).await? {
            return Ok(Change::Unchanged);
        }
        info!(role = role_name, permission = permission_name, "Granted permission to role");

        self.invalidate_role_holders(&[role.id]).await;

        self.audit(
            actions::ROLE_PERMISSION_GRANTED,
            &role.resource_ref(),
            ctx,
            None,
            Some(link_values(&role, &permission)),
        )
        .await;

        Ok(Change::Applied)
    }

    /// Unlink a permission from a role
    pub async fn revoke_permission(
        &self,
        ctx: &CallerContext,
        role_name: &str,
        permission_name: &str,
    ) -> Result<Change> {
        self.authorize(ctx).await?;

        let role = self.require_role(role_name).await?;
        let permission = self.require_permission(permission_name).await?;

        if !self.store.unlink_role_permission(role.id, permission.id).await? {
            return Ok(Change::Unchanged);
        }
        info!(role = role_name, permission = permission_name, "Revoked permission from role");

        self.invalidate_role_holders(&[role.id]).await;

        self.audit(
            actions::ROLE_PERMISSION_REVOKED,
            &role.resource_ref(),
            ctx,
            Some(link_values(&role, &permission)),
            None,
        )
        .await;

        Ok(Change::Applied)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn authorize(&self, ctx: &CallerContext) -> Result<()> {
        if let Some(requirement) = &self.mutation_requirement {
            self.guard.check_context(requirement, ctx).await?;
        }
        Ok(())
    }

    async fn require_user(&self, user_id: UserId) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| RbacError::not_found(format!("user {}", user_id)))
    }

    async fn require_role(&self, name: &str) -> Result<Role> {
        self.store
            .get_role_by_name(name)
            .await?
            .ok_or_else(|| RbacError::not_found(format!("role {}", name)))
    }

    async fn require_permission(&self, name: &str) -> Result<Permission> {
        self.store
            .get_permission_by_name(name)
            .await?
            .ok_or_else(|| RbacError::not_found(format!("permission {}", name)))
    }

    async fn invalidate_user(&self, user_id: UserId) {
        // The cache logs the failure and keeps the entry dead in-process
        if self.cache.invalidate(user_id).await.is_err() {
            warn!(%user_id, "Continuing after failed cache invalidation");
        }
    }

    async fn invalidate_role_holders(&self, role_ids: &[RoleId]) {
        if self.cache.config().role_change_invalidation == RoleChangeInvalidation::TtlOnly {
            debug!(roles = role_ids.len(), "Leaving role holders to TTL expiry");
            return;
        }

        let mut users = HashSet::new();
        for role_id in role_ids {
            match self.store.users_with_role(*role_id).await {
                Ok(ids) => users.extend(ids),
                Err(e) => {
                    error!(%role_id, error = %e, "Could not list role holders; entries expire by TTL");
                }
            }
        }

        let total = users.len();
        let failures = self.cache.invalidate_all(users).await;
        debug!(users = total, failures, "Invalidated role holders");
    }

    async fn invalidate_permission_holders(&self, permission: &Permission) {
        if self.cache.config().role_change_invalidation == RoleChangeInvalidation::TtlOnly {
            debug!(permission = %permission.name, "Leaving permission holders to TTL expiry");
            return;
        }

        match self.store.roles_with_permission(permission.id).await {
            Ok(role_ids) => self.invalidate_role_holders(&role_ids).await,
            Err(e) => {
                error!(
                    permission = %permission.name,
                    error = %e,
                    "Could not list roles with permission; entries expire by TTL"
                );
            }
        }
    }

    async fn audit(
        &self,
        action: &str,
        resource: &ResourceRef,
        ctx: &CallerContext,
        old_values: Option<ValueMap>,
        new_values: Option<ValueMap>,
    ) {
        if let Err(e) = self
            .recorder
            .record_model_change(action, resource, ctx, old_values, new_values)
            .await
        {
            warn!(action, error = %e, "Mutation committed without audit event");
        }
    }
}

fn assignment_ref(user: &User, role: &Role) -> ResourceRef {
    ResourceRef::new(
        "User",
        Some(user.id.to_string()),
        format!("<UserRole(user={}, role={})>", user.username, role.name),
    )
}

fn assignment_values(user: &User, role: &Role) -> ValueMap {
    let mut values = ValueMap::new();
    values.insert("user_id".into(), Value::String(user.id.to_string()));
    values.insert("username".into(), Value::String(user.username.clone()));
    values.insert("role_id".into(), Value::String(role.id.to_string()));
    values.insert("role".into(), Value::String(role.name.clone()));
    values
}

fn link_values(role: &Role, permission: &Permission) -> ValueMap {
    let mut values = ValueMap::new();
    values.insert("role".into(), Value::String(role.name.clone()));
    values.insert("permission".into(), Value::String(permission.name.clone()));
    values.insert("permission_id".into(), Value::String(permission.id.to_string()));
    values
}

fn active_values(active: bool) -> ValueMap {
    let mut values = ValueMap::new();
    values.insert("active".into(), Value::Bool(active));
    values
}
