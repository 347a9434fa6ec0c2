//! Data store abstraction for users, roles, permissions and assignments

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{RbacError, Result};
use crate::types::{
    NewPermission, NewRole, Permission, PermissionId, Role, RoleGrant, RoleId, User, UserId,
};

/// Data store trait
///
/// Implementations own the role/permission graph. Writes must be atomic:
/// either the change is committed or an error is returned and nothing changed.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Get a user by ID
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// The user's active role assignments, each with every linked permission
    async fn get_active_roles_with_permissions(&self, user_id: UserId) -> Result<Vec<RoleGrant>>;

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>>;

    /// Create a role and link the named active permissions
    ///
    /// Fails with [`RbacError::Validation`] if the name is taken.
    async fn create_role(&self, role: &NewRole, created_by: Option<UserId>) -> Result<Role>;

    /// Fails with [`RbacError::Validation`] if the name or the
    /// (resource, action) pair is taken.
    async fn create_permission(
        &self,
        permission: &NewPermission,
        created_by: Option<UserId>,
    ) -> Result<Permission>;

    /// Returns the updated role
    async fn set_role_active(&self, role_id: RoleId, active: bool) -> Result<Role>;

    /// Returns the updated permission
    async fn set_permission_active(&self, permission_id: PermissionId, active: bool) -> Result<Permission>;

    /// Returns `false` if the link already existed
    async fn link_user_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool>;

    /// Returns `false` if there was no link
    async fn unlink_user_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool>;

    async fn link_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> Result<bool>;

    async fn unlink_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> Result<bool>;

    /// Users assigned to the role (active or not)
    async fn users_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>>;

    /// Roles the permission is linked to
    async fn roles_with_permission(&self, permission_id: PermissionId) -> Result<Vec<RoleId>>;
}

#[derive(Default)]
struct Graph {
    users: HashMap<UserId, User>,
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
    user_roles: BTreeSet<(UserId, RoleId)>,
    role_permissions: BTreeSet<(RoleId, PermissionId)>,
}

impl Graph {
    fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.values().find(|r| r.name == name)
    }

    fn permission_by_name(&self, name: &str) -> Option<&Permission> {
        self.permissions.values().find(|p| p.name == name)
    }
}

/// In-memory data store implementation
pub struct InMemoryDataStore {
    graph: Arc<RwLock<Graph>>,
    /// Number of effective-access lookups served
    resolution_queries: AtomicUsize,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self {
            graph: Arc::new(RwLock::new(Graph::default())),
            resolution_queries: AtomicUsize::new(0),
        }
    }

    /// Insert or replace a user. Users are managed outside access control.
    pub async fn upsert_user(&self, user: User) {
        self.graph.write().await.users.insert(user.id, user);
    }

    /// Remove a user and their assignments
    pub async fn remove_user(&self, user_id: UserId) {
        let mut graph = self.graph.write().await;
        graph.users.remove(&user_id);
        graph.user_roles.retain(|(u, _)| *u != user_id);
    }

    /// Calls to [`DataStore::get_active_roles_with_permissions`] so far
    pub fn resolution_queries(&self) -> usize {
        self.resolution_queries.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.graph.read().await.users.get(&id).cloned())
    }

    async fn get_active_roles_with_permissions(&self, user_id: UserId) -> Result<Vec<RoleGrant>> {
        self.resolution_queries.fetch_add(1, Ordering::SeqCst);
        let graph = self.graph.read().await;

        let grants = graph
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, role_id)| graph.roles.get(role_id))
            .filter(|role| role.active)
            .map(|role| RoleGrant {
                role: role.clone(),
                permissions: graph
                    .role_permissions
                    .iter()
                    .filter(|(r, _)| *r == role.id)
                    .filter_map(|(_, p)| graph.permissions.get(p).cloned())
                    .collect(),
            })
            .collect();

        Ok(grants)
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.graph.read().await.role_by_name(name).cloned())
    }

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        Ok(self.graph.read().await.permission_by_name(name).cloned())
    }

    async fn create_role(&self, new_role: &NewRole, created_by: Option<UserId>) -> Result<Role> {
        let mut graph = self.graph.write().await;

        if graph.role_by_name(&new_role.name).is_some() {
            return Err(RbacError::Validation(format!(
                "Role '{}' already exists",
                new_role.name
            )));
        }

        let role = Role {
            id: Uuid::new_v4(),
            name: new_role.name.clone(),
            description: new_role.description.clone(),
            active: true,
            created_at: Utc::now(),
            created_by,
        };

        let linked: Vec<PermissionId> = new_role
            .permissions
            .iter()
            .filter_map(|name| graph.permission_by_name(name))
            .filter(|p| p.active)
            .map(|p| p.id)
            .collect();

        for permission_id in linked {
            graph.role_permissions.insert((role.id, permission_id));
        }
        graph.roles.insert(role.id, role.clone());

        Ok(role)
    }

    async fn create_permission(
        &self,
        new_permission: &NewPermission,
        created_by: Option<UserId>,
    ) -> Result<Permission> {
        let mut graph = self.graph.write().await;

        if graph.permission_by_name(&new_permission.name).is_some() {
            return Err(RbacError::Validation(format!(
                "Permission '{}' already exists",
                new_permission.name
            )));
        }
        if graph
            .permissions
            .values()
            .any(|p| p.resource == new_permission.resource && p.action == new_permission.action)
        {
            return Err(RbacError::Validation(format!(
                "Permission for ({}, {}) already exists",
                new_permission.resource, new_permission.action
            )));
        }

        let permission = Permission {
            id: Uuid::new_v4(),
            name: new_permission.name.clone(),
            description: new_permission.description.clone(),
            resource: new_permission.resource.clone(),
            action: new_permission.action.clone(),
            active: true,
            created_at: Utc::now(),
            created_by,
        };
        graph.permissions.insert(permission.id, permission.clone());

        Ok(permission)
    }

    async fn set_role_active(&self, role_id: RoleId, active: bool) -> Result<Role> {
        let mut graph = self.graph.write().await;
        let role = graph
            .roles
            .get_mut(&role_id)
            .ok_or_else(|| RbacError::not_found(format!("role {}", role_id)))?;
        role.active = active;
        Ok(role.clone())
    }

    async fn set_permission_active(&self, permission_id: PermissionId, active: bool) -> Result<Permission> {
        let mut graph = self.graph.write().await;
        let permission = graph
            .permissions
            .get_mut(&permission_id)
            .ok_or_else(|| RbacError::not_found(format!("permission {}", permission_id)))?;
        permission.active = active;
        Ok(permission.clone())
    }

    async fn link_user_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        let mut graph = self.graph.write().await;
        if !graph.users.contains_key(&user_id) {
            return Err(RbacError::not_found(format!("user {}", user_id)));
        }
        if !graph.roles.contains_key(&role_id) {
            return Err(RbacError::not_found(format!("role {}", role_id)));
        }
        Ok(graph.user_roles.insert((user_id, role_id)))
    }

    async fn unlink_user_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        Ok(self.graph.write().await.user_roles.remove(&(user_id, role_id)))
    }

    async fn link_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> Result<bool> {
        let mut graph = self.graph.write().await;
        if !graph.roles.contains_key(&role_id) {
            return Err(RbacError::not_found(format!("role {}", role_id)));
        }
        if !graph.permissions.contains_key(&permission_id) {
            return Err(RbacError::not_found(format!("permission {}", permission_id)));
        }
        Ok(graph.role_permissions.insert((role_id, permission_id)))
    }

    async fn unlink_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> Result<bool> {
        Ok(self
            .graph
            .write()
            .await
            .role_permissions
            .remove(&(role_id, permission_id)))
    }

    async fn users_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        let graph = self.graph.read().await;
        Ok(graph
            .user_roles
            .iter()
            .filter(|(_, r)| *r == role_id)
            .map(|(u, _)| *u)
            .collect())
    }

    async fn roles_with_permission(&self, permission_id: PermissionId) -> Result<Vec<RoleId>> {
        let graph = self.graph.read().await;
        Ok(graph
            .role_permissions
            .iter()
            .filter(|(_, p)| *p == permission_id)
            .map(|(r, _)| *r)
            .collect())
    }
}
