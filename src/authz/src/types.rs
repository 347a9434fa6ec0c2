//! Core access-control types

use chrono::{DateTime, Utc};
use rolegate_audit::{ResourceRef, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Unique user identifier
pub type UserId = Uuid;

/// Unique role identifier
pub type RoleId = Uuid;

/// Unique permission identifier
pub type PermissionId = Uuid;

/// User as seen by access control (read-only here)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub active: bool,
    /// Superusers hold every permission regardless of roles
    pub superuser: bool,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            active: true,
            superuser: false,
        }
    }

    pub fn superuser(username: impl Into<String>) -> Self {
        Self {
            superuser: true,
            ..Self::new(username)
        }
    }
}

/// Named bundle of permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    /// Globally unique
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inactive roles grant nothing
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
}

impl Role {
    pub fn repr(&self) -> String {
        format!("<Role(name={})>", self.name)
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new("Role", Some(self.id.to_string()), self.repr())
    }

    /// Field map used as old/new values in audit events
    pub fn audit_values(&self) -> ValueMap {
        to_value_map(self)
    }
}

/// Permission on a (resource, action) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    /// Globally unique
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// (resource, action) is globally unique
    pub resource: String,
    pub action: String,
    /// Inactive permissions are never granted
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
}

impl Permission {
    pub fn repr(&self) -> String {
        format!(
            "<Permission(name={}, resource={}, action={})>",
            self.name, self.resource, self.action
        )
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new("Permission", Some(self.id.to_string()), self.repr())
    }

    pub fn audit_values(&self) -> ValueMap {
        to_value_map(self)
    }
}

/// A role assigned to a user, with the role's permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// Role creation request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Names of permissions to link; inactive or unknown names are skipped
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl NewRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }
}

/// Permission creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewPermission {
    pub fn new(
        name: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            action: action.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Effective permission set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "names", rename_all = "snake_case")]
pub enum PermissionSet {
    /// Superuser bypass: every permission is granted
    All,
    /// Exactly these permission names
    Granted(BTreeSet<String>),
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self::Granted(BTreeSet::new())
    }

    pub fn contains(&self, permission: &str) -> bool {
        match self {
            Self::All => true,
            Self::Granted(names) => names.contains(permission),
        }
    }

    pub fn contains_any<'a, I>(&self, permissions: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        permissions.into_iter().any(|p| self.contains(p))
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Granted names, or `None` for [`PermissionSet::All`]
    pub fn names(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::All => None,
            Self::Granted(names) => Some(names),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::Granted(iter.into_iter().map(Into::into).collect())
    }
}

/// Everything the cache stores per user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAccess {
    pub permissions: PermissionSet,
    /// Names of the user's active roles
    pub roles: BTreeSet<String>,
}

impl EffectiveAccess {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Whether a mutation changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    Applied,
    /// Already in the requested state; nothing invalidated or audited
    Unchanged,
}

impl Change {
    pub fn from_applied(applied: bool) -> Self {
        if applied {
            Self::Applied
        } else {
            Self::Unchanged
        }
    }

    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

fn to_value_map<T: Serialize>(value: &T) -> ValueMap {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => ValueMap::new(),
    }
}
