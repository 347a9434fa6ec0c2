//! Authorization guard
//!
//! Enforces a [`Requirement`] around an arbitrary async operation using the
//! [`PermissionCache`].
//!
//! ```rust
//! use rolegate_authz::{AuthorizationError, AuthorizationGuard, Requirement};
//!
//! # async fn example(guard: AuthorizationGuard, actor: Option<uuid::Uuid>) -> Result<(), AuthorizationError> {
//! let report = guard
//!     .enforce(&Requirement::permission("report.export"), actor, || async {
//!         Ok::<_, AuthorizationError>("report.csv")
//!     })
//!     .await?;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

use rolegate_audit::CallerContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::PermissionCache;
use crate::error::AuthorizationError;
use crate::types::{EffectiveAccess, UserId};

/// What an actor must hold to pass the guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Requirement {
    Permission(String),
    Role(String),
    /// At least one of the listed permissions; an empty list never passes
    AnyPermission(Vec<String>),
}

impl Requirement {
    pub fn permission(name: impl Into<String>) -> Self {
        Self::Permission(name.into())
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::Role(name.into())
    }

    pub fn any_permission<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyPermission(names.into_iter().map(Into::into).collect())
    }

    pub fn is_satisfied_by(&self, access: &EffectiveAccess) -> bool {
        match self {
            Self::Permission(name) => access.has_permission(name),
            Self::Role(name) => access.has_role(name),
            Self::AnyPermission(names) => access
                .permissions
                .contains_any(names.iter().map(String::as_str)),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission(name) => write!(f, "permission:{}", name),
            Self::Role(name) => write!(f, "role:{}", name),
            Self::AnyPermission(names) => write!(f, "any_permission:[{}]", names.join(",")),
        }
    }
}

/// Enforcement point for permission and role requirements
#[derive(Clone)]
pub struct AuthorizationGuard {
    cache: Arc<PermissionCache>,
}

impl AuthorizationGuard {
    pub fn new(cache: Arc<PermissionCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Check a requirement without running anything
    ///
    /// A missing actor is `Unauthenticated` and never reaches the cache. Every
    /// other failure, including unknown users and storage errors, is
    /// `Forbidden`.
    pub async fn check(
        &self,
        requirement: &Requirement,
        actor: Option<UserId>,
    ) -> Result<(), AuthorizationError> {
        let user_id = match actor {
            Some(id) => id,
            None => {
                debug!(%requirement, "Rejected unauthenticated caller");
                return Err(AuthorizationError::Unauthenticated);
            }
        };

        match self.cache.get_or_compute(user_id).await {
            Ok(access) if requirement.is_satisfied_by(&access) => {
                debug!(%user_id, %requirement, "Authorization granted");
                Ok(())
            }
            Ok(_) => {
                debug!(%user_id, %requirement, "Authorization denied");
                Err(AuthorizationError::Forbidden)
            }
            Err(e) => {
                warn!(%user_id, %requirement, error = %e, "Authorization check failed, denying");
                Err(AuthorizationError::Forbidden)
            }
        }
    }

    pub async fn check_context(
        &self,
        requirement: &Requirement,
        ctx: &CallerContext,
    ) -> Result<(), AuthorizationError> {
        self.check(requirement, ctx.actor_id).await
    }

    /// Run `operation` only if `actor` satisfies `requirement`
    ///
    /// The operation's result is returned unchanged. Its error type only needs
    /// to absorb an [`AuthorizationError`].
    pub async fn enforce<F, Fut, T, E>(
        &self,
        requirement: &Requirement,
        actor: Option<UserId>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AuthorizationError>,
    {
        self.check(requirement, actor).await?;
        operation().await
    }
}
