//! Error types for access control

use rolegate_audit::AuditError;
use thiserror::Error;

/// Outcome of a failed authorization check
///
/// The guard never reports *why* a check failed beyond these two cases, so
/// callers cannot probe which roles or permissions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// No actor on the call
    #[error("Authentication required")]
    Unauthenticated,

    /// Actor lacks the requirement
    #[error("Permission denied")]
    Forbidden,
}

/// Access control errors
#[derive(Debug, Error)]
pub enum RbacError {
    /// Unknown user, role or permission
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authorization check failed
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// Duplicate name or duplicate resource/action pair
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Data store or cache backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Audit store failure
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),
}

impl RbacError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for access control operations
pub type Result<T> = std::result::Result<T, RbacError>;
