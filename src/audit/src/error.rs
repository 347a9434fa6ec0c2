//! Error types for the audit subsystem

use thiserror::Error;

/// Audit recording and query errors
#[derive(Debug, Error)]
pub enum AuditError {
    /// Audit store rejected or failed the operation
    #[error("Audit storage error: {0}")]
    Storage(String),

    /// Event payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),
}

/// Result type for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
