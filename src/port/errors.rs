//! # Persistence Port Errors

use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Failures reported by a persistence backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl BackendError {
    /// Whether the request may succeed if sent again unchanged
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Unavailable(_) | BackendError::LockPoisoned(_)
        )
    }
}
