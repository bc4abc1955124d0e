//! Timeline error types
//!
//! Error codes:
//! - TL_VALIDATION_FAILED (REJECT)
//! - TL_ORDERING_VIOLATION (REJECT)
//! - TL_FORMAT_INVALID (REJECT)
//! - TL_OUT_OF_RANGE (REJECT)
//! - TL_NOT_FOUND (REJECT)
//! - TL_BACKEND_FAILED (ERROR)
//!
//! Validation and format errors are raised before any write is attempted.
//! Backend errors abort the whole operation and are always safe to retry.

use std::fmt;

use crate::port::BackendError;

/// Severity levels for timeline errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Caller request rejected, nothing was written
    Reject,
    /// Operation failed in the persistence collaborator
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Error kinds surfaced by every public timeline operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineErrorCode {
    /// Malformed ingest input
    ValidationFailed,
    /// Ingest mtime does not advance the high-water mark
    OrderingViolation,
    /// Unparsable date token or unknown sampling scale
    FormatInvalid,
    /// Point-in-time date outside the queried bounds
    OutOfRange,
    /// Collection or object required but absent
    NotFound,
    /// Persistence port failure
    BackendFailed,
}

impl TimelineErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            TimelineErrorCode::ValidationFailed => "TL_VALIDATION_FAILED",
            TimelineErrorCode::OrderingViolation => "TL_ORDERING_VIOLATION",
            TimelineErrorCode::FormatInvalid => "TL_FORMAT_INVALID",
            TimelineErrorCode::OutOfRange => "TL_OUT_OF_RANGE",
            TimelineErrorCode::NotFound => "TL_NOT_FOUND",
            TimelineErrorCode::BackendFailed => "TL_BACKEND_FAILED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            TimelineErrorCode::BackendFailed => Severity::Error,
            _ => Severity::Reject,
        }
    }

    /// Whether the same call may be retried unchanged.
    ///
    /// Only backend failures qualify: re-ingesting stored content is deduplicated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TimelineErrorCode::BackendFailed)
    }
}

impl fmt::Display for TimelineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Timeline error type with full context
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineError {
    code: TimelineErrorCode,
    message: String,
}

impl TimelineError {
    /// Create a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::new(TimelineErrorCode::ValidationFailed, reason)
    }

    /// Create an ordering error for a stale ingest batch
    pub fn ordering(current: impl fmt::Display, supplied: impl fmt::Display) -> Self {
        Self::new(
            TimelineErrorCode::OrderingViolation,
            format!(
                "invalid mtime ({}); must be > current mtime ({})",
                supplied, current
            ),
        )
    }

    /// Create a format error
    pub fn format(reason: impl Into<String>) -> Self {
        Self::new(TimelineErrorCode::FormatInvalid, reason)
    }

    /// Create an out-of-range error for a point-in-time date
    pub fn out_of_range(date: impl fmt::Display) -> Self {
        Self::new(
            TimelineErrorCode::OutOfRange,
            format!("date {} is not in the queried range", date),
        )
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(TimelineErrorCode::NotFound, format!("{} not found", what.into()))
    }

    /// Create a backend error
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::new(TimelineErrorCode::BackendFailed, reason)
    }

    fn new(code: TimelineErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> TimelineErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the failed call may be retried unchanged
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for TimelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for TimelineError {}

impl From<BackendError> for TimelineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::CollectionNotFound(name) => {
                TimelineError::not_found(format!("collection {}", name))
            }
            BackendError::CollectionExists(name) => {
                TimelineError::validation(format!("collection {} already exists", name))
            }
            other => TimelineError::backend(other.to_string()),
        }
    }
}

/// Result type for timeline operations
pub type TimelineResult<T> = Result<T, TimelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TimelineErrorCode::ValidationFailed.code(),
            "TL_VALIDATION_FAILED"
        );
        assert_eq!(
            TimelineErrorCode::OrderingViolation.code(),
            "TL_ORDERING_VIOLATION"
        );
        assert_eq!(TimelineErrorCode::FormatInvalid.code(), "TL_FORMAT_INVALID");
        assert_eq!(TimelineErrorCode::OutOfRange.code(), "TL_OUT_OF_RANGE");
        assert_eq!(TimelineErrorCode::NotFound.code(), "TL_NOT_FOUND");
        assert_eq!(TimelineErrorCode::BackendFailed.code(), "TL_BACKEND_FAILED");
    }

    #[test]
    fn test_only_backend_is_retryable() {
        assert!(TimelineError::backend("down").is_retryable());
        assert!(!TimelineError::validation("bad").is_retryable());
        assert!(!TimelineError::ordering(2, 1).is_retryable());
    }

    #[test]
    fn test_backend_severity() {
        assert_eq!(TimelineError::backend("x").severity(), Severity::Error);
        assert_eq!(TimelineError::format("x").severity(), Severity::Reject);
    }

    #[test]
    fn test_error_display() {
        let err = TimelineError::ordering(10, 5);
        let display = format!("{}", err);
        assert!(display.contains("TL_ORDERING_VIOLATION"));
        assert!(display.contains("REJECT"));
        assert!(display.contains("must be > current mtime (10)"));
    }

    #[test]
    fn test_missing_collection_maps_to_not_found() {
        let err: TimelineError = BackendError::CollectionNotFound("cube".into()).into();
        assert_eq!(err.code(), TimelineErrorCode::NotFound);

        let err: TimelineError = BackendError::Unavailable("io".into()).into();
        assert_eq!(err.code(), TimelineErrorCode::BackendFailed);
    }

    #[test]
    fn test_existing_collection_is_not_retryable() {
        let err: TimelineError = BackendError::CollectionExists("cube".into()).into();
        assert_eq!(err.code(), TimelineErrorCode::ValidationFailed);
        assert!(!err.is_retryable());
        assert!(err.message().contains("already exists"));
    }
}
