//! Error types for hierarchy operations
//!
//! Every public operation returns one of a small, stable set of error kinds.
//! All checks run before any write, so an error never leaves a partial
//! mutation behind.

use hierarchy_model::SchemaError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Hierarchy error types.
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// Referenced entity, definition, parent, or asset does not exist or is
    /// outside the caller's company
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed definition, unknown type, failed attribute rule, oversized
    /// name or metadata
    #[error("Validation error: {0}")]
    Validation(String),

    /// Disallowed type pairing, child limit reached, depth exceeded, or cycle
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A concurrent write won a uniqueness race; retry the request
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for hierarchy operations.
pub type HierarchyResult<T> = Result<T, HierarchyError>;

impl HierarchyError {
    /// Whether retrying the same request can succeed.
    ///
    /// Only conflicts are retryable; every other kind needs a different
    /// request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HierarchyError::Conflict(_))
    }

    /// Check if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        matches!(self, HierarchyError::Internal(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            HierarchyError::NotFound(_) => 404,
            HierarchyError::Validation(_) => 400,
            HierarchyError::ConstraintViolation(_) => 422,
            HierarchyError::Conflict(_) => 409,
            HierarchyError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            HierarchyError::NotFound(_) => "NOT_FOUND",
            HierarchyError::Validation(_) => "VALIDATION_ERROR",
            HierarchyError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            HierarchyError::Conflict(_) => "CONFLICT",
            HierarchyError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn entity_not_found(id: impl std::fmt::Display) -> Self {
        HierarchyError::NotFound(format!("entity {}", id))
    }

    pub(crate) fn definition_not_found(id: impl std::fmt::Display) -> Self {
        HierarchyError::NotFound(format!("entity definition {}", id))
    }
}

impl From<SchemaError> for HierarchyError {
    fn from(err: SchemaError) -> Self {
        HierarchyError::Validation(err.to_string())
    }
}

impl From<StoreError> for HierarchyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { .. } | StoreError::Busy(_) => {
                HierarchyError::Conflict(err.to_string())
            }
            StoreError::Backend(_) => HierarchyError::Internal(err.to_string()),
        }
    }
}

impl From<ConfigError> for HierarchyError {
    fn from(err: ConfigError) -> Self {
        HierarchyError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(HierarchyError::Conflict("race".into()).is_retryable());
        assert!(!HierarchyError::NotFound("x".into()).is_retryable());
        assert!(!HierarchyError::ConstraintViolation("x".into()).is_retryable());
        assert!(!HierarchyError::Internal("x".into()).is_retryable());
    }

    #[test]
    fn test_codes_and_status() {
        let err = HierarchyError::ConstraintViolation("max children".into());
        assert_eq!(err.error_code(), "CONSTRAINT_VIOLATION");
        assert_eq!(err.status_code(), 422);
        assert!(!err.is_server_error());

        let err = HierarchyError::Internal("disk".into());
        assert_eq!(err.status_code(), 500);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_store_error_mapping() {
        let err: HierarchyError = StoreError::UniqueViolation {
            index: "assets.employee".into(),
            key: "EMP-1".into(),
        }
        .into();
        assert!(matches!(err, HierarchyError::Conflict(_)));

        let err: HierarchyError = StoreError::Busy("lock timeout".into()).into();
        assert!(err.is_retryable());

        let err: HierarchyError = StoreError::Backend("io".into()).into();
        assert!(matches!(err, HierarchyError::Internal(_)));
    }

    #[test]
    fn test_config_error_is_internal() {
        let err: HierarchyError = ConfigError::InvalidValue {
            key: "limits".into(),
            message: "too deep".into(),
        }
        .into();
        assert!(err.is_server_error());
    }

    #[test]
    fn test_schema_error_is_validation() {
        let err: HierarchyError = SchemaError::DuplicateType("plant".into()).into();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
