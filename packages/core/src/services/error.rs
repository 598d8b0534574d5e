//! Service Layer Error Types
//!
//! This module defines the error type shared by every tree service.

use crate::db::DatabaseError;
use crate::models::{PermissionLevel, ValidationError};
use thiserror::Error;

/// Tree service errors
///
/// Store failures convert through `From<DatabaseError>`: uniqueness
/// violations become [`Conflict`](Self::Conflict), anything else
/// [`Database`](Self::Database). Inside a transaction, a `Database` error is
/// reported as [`TransactionFailed`](Self::TransactionFailed) after rollback.
#[derive(Error, Debug)]
pub enum TreeServiceError {
    /// Referenced node, version, parent or membership does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Structurally invalid request (self-parenting, cycle, container
    /// mismatch, depth cap, target exclusivity)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Uniqueness violated where duplicates are not idempotent
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A multi-step operation failed in the store and was rolled back
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },

    /// Caller lacks the level the operation needs
    #[error("Permission denied: user {user_id} needs {required} access to {resource}")]
    PermissionDenied {
        user_id: String,
        required: PermissionLevel,
        resource: String,
    },

    /// Optimistic concurrency check failed
    #[error("Version conflict for {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database operation failed: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for TreeServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConstraintViolation { context } => Self::Conflict(context),
            other => Self::Database(other),
        }
    }
}

impl TreeServiceError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    pub fn permission_denied(
        user_id: impl Into<String>,
        required: PermissionLevel,
        resource: impl Into<String>,
    ) -> Self {
        Self::PermissionDenied {
            user_id: user_id.into(),
            required,
            resource: resource.into(),
        }
    }

    pub fn version_conflict(id: impl Into<String>, expected: i64, actual: i64) -> Self {
        Self::VersionConflict {
            id: id.into(),
            expected,
            actual,
        }
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::InvalidOperation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_becomes_conflict() {
        let err: TreeServiceError = DatabaseError::ConstraintViolation {
            context: "insert workspace member".to_string(),
        }
        .into();
        assert!(matches!(err, TreeServiceError::Conflict(_)));
    }

    #[test]
    fn test_other_database_errors_stay_database() {
        let err: TreeServiceError = DatabaseError::sql_execution("boom").into();
        assert!(matches!(err, TreeServiceError::Database(_)));
    }

    #[test]
    fn test_not_found_message() {
        let err = TreeServiceError::not_found("page", "p-1");
        assert_eq!(err.to_string(), "page not found: p-1");
        assert!(err.is_not_found());
    }
}
