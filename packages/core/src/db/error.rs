//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, initialization, and query failures.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Covers connection, bootstrap and statement failures. Business rule
/// violations are reported by the service-layer `TreeServiceError`.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// UNIQUE / PRIMARY KEY constraint rejected an insert
    #[error("Constraint violation: {context}")]
    ConstraintViolation { context: String },

    /// A row could not be converted into a model
    #[error("Malformed row: {context}")]
    MalformedRow { context: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a malformed row error
    pub fn malformed_row(context: impl Into<String>) -> Self {
        Self::MalformedRow {
            context: context.into(),
        }
    }

    /// Wrap a statement failure, classifying uniqueness violations separately
    ///
    /// libsql surfaces SQLite constraint failures as message text, so the
    /// classification is done on the rendered error.
    pub fn from_statement(action: &str, err: libsql::Error) -> Self {
        let message = err.to_string();
        if message.contains("UNIQUE constraint failed")
            || message.contains("PRIMARY KEY constraint failed")
        {
            Self::ConstraintViolation {
                context: format!("{}: {}", action, message),
            }
        } else {
            Self::SqlExecutionError {
                context: format!("Failed to {}: {}", action, message),
            }
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_execution_context() {
        let err = DatabaseError::sql_execution("boom");
        assert_eq!(err.to_string(), "SQL execution failed: boom");
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn test_malformed_row_message() {
        let err = DatabaseError::malformed_row("bad timestamp");
        assert!(err.to_string().contains("bad timestamp"));
    }
}
