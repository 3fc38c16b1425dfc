/// Recordkit Error Module
///
/// This module defines the error type shared by every layer of the crate:
/// connection handling, statement execution, schema materialization and the
/// record facade.
use std::fmt;
use thiserror::Error;

/// Phase in which a statement failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    /// The statement could not be prepared (malformed SQL, missing table or column)
    Prepare,
    /// The statement was prepared but failed while binding or running
    Execute,
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionKind::Prepare => f.write_str("Prepare"),
            ExecutionKind::Execute => f.write_str("Execute"),
        }
    }
}

/// Error type for all recordkit operations.
///
/// Read operations surface failures as `Err`, which keeps them distinct from
/// a successful query that returned zero rows.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The database could not be opened with the supplied credentials
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement failed to prepare or execute
    #[error("{kind} error: {message}")]
    Execution { kind: ExecutionKind, message: String },

    /// `get(id)` found no row and the debug flag is enabled
    #[error("No result found")]
    NoResult,

    /// A fallible field assignment named a column the schema does not declare
    #[error("Unknown field `{field}` on table `{table}`")]
    UnknownField { table: String, field: String },

    /// A table, column or type name is not a plain SQL identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Schema descriptor or introspection errors
    #[error("Schema error: {0}")]
    Schema(String),

    /// Operations the data-access layer deliberately does not implement
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Driver errors raised outside the query executor
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON rendering errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecordError {
    pub(crate) fn prepare(err: impl fmt::Display) -> Self {
        RecordError::Execution {
            kind: ExecutionKind::Prepare,
            message: err.to_string(),
        }
    }

    pub(crate) fn execute(err: impl fmt::Display) -> Self {
        RecordError::Execution {
            kind: ExecutionKind::Execute,
            message: err.to_string(),
        }
    }

    /// Returns the execution phase for `Execution` errors.
    pub fn execution_kind(&self) -> Option<ExecutionKind> {
        match self {
            RecordError::Execution { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Type alias for Result to use RecordError as the error type.
pub type Result<T> = std::result::Result<T, RecordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let conn_err = RecordError::Connection("database missing".to_string());
        assert!(conn_err.to_string().contains("Connection error"));

        let prepare_err = RecordError::prepare("no such table: users");
        assert_eq!(prepare_err.to_string(), "Prepare error: no such table: users");
        assert_eq!(prepare_err.execution_kind(), Some(ExecutionKind::Prepare));

        let execute_err = RecordError::execute("constraint failed");
        assert_eq!(execute_err.execution_kind(), Some(ExecutionKind::Execute));

        assert_eq!(RecordError::NoResult.to_string(), "No result found");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RecordError = io_err.into();
        match err {
            RecordError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }

        let json_err = serde_json::from_str::<serde_json::Value>("{ invalid json }").unwrap_err();
        let err: RecordError = json_err.into();
        match err {
            RecordError::Json(_) => {}
            _ => panic!("Expected JSON error"),
        }

        assert_eq!(RecordError::NoResult.execution_kind(), None);
    }
}
