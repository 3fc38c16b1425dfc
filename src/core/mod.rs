/// Core Module for recordkit
///
/// This module contains the data-access backbone: connection handling,
/// parameterized statement execution, schema introspection and the shared
/// error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{ExecutionKind, RecordError, Result};
