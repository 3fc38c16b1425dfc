// Core infrastructure modules
pub mod config;
pub mod core;
pub mod logging;

// Active-record layer
pub mod record;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::core::{ExecutionKind, RecordError, Result};
