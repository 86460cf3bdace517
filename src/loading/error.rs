//! Load-specific error types

use std::time::Duration;
use thiserror::Error;

/// Result type for module load operations
pub type LoadResult<T> = Result<T, LoadError>;

/// Message shown when a failure carries no text of its own
pub const GENERIC_LOAD_FAILURE: &str = "Failed to load component";

/// Failures a module load can end in
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("{message}")]
    Module { message: String },

    #[error("Component loading timed out after {}ms", .timeout.as_millis())]
    Timeout { timeout: Duration },

    #[error("Component was disposed before loading finished")]
    Disposed,
}

impl LoadError {
    /// Create a module load failure
    pub fn module(message: impl Into<String>) -> Self {
        LoadError::Module {
            message: message.into(),
        }
    }

    /// Create a synthetic timeout failure
    pub fn timeout(timeout: Duration) -> Self {
        LoadError::Timeout { timeout }
    }

    /// Check if this failure was synthesized by a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, LoadError::Timeout { .. })
    }

    /// Text suitable for an error view, falling back to a generic message
    pub fn display_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            GENERIC_LOAD_FAILURE.to_string()
        } else {
            message
        }
    }
}

impl From<anyhow::Error> for LoadError {
    fn from(err: anyhow::Error) -> Self {
        LoadError::module(err.to_string())
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        LoadError::module(err.to_string())
    }
}
