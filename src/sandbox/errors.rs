//! Sandbox store error types.
//!
//! The `Display` text of every variant is a single human-readable line. The
//! tool router feeds it back to the model verbatim as `Error: <reason>`.

use thiserror::Error;

/// Errors that can occur during sandboxed file operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The target file or directory does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The target exists but is a directory where a file was expected.
    #[error("not a file: {path}")]
    NotAFile { path: String },

    /// The target exists but is a file where a directory was expected.
    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// The sanitized path is not allowed (empty, or inside a hidden area).
    #[error("path rejected: {path} ({reason})")]
    PathRejected { path: String, reason: String },

    /// A search query that cannot be run.
    #[error("invalid search query: {reason}")]
    InvalidQuery { reason: String },

    /// Underlying filesystem failure.
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

impl StoreError {
    /// Map an `std::io::Error` for `path`, turning `NotFound` into the
    /// dedicated variant.
    pub(crate) fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound {
                path: path.to_string(),
            }
        } else {
            StoreError::Io {
                path: path.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
