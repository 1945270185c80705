//! Agent Core error types.
//!
//! None of these escape a turn: the orchestrator logs persistence failures
//! and keeps the in-memory session authoritative. They surface only through
//! the session catalogue API (load, rename, delete).

use thiserror::Error;

/// Errors that can occur during agent core operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Session not found.
    #[error("session not found: '{session_id}'")]
    SessionNotFound { session_id: String },

    /// Reading or writing a session snapshot failed.
    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Persistence {
            reason: e.to_string(),
        }
    }
}
