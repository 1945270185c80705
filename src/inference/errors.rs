//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility. A generation failure never aborts a turn:
//! the orchestrator folds [`InferenceError::user_message`] into the visible
//! assistant text instead.

use thiserror::Error;

/// Errors that can occur while producing a generation stream.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// SSE stream parsing or chunk-level error.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// One-line text shown to the user in place of the failed generation.
    pub fn user_message(&self) -> String {
        let detail = match self {
            InferenceError::ConnectionFailed { .. } => {
                "the model endpoint is unreachable".to_string()
            }
            InferenceError::Timeout { duration_secs } => {
                format!("the model did not respond within {duration_secs}s")
            }
            InferenceError::HttpError { status, .. } => {
                format!("the model endpoint returned HTTP {status}")
            }
            InferenceError::StreamError { reason } => format!("the stream failed ({reason})"),
            InferenceError::ConfigError { reason } => format!("misconfigured model ({reason})"),
        };
        format!("[Generation error: {detail}]")
    }
}
