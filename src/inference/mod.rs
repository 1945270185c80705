//! Inference — the generation side of the agent loop.
//!
//! This module handles everything between the orchestrator and the model:
//! - The `<tool>name|k=v</tool>` directive grammar and parser
//! - The Generation Port trait and end-of-turn marker filtering
//! - An OpenAI-compatible streaming client for local endpoints
//! - SSE stream parsing
//!
//! The orchestrator only depends on [`GenerationPort`], so the model backend
//! is interchangeable: tests drive the loop with scripted ports.

pub mod client;
pub mod errors;
pub mod generation;
pub mod streaming;
pub mod tool_call_parser;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use errors::InferenceError;
pub use generation::{FragmentStream, GenerationPort};
pub use tool_call_parser::{DisplayFilter, ToolKind};
pub use types::{ChatMessage, Role, ToolCall, ToolCallStatus};
