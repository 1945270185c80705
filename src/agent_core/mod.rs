//! Agent Core — orchestration layer for PocketAgent.
//!
//! Submodules:
//! - `conversation`: Conversation ledger and prompt-context trimming
//! - `session_store`: JSON snapshots of sessions under `chats/`
//! - `tool_router`: Executes parsed tool calls against the sandbox store
//! - `prompt`: Default system prompt built from the tool table
//! - `orchestrator`: The step-bounded generate/parse/execute loop
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod errors;
pub mod orchestrator;
pub mod prompt;
pub mod session_store;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use conversation::{ContextWindow, Conversation};
pub use errors::AgentError;
pub use orchestrator::{Orchestrator, StopHandle};
pub use session_store::SessionStore;
pub use tool_router::ToolRouter;
pub use types::{
    AgentEvent, AgentState, Message, Session, SessionSummary, TerminationReason, TurnOutcome,
};
