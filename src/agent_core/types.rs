//! Shared types for the agent core.
//!
//! Conversation messages, sessions, and the observable loop state/events
//! used across the ledger, the session store and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inference::types::{Role, ToolCall};

/// Name given to sessions until the first user message renames them.
pub const DEFAULT_SESSION_NAME: &str = "New Chat";

/// Characters kept when naming a session from its first user message.
const AUTO_NAME_CHARS: usize = 40;

/// Characters kept in a catalogue preview.
const PREVIEW_CHARS: usize = 80;

// ─── Conversation Messages ──────────────────────────────────────────────────

/// A single message stored in conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    /// Overwritten in place only while this is the in-flight assistant message.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Live-display flag; never persisted.
    #[serde(skip)]
    pub is_streaming: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: None,
            is_streaming: false,
        }
    }

    /// Empty assistant message that receives streamed fragments.
    pub fn provisional() -> Self {
        Self {
            is_streaming: true,
            ..Self::new(Role::Assistant, "")
        }
    }
}

// ─── Sessions ───────────────────────────────────────────────────────────────

/// One conversation and its full message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub pinned: bool,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: DEFAULT_SESSION_NAME.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            pinned: false,
        }
    }

    /// Bump `updated_at` without ever moving it backwards.
    pub fn touch(&mut self) {
        self.updated_at = self.updated_at.max(Utc::now());
    }

    /// Whether any user message has been recorded.
    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    /// Rename a still-default session from its first user message.
    ///
    /// Uses the first non-empty line, truncated to 40 characters.
    pub fn auto_name(&mut self) {
        if self.name != DEFAULT_SESSION_NAME {
            return;
        }
        let Some(first) = self.messages.iter().find(|m| m.role == Role::User) else {
            return;
        };
        let line = first
            .content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");
        if line.is_empty() {
            return;
        }
        self.name = truncate_chars(line, AUTO_NAME_CHARS);
    }

    /// Catalogue entry for this session.
    pub fn summary(&self) -> SessionSummary {
        let preview = self
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| truncate_chars(m.content.trim(), PREVIEW_CHARS))
            .unwrap_or_default();

        SessionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            updated_at: self.updated_at,
            pinned: self.pinned,
            message_count: self.messages.len(),
            preview,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight catalogue view of a persisted session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub pinned: bool,
    pub message_count: usize,
    /// Start of the first user message.
    pub preview: String,
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", s[..idx].trim_end()),
        None => s.to_string(),
    }
}

// ─── Agent Loop State ───────────────────────────────────────────────────────

/// Why a turn's loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    NoMoreToolCalls,
    StepLimitReached,
    Cancelled,
    GenerationFailed,
}

/// Observable orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    AwaitingGeneration { step: usize },
    ExecutingTools { step: usize },
    Terminated { reason: TerminationReason },
}

/// Result of one user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub reason: TerminationReason,
    /// Tool-execution steps completed during the turn.
    pub steps: usize,
}

/// Progress notifications emitted while a turn runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StepStarted { step: usize },
    Fragment { message_id: String, text: String },
    AssistantFinalized { message_id: String, content: String },
    ToolStarted { call_id: String, name: String },
    ToolFinished { call_id: String, name: String, success: bool },
    StepLimitReached { max_steps: usize },
    TurnFinished { outcome: TurnOutcome },
}

// ─── Tests ──────────────────────────────────────────────────────────────────
