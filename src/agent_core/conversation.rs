//! Conversation: the in-memory ledger of one session.
//!
//! Responsibilities:
//! - Append role-tagged messages and keep `updated_at` monotonic
//! - Own the single in-flight assistant message that streaming overwrites
//! - Build the trimmed `Vec<ChatMessage>` context for the generation port
//!
//! Every message except the in-flight assistant message is append-only.

use crate::inference::types::{ChatMessage, Role, ToolCall};

use super::types::{Message, Session};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Most recent messages considered for the prompt context.
pub const DEFAULT_HISTORY_MESSAGES: usize = 24;

/// Character budget for the prompt context.
pub const DEFAULT_HISTORY_CHAR_BUDGET: usize = 24_000;

// ─── ContextWindow ──────────────────────────────────────────────────────────

/// Limits applied when building the prompt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    pub max_messages: usize,
    pub char_budget: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_HISTORY_MESSAGES,
            char_budget: DEFAULT_HISTORY_CHAR_BUDGET,
        }
    }
}

// ─── Conversation ───────────────────────────────────────────────────────────

/// Ledger wrapper around a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    session: Session,
    window: ContextWindow,
}

impl Conversation {
    pub fn new(session: Session, window: ContextWindow) -> Self {
        Self { session, window }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.session.messages
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Append a finished message. Returns its id.
    pub fn append(&mut self, message: Message) -> String {
        let id = message.id.clone();
        let is_user = message.role == Role::User;
        self.session.messages.push(message);
        self.session.touch();
        if is_user {
            self.session.auto_name();
        }
        id
    }

    pub fn push_user(&mut self, text: &str) -> String {
        self.append(Message::new(Role::User, text))
    }

    pub fn push_system(&mut self, text: &str) -> String {
        self.append(Message::new(Role::System, text))
    }

    pub fn push_tool(&mut self, text: &str) -> String {
        self.append(Message::new(Role::Tool, text))
    }

    /// Append the empty in-flight assistant message. Returns its id.
    pub fn begin_assistant(&mut self) -> String {
        self.append(Message::provisional())
    }

    /// Overwrite the in-flight assistant message's content.
    ///
    /// Returns false (and changes nothing) unless `id` is the last message
    /// and is still streaming.
    pub fn update_streaming(&mut self, id: &str, content: &str) -> bool {
        match self.streaming_message_mut(id) {
            Some(message) => {
                message.content.clear();
                message.content.push_str(content);
                true
            }
            None => false,
        }
    }

    /// Seal the in-flight assistant message with its display text and calls.
    pub fn finalize_assistant(
        &mut self,
        id: &str,
        content: String,
        tool_calls: Option<Vec<ToolCall>>,
    ) -> bool {
        let Some(message) = self.streaming_message_mut(id) else {
            return false;
        };
        message.content = content;
        message.tool_calls = tool_calls;
        message.is_streaming = false;
        self.session.touch();
        true
    }

    /// Update the attached tool calls of an already finalized message.
    pub fn set_tool_calls(&mut self, id: &str, tool_calls: Vec<ToolCall>) -> bool {
        match self.session.messages.iter_mut().rev().find(|m| m.id == id) {
            Some(message) => {
                message.tool_calls = Some(tool_calls);
                true
            }
            None => false,
        }
    }

    /// Drop the in-flight assistant message (used when generation produced
    /// nothing).
    pub fn discard_streaming(&mut self, id: &str) -> bool {
        if self.streaming_message_mut(id).is_none() {
            return false;
        }
        self.session.messages.pop();
        true
    }

    fn streaming_message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.session
            .messages
            .last_mut()
            .filter(|m| m.id == id && m.is_streaming)
    }

    /// Build the prompt context.
    ///
    /// Takes the most recent `max_messages` finished messages in
    /// chronological order, then drops the oldest while the total character
    /// count exceeds `char_budget`. The newest message is always kept.
    pub fn context_messages(&self) -> Vec<ChatMessage> {
        let finished: Vec<&Message> = self
            .session
            .messages
            .iter()
            .filter(|m| !m.is_streaming)
            .collect();

        let start = finished.len().saturating_sub(self.window.max_messages);
        let mut window = &finished[start..];

        let mut total: usize = window.iter().map(|m| m.content.chars().count()).sum();
        while total > self.window.char_budget && window.len() > 1 {
            total -= window[0].content.chars().count();
            window = &window[1..];
        }

        window
            .iter()
            .map(|m| ChatMessage::new(m.role, m.content.clone()))
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
