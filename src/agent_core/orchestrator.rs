//! Agent orchestrator: generation → parse → execute → feed back, under a
//! hard step bound.
//!
//! One call to [`Orchestrator::run_turn`] drives a full user turn:
//!
//! 1. **Generate** — build the trimmed context from the ledger, append an
//!    in-flight assistant message and stream fragments into it
//! 2. **Parse** — extract `<tool>` directives from the finished text and
//!    replace the message content with the directive-free display text
//! 3. **Execute** — run the calls sequentially in parse order, then append
//!    one `tool` message holding every `<result>` block
//!
//! The loop repeats until a reply carries no tool calls, the step bound is
//! hit, the turn is cancelled, or generation fails. No failure escapes: the
//! worst outcome is a visible error in the conversation.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::inference::generation::GenerationPort;
use crate::inference::tool_call_parser::{parse, strip, DisplayFilter};
use crate::inference::types::{ToolCall, ToolCallStatus};

use super::conversation::{ContextWindow, Conversation};
use super::prompt::build_system_prompt;
use super::session_store::SessionStore;
use super::tool_router::{format_feedback, ToolRouter};
use super::types::{AgentEvent, AgentState, Session, TerminationReason, TurnOutcome};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default maximum tool-execution steps per user turn.
pub const DEFAULT_MAX_STEPS: usize = 4;

// ─── StopHandle ─────────────────────────────────────────────────────────────

/// Cancels whichever turn is currently running on an orchestrator.
///
/// Cloneable and usable from any task. Stopping between turns is a no-op:
/// each turn arms a fresh token.
#[derive(Debug, Clone)]
pub struct StopHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl StopHandle {
    pub fn stop(&self) {
        let token = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        token.cancel();
    }

    /// Cancel the running turn (if any) and install a fresh token for the
    /// next one.
    fn rearm(&self) -> CancellationToken {
        let mut token = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        token.cancel();
        *token = CancellationToken::new();
        token.clone()
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// Drives the agent loop for one session at a time.
pub struct Orchestrator {
    port: Arc<dyn GenerationPort>,
    router: ToolRouter,
    sessions: Option<SessionStore>,
    conversation: Conversation,
    window: ContextWindow,
    system_prompt: String,
    max_steps: usize,
    stop: StopHandle,
    state_tx: watch::Sender<AgentState>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

/// How one generation step ended.
struct Generated {
    text: String,
    cancelled: bool,
    failed: bool,
}

impl Orchestrator {
    pub fn new(port: Arc<dyn GenerationPort>, router: ToolRouter, session: Session) -> Self {
        let window = ContextWindow::default();
        let (state_tx, _) = watch::channel(AgentState::Idle);
        Self {
            port,
            router,
            sessions: None,
            conversation: Conversation::new(session, window),
            window,
            system_prompt: build_system_prompt(),
            max_steps: DEFAULT_MAX_STEPS,
            stop: StopHandle {
                current: Arc::new(Mutex::new(CancellationToken::new())),
            },
            state_tx,
            events: None,
        }
    }

    /// Persist the session after every step.
    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_context_window(mut self, window: ContextWindow) -> Self {
        self.window = window;
        let session = std::mem::take(&mut self.conversation).into_session();
        self.conversation = Conversation::new(session, window);
        self
    }

    /// Receive progress events on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Watch the loop state.
    pub fn subscribe_state(&self) -> watch::Receiver<AgentState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> AgentState {
        *self.state_tx.borrow()
    }

    pub fn session(&self) -> &Session {
        self.conversation.session()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Make `session` current, cancelling any in-flight turn.
    pub fn switch_session(&mut self, session: Session) -> Session {
        self.stop.rearm();
        let previous = std::mem::replace(
            &mut self.conversation,
            Conversation::new(session, self.window),
        );
        self.set_state(AgentState::Idle);
        previous.into_session()
    }

    // ─── Turn ───────────────────────────────────────────────────────────

    /// Run one user turn to completion.
    pub async fn run_turn(&mut self, user_text: &str) -> TurnOutcome {
        let token = self.stop.rearm();
        let session_id = self.conversation.session_id().to_string();

        self.conversation.push_user(user_text);
        self.persist();

        let mut steps = 0usize;
        let reason = loop {
            if token.is_cancelled() {
                break TerminationReason::Cancelled;
            }

            let step = steps + 1;
            self.set_state(AgentState::AwaitingGeneration { step });
            self.emit(AgentEvent::StepStarted { step });

            let context = self.conversation.context_messages();
            tracing::info!(
                session_id = %session_id,
                step,
                message_count = context.len(),
                total_content_chars = context.iter().map(|m| m.content.len()).sum::<usize>(),
                "=== AGENT LOOP STEP START ==="
            );

            let message_id = self.conversation.begin_assistant();
            let generated = self.generate(&message_id, context, &token).await;

            let mut calls = if generated.cancelled || generated.failed {
                Vec::new()
            } else {
                parse(&generated.text)
            };
            let display = strip(&generated.text);

            tracing::info!(
                session_id = %session_id,
                step,
                text_len = generated.text.len(),
                tool_calls_count = calls.len(),
                tool_names = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "=== MODEL RESPONSE ==="
            );

            if display.is_empty() && calls.is_empty() {
                self.conversation.discard_streaming(&message_id);
            } else {
                let attached = (!calls.is_empty()).then(|| calls.clone());
                self.conversation
                    .finalize_assistant(&message_id, display.clone(), attached);
                self.emit(AgentEvent::AssistantFinalized {
                    message_id: message_id.clone(),
                    content: display,
                });
            }

            if generated.cancelled {
                break TerminationReason::Cancelled;
            }
            if generated.failed {
                break TerminationReason::GenerationFailed;
            }
            if calls.is_empty() {
                break TerminationReason::NoMoreToolCalls;
            }

            if steps >= self.max_steps {
                self.halt_at_step_limit(&message_id, calls);
                break TerminationReason::StepLimitReached;
            }

            self.set_state(AgentState::ExecutingTools { step });
            let executed = self.execute_calls(&mut calls, &token).await;
            self.conversation.set_tool_calls(&message_id, calls);

            if !executed.is_empty() {
                self.conversation.push_tool(&format_feedback(&executed));
                steps += 1;
            }
            self.persist();

            if token.is_cancelled() {
                break TerminationReason::Cancelled;
            }
        };

        self.persist();

        let outcome = TurnOutcome { reason, steps };
        tracing::info!(
            session_id = %session_id,
            reason = ?outcome.reason,
            steps = outcome.steps,
            "agent turn finished"
        );
        self.set_state(AgentState::Terminated { reason });
        self.emit(AgentEvent::TurnFinished { outcome });
        outcome
    }

    /// Stream one generation into the in-flight message.
    async fn generate(
        &mut self,
        message_id: &str,
        context: Vec<crate::inference::types::ChatMessage>,
        token: &CancellationToken,
    ) -> Generated {
        let mut stream = self.port.generate(context, &self.system_prompt);
        let mut out = Generated {
            text: String::new(),
            cancelled: false,
            failed: false,
        };

        let mut display = DisplayFilter::new();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!(chars = out.text.len(), "generation cancelled");
                    out.cancelled = true;
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(fragment)) => {
                        out.text.push_str(&fragment);
                        if let Some(delta) = display.push(&fragment) {
                            self.conversation.update_streaming(message_id, display.shown());
                            self.emit(AgentEvent::Fragment {
                                message_id: message_id.to_string(),
                                text: delta,
                            });
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "generation failed");
                        if !out.text.trim().is_empty() {
                            out.text.push_str("\n\n");
                        }
                        out.text.push_str(&e.user_message());
                        self.conversation.update_streaming(message_id, &out.text);
                        out.failed = true;
                        break;
                    }
                    None => break,
                }
            }
        }

        out
    }

    /// Execute calls in order. Returns the result text of each executed call.
    async fn execute_calls(
        &mut self,
        calls: &mut [ToolCall],
        token: &CancellationToken,
    ) -> Vec<String> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls.iter_mut() {
            if token.is_cancelled() {
                call.status = ToolCallStatus::Failed;
                call.result = Some("Cancelled before execution".to_string());
                continue;
            }

            call.status = ToolCallStatus::Executing;
            self.emit(AgentEvent::ToolStarted {
                call_id: call.id.clone(),
                name: call.name.clone(),
            });

            let outcome = self.router.dispatch(call).await;
            call.status = if outcome.success {
                ToolCallStatus::Success
            } else {
                ToolCallStatus::Failed
            };
            call.result = Some(outcome.output.clone());
            self.emit(AgentEvent::ToolFinished {
                call_id: call.id.clone(),
                name: call.name.clone(),
                success: outcome.success,
            });
            results.push(outcome.output);
        }

        results
    }

    fn halt_at_step_limit(&mut self, message_id: &str, mut calls: Vec<ToolCall>) {
        tracing::warn!(
            max_steps = self.max_steps,
            pending_calls = calls.len(),
            "agent loop reached step limit, not executing further tool calls"
        );
        for call in &mut calls {
            call.status = ToolCallStatus::Failed;
            call.result = Some("Not executed: step limit reached".to_string());
        }
        self.conversation.set_tool_calls(message_id, calls);
        self.conversation.push_system(&format!(
            "Agent loop reached safety step limit ({} steps); remaining tool calls were not executed.",
            self.max_steps
        ));
        self.emit(AgentEvent::StepLimitReached {
            max_steps: self.max_steps,
        });
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    /// Best-effort snapshot; failures are logged, never raised.
    fn persist(&self) {
        let Some(store) = &self.sessions else {
            return;
        };
        if let Err(e) = store.save(self.conversation.session()) {
            tracing::warn!(
                session_id = %self.conversation.session_id(),
                error = %e,
                "failed to persist session"
            );
        }
    }

    fn set_state(&self, state: AgentState) {
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::errors::InferenceError;
    use crate::inference::generation::FragmentStream;
    use crate::inference::types::{ChatMessage, Role};
    use crate::sandbox::SandboxStore;
    use futures::stream;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    type Reply = Vec<Result<String, InferenceError>>;

    /// Replays scripted replies, then repeats `fallback` forever.
    struct ScriptedPort {
        replies: Mutex<VecDeque<Reply>>,
        fallback: Option<String>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedPort {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                fallback: None,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn repeating(text: &str) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                fallback: Some(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl GenerationPort for ScriptedPort {
        fn generate(&self, history: Vec<ChatMessage>, _system_prompt: &str) -> FragmentStream {
            self.seen.lock().unwrap().push(history);
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
                self.fallback
                    .clone()
                    .map(|t| vec![Ok(t)])
                    .unwrap_or_default()
            });
            stream::iter(reply).boxed()
        }
    }

    /// Emits one fragment, then never finishes.
    struct HangingPort;

    impl GenerationPort for HangingPort {
        fn generate(&self, _history: Vec<ChatMessage>, _system_prompt: &str) -> FragmentStream {
            stream::iter(vec![Ok("Working on it".to_string())])
                .chain(stream::pending())
                .boxed()
        }
    }

    fn ok(parts: &[&str]) -> Reply {
        parts.iter().map(|p| Ok(p.to_string())).collect()
    }

    fn setup(port: Arc<dyn GenerationPort>) -> (TempDir, Orchestrator) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SandboxStore::open(dir.path().join("sandbox")).unwrap());
        let sessions = SessionStore::open(store.chats_dir()).unwrap();
        let orchestrator = Orchestrator::new(port, ToolRouter::new(store), Session::new())
            .with_session_store(sessions);
        (dir, orchestrator)
    }

    fn roles(orch: &Orchestrator) -> Vec<Role> {
        orch.session().messages.iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn test_tool_then_prose_terminates_with_no_more_tool_calls() {
        let port = ScriptedPort::new(vec![
            ok(&["Saving. <tool>create_file|path=notes/a.md", "|content=hi</tool>"]),
            ok(&["Done, saved notes/a.md."]),
        ]);
        let (_dir, mut orch) = setup(port.clone());

        let outcome = orch.run_turn("save hi").await;
        assert_eq!(outcome.reason, TerminationReason::NoMoreToolCalls);
        assert_eq!(outcome.steps, 1);
        assert_eq!(
            roles(&orch),
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );

        let messages = &orch.session().messages;
        assert_eq!(messages[1].content, "Saving.");
        let calls = messages[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].status, ToolCallStatus::Success);
        assert_eq!(messages[2].content, "<result>\nCreated file: notes/a.md\n</result>");
        assert_eq!(messages[3].content, "Done, saved notes/a.md.");
        assert!(messages.iter().all(|m| !m.is_streaming));

        // The second generation saw the tool feedback last.
        let seen = port.seen.lock().unwrap();
        assert_eq!(seen[1].last().unwrap().role, Role::Tool);
        assert_eq!(orch.state(), AgentState::Terminated {
            reason: TerminationReason::NoMoreToolCalls
        });
    }

    #[tokio::test]
    async fn test_step_limit_bounds_execution() {
        let port = ScriptedPort::repeating("<tool>list_files|directory=notes</tool>");
        let (_dir, orch) = setup(port.clone());
        let mut orch = orch.with_max_steps(4);

        let outcome = orch.run_turn("loop forever").await;
        assert_eq!(outcome.reason, TerminationReason::StepLimitReached);
        assert_eq!(outcome.steps, 4);
        assert_eq!(port.calls(), 5);

        let messages = &orch.session().messages;
        let tool_messages = messages.iter().filter(|m| m.role == Role::Tool).count();
        let warnings: Vec<_> = messages.iter().filter(|m| m.role == Role::System).collect();
        assert_eq!(tool_messages, 4);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0]
            .content
            .starts_with("Agent loop reached safety step limit"));
        assert_eq!(messages.last().unwrap().role, Role::System);

        let unexecuted = messages[messages.len() - 2].tool_calls.as_ref().unwrap();
        assert_eq!(unexecuted[0].status, ToolCallStatus::Failed);
    }

    #[tokio::test]
    async fn test_calls_in_one_step_run_in_order() {
        let port = ScriptedPort::new(vec![ok(&[
            "<tool>create_file|path=notes/x.md|content=hello</tool><tool>read_file|path=notes/x.md</tool>",
        ])]);
        let (_dir, mut orch) = setup(port);

        orch.run_turn("write and read").await;
        let tool_msg = orch
            .session()
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(
            tool_msg.content,
            "<result>\nCreated file: notes/x.md\n</result>\n<result>\nhello\n</result>"
        );
    }

    #[tokio::test]
    async fn test_execution_errors_are_fed_back() {
        let port = ScriptedPort::new(vec![
            ok(&["<tool>read_file|path=notes/missing.md</tool>"]),
            ok(&["That file does not exist."]),
        ]);
        let (_dir, mut orch) = setup(port);

        let outcome = orch.run_turn("read it").await;
        assert_eq!(outcome.reason, TerminationReason::NoMoreToolCalls);
        let tool_msg = &orch.session().messages[2];
        assert_eq!(tool_msg.content, "<result>\nError: not found: notes/missing.md\n</result>");
        let call = &orch.session().messages[1].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.status, ToolCallStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_generation_removes_placeholder() {
        let port = ScriptedPort::new(vec![ok(&["  ", "\n"])]);
        let (_dir, mut orch) = setup(port);

        let outcome = orch.run_turn("hello?").await;
        assert_eq!(outcome.reason, TerminationReason::NoMoreToolCalls);
        assert_eq!(roles(&orch), vec![Role::User]);
    }

    #[tokio::test]
    async fn test_unknown_tool_only_reply_is_not_kept() {
        let port = ScriptedPort::new(vec![ok(&["<tool>delete_everything|x=1</tool>"])]);
        let (_dir, mut orch) = setup(port);

        let outcome = orch.run_turn("do it").await;
        assert_eq!(outcome.reason, TerminationReason::NoMoreToolCalls);
        assert_eq!(roles(&orch), vec![Role::User]);
    }

    #[tokio::test]
    async fn test_generation_error_is_folded_into_message() {
        let port = ScriptedPort::new(vec![vec![
            Ok("Partial answer".to_string()),
            Err(InferenceError::ConnectionFailed {
                endpoint: "http://localhost".into(),
                reason: "refused".into(),
            }),
        ]]);
        let (_dir, mut orch) = setup(port);

        let outcome = orch.run_turn("hi").await;
        assert_eq!(outcome.reason, TerminationReason::GenerationFailed);
        let reply = &orch.session().messages[1];
        assert_eq!(reply.role, Role::Assistant);
        assert!(reply.content.starts_with("Partial answer\n\n[Generation error:"));
    }

    #[tokio::test]
    async fn test_stop_handle_cancels_stream_and_keeps_partial_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_dir, orch) = setup(Arc::new(HangingPort));
        let mut orch = orch.with_events(tx);
        let stop = orch.stop_handle();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(event, AgentEvent::Fragment { .. }) {
                    stop.stop();
                }
            }
        });

        let outcome = orch.run_turn("long task").await;
        assert_eq!(outcome.reason, TerminationReason::Cancelled);
        let reply = &orch.session().messages[1];
        assert_eq!(reply.content, "Working on it");
        assert!(!reply.is_streaming);
    }

    #[tokio::test]
    async fn test_stop_during_tools_skips_remaining_calls() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let port = ScriptedPort::new(vec![ok(&[
            "<tool>create_file|path=notes/first.md|content=1</tool>\
             <tool>create_file|path=notes/second.md|content=2</tool>",
        ])]);
        let (_dir, orch) = setup(port.clone());
        let mut orch = orch.with_events(tx);
        let stop = orch.stop_handle();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(event, AgentEvent::ToolStarted { .. }) {
                    stop.stop();
                }
            }
        });

        let outcome = orch.run_turn("write both").await;
        assert_eq!(outcome.reason, TerminationReason::Cancelled);
        assert_eq!(port.calls(), 1);

        let store = orch.router.store().clone();
        assert_eq!(store.read("notes/first.md").unwrap(), "1");
        assert!(!store.exists("notes/second.md"));

        let calls = orch.session().messages[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].status, ToolCallStatus::Success);
        assert_eq!(calls[1].status, ToolCallStatus::Failed);
        assert_eq!(calls[1].result.as_deref(), Some("Cancelled before execution"));

        // The applied write is reported, not rolled back.
        let feedback = &orch.session().messages[2];
        assert_eq!(feedback.role, Role::Tool);
        assert_eq!(feedback.content, "<result>\nCreated file: notes/first.md\n</result>");
    }

    #[tokio::test]
    async fn test_fragment_events_never_carry_directives() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let port = ScriptedPort::new(vec![
            ok(&["Saving. <to", "ol>create_file|path=notes/a.md", "|content=hi</tool>", " ok"]),
            ok(&["Done."]),
        ]);
        let (_dir, orch) = setup(port);
        let mut orch = orch.with_events(tx);

        orch.run_turn("save hi").await;
        drop(orch);

        let mut streamed = String::new();
        while let Some(event) = rx.recv().await {
            if let AgentEvent::Fragment { text, .. } = event {
                assert!(!text.contains("<tool>") && !text.contains('<'), "{text:?}");
                streamed.push_str(&text);
            }
        }
        assert_eq!(streamed, "Saving.  okDone.");
    }

    #[tokio::test]
    async fn test_stop_between_turns_does_not_cancel_next_turn() {
        let port = ScriptedPort::new(vec![ok(&["hello"])]);
        let (_dir, mut orch) = setup(port);
        orch.stop_handle().stop();

        let outcome = orch.run_turn("hi").await;
        assert_eq!(outcome.reason, TerminationReason::NoMoreToolCalls);
    }

    #[tokio::test]
    async fn test_session_persisted_after_turn() {
        let port = ScriptedPort::new(vec![
            ok(&["<tool>create_memory|title=Tea|content=Oolong</tool>"]),
            ok(&["Noted."]),
        ]);
        let (dir, mut orch) = setup(port);
        orch.run_turn("Remember I like oolong").await;

        let sessions =
            SessionStore::open(dir.path().join("sandbox").join("chats")).unwrap();
        let loaded = sessions.load(&orch.session().id).unwrap();
        assert_eq!(loaded.messages.len(), orch.session().messages.len());
        assert_eq!(loaded.name, "Remember I like oolong");
        assert!(loaded.updated_at >= loaded.created_at);
    }

    #[tokio::test]
    async fn test_events_cover_turn() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let port = ScriptedPort::new(vec![
            ok(&["<tool>list_files|directory=</tool>"]),
            ok(&["Here you go."]),
        ]);
        let (_dir, orch) = setup(port);
        let mut orch = orch.with_events(tx);

        orch.run_turn("what's there?").await;
        drop(orch);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(match event {
                AgentEvent::StepStarted { .. } => "step",
                AgentEvent::Fragment { .. } => "fragment",
                AgentEvent::AssistantFinalized { .. } => "final",
                AgentEvent::ToolStarted { .. } => "tool_start",
                AgentEvent::ToolFinished { success, .. } => {
                    assert!(success);
                    "tool_end"
                }
                AgentEvent::StepLimitReached { .. } => "limit",
                AgentEvent::TurnFinished { .. } => "done",
            });
        }
        // A directive-only reply releases no visible fragment.
        assert_eq!(
            kinds,
            vec![
                "step", "final", "tool_start", "tool_end", "step", "fragment", "final", "done"
            ]
        );
    }

    #[tokio::test]
    async fn test_switch_session_returns_previous() {
        let port = ScriptedPort::new(vec![ok(&["hi there"])]);
        let (_dir, mut orch) = setup(port);
        orch.run_turn("hello").await;
        let first_id = orch.session().id.clone();

        let previous = orch.switch_session(Session::new());
        assert_eq!(previous.id, first_id);
        assert!(orch.session().messages.is_empty());
        assert_eq!(orch.state(), AgentState::Idle);
    }
}
