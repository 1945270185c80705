//! Terminal front end: a line-oriented chat loop over the agent orchestrator.
//!
//! Commands: `/new` starts a fresh session, `/sessions` lists saved ones,
//! `/open <id>` resumes one, `/quit` exits. Ctrl-C stops the running turn.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use pocketagent::agent_core::{
    AgentEvent, ContextWindow, Orchestrator, Session, SessionStore, ToolRouter,
};
use pocketagent::config;
use pocketagent::inference::InferenceClient;
use pocketagent::sandbox::SandboxStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pocketagent::init_tracing(&pocketagent::data_dir().join("logs"))
        .context("failed to initialize logging")?;
    let config = config::load_or_default().context("failed to load config")?;

    let sandbox_root = config.sandbox_root();
    let store = SandboxStore::open(&sandbox_root)
        .with_context(|| format!("failed to open sandbox at {}", sandbox_root.display()))?
        .with_search_limits(
            config.store.search_result_limit,
            config.store.search_snippet_chars,
        );
    let store = Arc::new(store);

    let sessions = SessionStore::open(store.chats_dir()).context("failed to open chats dir")?;
    if let Err(e) = sessions.cleanup_empty_sessions() {
        tracing::warn!(error = %e, "empty session cleanup failed");
    }

    let client = InferenceClient::from_settings(config.model.clone())
        .context("invalid model settings")?;
    tracing::info!(
        base_url = %client.base_url(),
        model = %client.model_name(),
        sandbox = %sandbox_root.display(),
        "agent ready"
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let router =
        ToolRouter::new(store).with_max_result_chars(config.agent.max_tool_result_chars);
    let mut orchestrator = Orchestrator::new(Arc::new(client), router, Session::new())
        .with_session_store(sessions.clone())
        .with_max_steps(config.agent.max_steps)
        .with_context_window(ContextWindow {
            max_messages: config.agent.history_messages,
            char_budget: config.agent.history_char_budget,
        })
        .with_events(tx);

    tokio::spawn(render_events(rx));

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    println!("PocketAgent. Sandbox: {}", sandbox_root.display());
    println!("Type a message, or /new, /sessions, /open <id>, /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/new" => {
                orchestrator.switch_session(Session::new());
                println!("Started a new session.");
            }
            "/sessions" => match sessions.list_sessions() {
                Ok(list) if list.is_empty() => println!("No saved sessions."),
                Ok(list) => {
                    for s in list {
                        let pin = if s.pinned { "*" } else { " " };
                        println!(
                            "{pin} {}  {}  ({} messages)  {}",
                            s.id, s.name, s.message_count, s.preview
                        );
                    }
                }
                Err(e) => eprintln!("Could not list sessions: {e}"),
            },
            _ if line.starts_with("/open ") => {
                let id = line["/open ".len()..].trim();
                match sessions.load(id) {
                    Ok(session) => {
                        let name = session.name.clone();
                        orchestrator.switch_session(session);
                        println!("Resumed \"{name}\".");
                    }
                    Err(e) => eprintln!("{e}"),
                }
            }
            _ => {
                let outcome = orchestrator.run_turn(line).await;
                tracing::debug!(?outcome, "turn complete");
                println!();
            }
        }
    }

    Ok(())
}

fn prompt_marker() {
    print!("\n> ");
    let _ = std::io::stdout().flush();
}

/// Print streaming progress as it arrives. Fragments are already free of
/// tool directives.
async fn render_events(mut rx: mpsc::UnboundedReceiver<AgentEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::Fragment { text, .. } => {
                let _ = write!(stdout, "{text}");
            }
            AgentEvent::ToolStarted { name, .. } => {
                let _ = write!(stdout, "\n  [running {name}]");
            }
            AgentEvent::ToolFinished { name, success, .. } => {
                let status = if success { "ok" } else { "failed" };
                let _ = writeln!(stdout, " [{name} {status}]");
            }
            AgentEvent::StepLimitReached { max_steps } => {
                let _ = writeln!(stdout, "\n  [stopped after {max_steps} tool steps]");
            }
            AgentEvent::TurnFinished { outcome } => {
                tracing::debug!(reason = ?outcome.reason, steps = outcome.steps, "turn finished");
            }
            AgentEvent::StepStarted { .. } | AgentEvent::AssistantFinalized { .. } => {}
        }
        let _ = stdout.flush();
    }
}
