//! ToolRouter — executes parsed tool calls against the sandbox store.
//!
//! Execution never fails from the caller's point of view: every problem is
//! turned into an `"Error: <reason>"` result string that is fed back to the
//! model. Results longer than the configured cap are truncated with a
//! visible marker.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::inference::tool_call_parser::ToolKind;
use crate::inference::types::ToolCall;
use crate::sandbox::{FileEntry, SandboxStore, StoreError};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Maximum characters of a single tool result fed back to the model.
pub const MAX_TOOL_RESULT_CHARS: usize = 6_000;

/// Maximum slug length for memory/task file names.
const MAX_SLUG_CHARS: usize = 60;

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Why a single tool call could not be carried out.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("{tool} is missing required parameter '{key}'")]
    MissingParameter { tool: String, key: String },

    #[error("tool task failed: {reason}")]
    TaskFailed { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Text result of one call plus whether it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub output: String,
    pub success: bool,
}

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Dispatches tool calls to the sandbox store.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    store: Arc<SandboxStore>,
    max_result_chars: usize,
}

impl ToolRouter {
    pub fn new(store: Arc<SandboxStore>) -> Self {
        Self {
            store,
            max_result_chars: MAX_TOOL_RESULT_CHARS,
        }
    }

    pub fn with_max_result_chars(mut self, max_chars: usize) -> Self {
        self.max_result_chars = max_chars.max(1);
        self
    }

    pub fn store(&self) -> &Arc<SandboxStore> {
        &self.store
    }

    /// Run one call on the blocking pool and wait for it.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutcome {
        let router = self.clone();
        let owned = call.clone();
        let result = tokio::task::spawn_blocking(move || router.run(&owned))
            .await
            .unwrap_or_else(|e| {
                Err(ToolError::TaskFailed {
                    reason: e.to_string(),
                })
            });
        self.finish(call, result)
    }

    /// Run one call on the current thread.
    pub fn execute(&self, call: &ToolCall) -> ToolOutcome {
        let result = self.run(call);
        self.finish(call, result)
    }

    fn finish(&self, call: &ToolCall, result: Result<String, ToolError>) -> ToolOutcome {
        match result {
            Ok(output) => {
                let mutating = ToolKind::from_name(&call.name).is_some_and(ToolKind::is_mutating);
                if mutating {
                    tracing::info!(
                        tool = %call.name,
                        call_id = %call.id,
                        revision = self.store.revision(),
                        "tool changed the sandbox"
                    );
                } else {
                    tracing::info!(tool = %call.name, call_id = %call.id, "tool succeeded");
                }
                ToolOutcome {
                    output: truncate_tool_result(&output, &call.name, self.max_result_chars),
                    success: true,
                }
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool failed");
                ToolOutcome {
                    output: truncate_tool_result(
                        &format!("Error: {e}"),
                        &call.name,
                        self.max_result_chars,
                    ),
                    success: false,
                }
            }
        }
    }

    fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let kind = ToolKind::from_name(&call.name).ok_or_else(|| ToolError::UnknownTool {
            name: call.name.clone(),
        })?;

        match kind {
            ToolKind::CreateFile => Ok(self
                .store
                .create(required(call, "path")?, required(call, "content")?)?),
            ToolKind::ReadFile => Ok(self.store.read(required(call, "path")?)?),
            ToolKind::EditFile => Ok(self
                .store
                .edit(required(call, "path")?, required(call, "content")?)?),
            ToolKind::DeleteFile => Ok(self.store.delete(required(call, "path")?)?),
            ToolKind::ListFiles => {
                let directory = required(call, "directory")?;
                let entries = self.store.list(directory)?;
                Ok(format_listing(directory, &entries))
            }
            ToolKind::SearchFiles => {
                let query = required(call, "query")?;
                let matches = self.store.search(query)?;
                Ok(format_search(query, &matches))
            }
            ToolKind::CreateMemory => self.create_memory(call),
            ToolKind::CreateTask => self.create_task(call),
        }
    }

    fn create_memory(&self, call: &ToolCall) -> Result<String, ToolError> {
        let title = required(call, "title")?.trim();
        let content = required(call, "content")?;

        let path = self.unique_path("memory", title);
        let body = format!("# {title}\n\n{content}\n");
        self.store.create(&path, &body)?;
        Ok(format!("Saved memory: {path}"))
    }

    fn create_task(&self, call: &ToolCall) -> Result<String, ToolError> {
        let title = required(call, "title")?.trim();
        let due = call.param("due").map(str::trim).filter(|d| !d.is_empty());
        let details = call.param("details").map(str::trim).filter(|d| !d.is_empty());

        let mut body = format!("# {title}\n\n- Status: open\n");
        if let Some(due) = due {
            body.push_str(&format!("- Due: {due}\n"));
        }
        body.push_str(&format!("- Created: {}\n", Utc::now().to_rfc3339()));
        if let Some(details) = details {
            body.push_str(&format!("\n{details}\n"));
        }

        let path = self.unique_path("tasks", title);
        self.store.create(&path, &body)?;
        Ok(match due {
            Some(due) => format!("Created task: {path} (due {due})"),
            None => format!("Created task: {path}"),
        })
    }

    /// `<dir>/<slug>.md`, with a timestamp suffix if that file already exists.
    fn unique_path(&self, dir: &str, title: &str) -> String {
        let slug = slugify(title);
        let path = format!("{dir}/{slug}.md");
        if !self.store.exists(&path) {
            return path;
        }
        format!("{dir}/{slug}-{}.md", Utc::now().format("%Y%m%d%H%M%S%3f"))
    }
}

// ─── Free Functions ─────────────────────────────────────────────────────────

fn required<'a>(call: &'a ToolCall, key: &str) -> Result<&'a str, ToolError> {
    call.param(key).ok_or_else(|| ToolError::MissingParameter {
        tool: call.name.clone(),
        key: key.to_string(),
    })
}

/// Wrap each result as `<result>\n…\n</result>`, joined by newlines.
pub fn format_feedback<S: AsRef<str>>(results: &[S]) -> String {
    results
        .iter()
        .map(|r| format!("<result>\n{}\n</result>", r.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cap a tool result at `max_chars` characters with a visible marker.
pub fn truncate_tool_result(result: &str, tool_name: &str, max_chars: usize) -> String {
    let total = result.chars().count();
    if total <= max_chars {
        return result.to_string();
    }

    let truncated: String = result.chars().take(max_chars).collect();
    tracing::warn!(
        tool = %tool_name,
        original_len = total,
        truncated_to = max_chars,
        "tool result truncated"
    );
    format!("{truncated}\n\n[... truncated: showing first {max_chars} of {total} chars]")
}

fn format_listing(directory: &str, entries: &[FileEntry]) -> String {
    if entries.is_empty() {
        return "(empty directory)".to_string();
    }
    let label = match directory.trim_matches('/') {
        "" => "/",
        other => other,
    };
    let mut out = format!("Contents of {label}:");
    for entry in entries {
        if entry.is_dir() {
            out.push_str(&format!("\n[dir] {}/", entry.name));
        } else {
            out.push_str(&format!("\n[file] {} ({} bytes)", entry.name, entry.size));
        }
    }
    out
}

fn format_search(query: &str, matches: &[crate::sandbox::SearchMatch]) -> String {
    if matches.is_empty() {
        return format!("No matches found for '{query}'");
    }
    let noun = if matches.len() == 1 { "match" } else { "matches" };
    let mut out = format!("Found {} {noun} for '{query}':", matches.len());
    for m in matches {
        out.push_str(&format!("\n{}: {}", m.path, m.line));
    }
    out
}

/// Lowercase ASCII slug: alphanumerics kept, other runs become `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_end_matches('-').chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
