//! Tool call parsing — extracts `<tool>…</tool>` directives from model text.
//!
//! Wire format:
//!
//! ```text
//! <tool>create_file|path=notes/a.md|content=hello</tool>
//! ```
//!
//! The first `|`-separated segment is the tool name; every following segment
//! is `key=value`, split on the first `=` only so values may themselves
//! contain `=`. A segment without `=` is glued back onto the previous value
//! with the `|` it was split on, which keeps markdown tables intact in file
//! content.
//!
//! Directives whose name is not a registered [`ToolKind`], or that lack a
//! required key, are dropped silently. Parsing never fails.

use std::collections::BTreeMap;

use super::types::ToolCall;

const OPEN: &str = "<tool>";
const CLOSE: &str = "</tool>";

// ─── Tool Kinds ──────────────────────────────────────────────────────────────

/// Registered tool kinds and their parameter contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    CreateFile,
    ReadFile,
    EditFile,
    DeleteFile,
    ListFiles,
    CreateMemory,
    CreateTask,
    SearchFiles,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::CreateFile,
        ToolKind::ReadFile,
        ToolKind::EditFile,
        ToolKind::DeleteFile,
        ToolKind::ListFiles,
        ToolKind::CreateMemory,
        ToolKind::CreateTask,
        ToolKind::SearchFiles,
    ];

    /// Wire name used in directives.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::CreateFile => "create_file",
            ToolKind::ReadFile => "read_file",
            ToolKind::EditFile => "edit_file",
            ToolKind::DeleteFile => "delete_file",
            ToolKind::ListFiles => "list_files",
            ToolKind::CreateMemory => "create_memory",
            ToolKind::CreateTask => "create_task",
            ToolKind::SearchFiles => "search_files",
        }
    }

    /// Exact (case-sensitive) lookup by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            ToolKind::CreateFile | ToolKind::EditFile => &["path", "content"],
            ToolKind::ReadFile | ToolKind::DeleteFile => &["path"],
            ToolKind::ListFiles => &["directory"],
            ToolKind::CreateMemory => &["title", "content"],
            ToolKind::CreateTask => &["title"],
            ToolKind::SearchFiles => &["query"],
        }
    }

    pub fn optional_params(self) -> &'static [&'static str] {
        match self {
            ToolKind::CreateTask => &["due", "details"],
            _ => &[],
        }
    }

    /// One-line description for the system prompt.
    pub fn description(self) -> &'static str {
        match self {
            ToolKind::CreateFile => "write a new file, creating parent directories",
            ToolKind::ReadFile => "return the contents of a file",
            ToolKind::EditFile => "overwrite an existing file (fails if it does not exist)",
            ToolKind::DeleteFile => "remove a file",
            ToolKind::ListFiles => "list one directory's children (empty directory = root)",
            ToolKind::CreateMemory => "save a titled note under memory/",
            ToolKind::CreateTask => "record a task under tasks/",
            ToolKind::SearchFiles => "case-insensitive search across text and markdown files",
        }
    }

    /// Whether executing this tool changes the sandbox.
    pub fn is_mutating(self) -> bool {
        !matches!(
            self,
            ToolKind::ReadFile | ToolKind::ListFiles | ToolKind::SearchFiles
        )
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Scanner ─────────────────────────────────────────────────────────────────

/// Byte offsets of one complete directive.
#[derive(Debug, Clone, Copy)]
struct Span {
    /// Start of the outermost `<tool>` that this span swallows.
    start: usize,
    body_start: usize,
    body_end: usize,
    /// End of `</tool>`.
    end: usize,
}

/// Find complete directives left to right.
///
/// The body runs to the first `</tool>`. If another `<tool>` appears before
/// that close marker, the innermost opener is taken as the body start, so a
/// stray unclosed opener cannot swallow a valid directive that follows it.
fn scan(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut pos = 0;

    while let Some(rel) = text[pos..].find(OPEN) {
        let start = pos + rel;
        let Some(close_rel) = text[start + OPEN.len()..].find(CLOSE) else {
            break;
        };
        let body_end = start + OPEN.len() + close_rel;
        let inner_open = text[start..body_end].rfind(OPEN).map(|i| start + i);
        let body_start = inner_open.unwrap_or(start) + OPEN.len();
        let end = body_end + CLOSE.len();

        spans.push(Span {
            start,
            body_start,
            body_end,
            end,
        });
        pos = end;
    }

    spans
}

/// Parse one directive body (`name|k=v|…`). `None` means "drop silently".
fn parse_body(body: &str) -> Option<ToolCall> {
    let mut segments = body.split('|');
    let name = segments.next()?.trim();

    let Some(kind) = ToolKind::from_name(name) else {
        tracing::debug!(name = %name, "dropping directive with unknown tool name");
        return None;
    };

    // Keys in first-seen order; the first occurrence of a key wins.
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut last_was_duplicate = false;
    for segment in segments {
        match segment.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                let key = key.trim();
                last_was_duplicate = pairs.iter().any(|(k, _)| k == key);
                if !last_was_duplicate {
                    pairs.push((key.to_string(), value.to_string()));
                }
            }
            _ => {
                if let (Some((_, value)), false) = (pairs.last_mut(), last_was_duplicate) {
                    value.push('|');
                    value.push_str(segment);
                }
            }
        }
    }

    let parameters: BTreeMap<String, String> = pairs
        .into_iter()
        .map(|(k, v)| (k, v.trim().to_string()))
        .collect();

    if let Some(missing) = kind
        .required_params()
        .iter()
        .find(|key| !parameters.contains_key(**key))
    {
        tracing::debug!(tool = %kind, missing = %missing, "dropping directive missing required parameter");
        return None;
    }

    Some(ToolCall::new(kind.name(), parameters))
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Extract all valid tool calls, in left-to-right order of appearance.
pub fn parse(text: &str) -> Vec<ToolCall> {
    scan(text)
        .into_iter()
        .filter_map(|span| parse_body(&text[span.body_start..span.body_end]))
        .collect()
}

/// Remove every directive (and any unterminated trailing one), then tidy
/// whitespace: trailing spaces per line, runs of blank lines, outer blanks.
pub fn strip(text: &str) -> String {
    let mut current = text.to_string();

    while current.contains(OPEN) {
        let mut out = String::with_capacity(current.len());
        let mut pos = 0;
        for span in scan(&current) {
            out.push_str(&current[pos..span.start]);
            pos = span.end;
        }
        let rest = &current[pos..];
        match rest.find(OPEN) {
            // Unterminated directive: everything from the opener is dropped.
            Some(open) => out.push_str(&rest[..open]),
            None => out.push_str(rest),
        }
        current = out;
    }

    normalize_whitespace(&current)
}

/// True when the last `<tool>` opener has no `</tool>` after it, i.e. the
/// text is still mid-directive.
pub fn has_unterminated_directive(text: &str) -> bool {
    text.rfind(OPEN)
        .map(|open| !text[open + OPEN.len()..].contains(CLOSE))
        .unwrap_or(false)
}

/// Incremental user-visible view of streamed model text.
///
/// Text inside an open directive, or a trailing fragment that may still
/// grow into `<tool>`, is held back until it settles.
#[derive(Debug, Default)]
pub struct DisplayFilter {
    raw: String,
    shown: String,
}

impl DisplayFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything released so far.
    pub fn shown(&self) -> &str {
        &self.shown
    }

    /// Feed one fragment. Returns the newly visible text, if any.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.raw.push_str(fragment);
        if has_unterminated_directive(&self.raw) {
            return None;
        }
        let settled = &self.raw[..self.raw.len() - partial_opener_len(&self.raw)];
        let visible = strip(settled);
        let delta = visible.strip_prefix(self.shown.as_str())?.to_string();
        if delta.is_empty() {
            return None;
        }
        self.shown = visible;
        Some(delta)
    }
}

/// Length of a trailing proper prefix of `<tool>`, such as `<to`.
fn partial_opener_len(text: &str) -> usize {
    (1..OPEN.len())
        .rev()
        .find(|&n| text.ends_with(&OPEN[..n]))
        .unwrap_or(0)
}

fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut blank_run = false;
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() {
            if !blank_run && !lines.is_empty() {
                lines.push("");
            }
            blank_run = true;
        } else {
            lines.push(line);
            blank_run = false;
        }
    }
    lines.join("\n").trim().to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
