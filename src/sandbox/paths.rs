//! Path sanitization for the sandbox root.
//!
//! Every tool-supplied path goes through [`sanitize`] before it is joined to
//! the root. The rules are applied in a fixed order:
//!
//! 1. remove every literal `..` substring
//! 2. collapse doubled separators (`//` → `/`) until none remain
//! 3. strip leading separators
//!
//! A run of `k` dots becomes `k mod 2` dots after step 1, so no `..` can
//! survive, and step 3 guarantees the result is relative. Joining the result
//! to the root therefore never leaves the root through ASCII traversal.

use std::path::{Path, PathBuf};

/// Fixed subdirectories created under every sandbox root.
pub const SUBDIRECTORIES: [&str; 4] = ["memory", "tasks", "notes", "chats"];

/// Hidden subdirectory (model weights) excluded from listing and search.
pub const HIDDEN_DIRECTORY: &str = "models";

/// Sanitize a tool-supplied relative path.
pub fn sanitize(path: &str) -> String {
    let mut cleaned = path.replace("..", "");
    while cleaned.contains("//") {
        cleaned = cleaned.replace("//", "/");
    }
    cleaned.trim_start_matches('/').to_string()
}

/// Resolve a sanitized relative path against `root`.
pub fn resolve(root: &Path, sanitized: &str) -> PathBuf {
    if sanitized.is_empty() {
        root.to_path_buf()
    } else {
        root.join(sanitized)
    }
}

/// Whether the sanitized path points into the hidden directory.
pub fn is_hidden_path(sanitized: &str) -> bool {
    let first = sanitized
        .split('/')
        .find(|segment| !segment.is_empty() && *segment != ".")
        .unwrap_or("");
    first == HIDDEN_DIRECTORY
}

/// Whether a directory entry name should never be shown (dot-files).
pub(crate) fn is_dot_entry(name: &str) -> bool {
    name.starts_with('.')
}
