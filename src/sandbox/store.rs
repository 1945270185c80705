//! SandboxStore: file CRUD, listing, and text search confined to one root.
//!
//! All operations are synchronous. Paths are sanitized with
//! [`super::paths::sanitize`] and resolved against the fixed root before any
//! filesystem access. Successful mutations return a one-line status string
//! suitable for direct inclusion in tool-call feedback.
//!
//! Writes go through a temp file + rename so that independent sessions
//! sharing one root never observe half-written files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::errors::StoreError;
use super::paths::{
    is_dot_entry, is_hidden_path, resolve, sanitize, HIDDEN_DIRECTORY, SUBDIRECTORIES,
};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default maximum number of search matches returned.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Default number of characters kept from a matching line.
pub const DEFAULT_SNIPPET_CHARS: usize = 100;

/// File extensions considered text/markdown for search.
const SEARCHABLE_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

// ─── Types ──────────────────────────────────────────────────────────────────

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Dir,
    File,
}

/// A single file/directory entry, with a root-relative path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub entry_type: EntryType,
    pub size: u64,
    /// RFC 3339 modification time (empty if the platform does not report it).
    pub modified: String,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Dir
    }
}

/// One search hit: the file and a prefix of its first matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub path: String,
    pub line: String,
}

// ─── SandboxStore ───────────────────────────────────────────────────────────

/// File store confined to a single root directory.
///
/// Safe to share across sessions (`Arc<SandboxStore>`); the only interior
/// state is the cached directory tree and its revision counter.
#[derive(Debug)]
pub struct SandboxStore {
    root: PathBuf,
    search_limit: usize,
    snippet_chars: usize,
    revision: AtomicU64,
    tree_cache: Mutex<Option<Arc<Vec<FileEntry>>>>,
}

impl SandboxStore {
    /// Open (or create) a sandbox at `root`, creating the fixed subdirectories.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let root_display = root.display().to_string();

        for sub in SUBDIRECTORIES.iter().chain(std::iter::once(&HIDDEN_DIRECTORY)) {
            fs::create_dir_all(root.join(sub))
                .map_err(|e| StoreError::from_io(&root_display, e))?;
        }

        tracing::info!(root = %root_display, "sandbox store opened");

        Ok(Self {
            root,
            search_limit: DEFAULT_SEARCH_LIMIT,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
            revision: AtomicU64::new(0),
            tree_cache: Mutex::new(None),
        })
    }

    /// Override the search result cap and snippet length.
    pub fn with_search_limits(mut self, limit: usize, snippet_chars: usize) -> Self {
        self.search_limit = limit.max(1);
        self.snippet_chars = snippet_chars.max(1);
        self
    }

    /// The absolute sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding persisted session snapshots.
    pub fn chats_dir(&self) -> PathBuf {
        self.root.join("chats")
    }

    /// Monotonic counter bumped by every successful mutation.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    // ─── CRUD ───────────────────────────────────────────────────────────

    /// Write a file, creating missing parent directories.
    ///
    /// An existing file at the same path is overwritten.
    pub fn create(&self, path: &str, content: &str) -> Result<String, StoreError> {
        let (rel, full) = self.file_target(path)?;
        if full.is_dir() {
            return Err(StoreError::NotAFile { path: rel });
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::from_io(&rel, e))?;
        }
        write_atomic(&full, content).map_err(|e| StoreError::from_io(&rel, e))?;
        self.invalidate_tree();

        tracing::info!(path = %rel, bytes = content.len(), "created file");
        Ok(format!("Created file: {rel}"))
    }

    /// Read a file's full text content.
    pub fn read(&self, path: &str) -> Result<String, StoreError> {
        let (rel, full) = self.file_target(path)?;
        let metadata = fs::metadata(&full).map_err(|e| StoreError::from_io(&rel, e))?;
        if metadata.is_dir() {
            return Err(StoreError::NotAFile { path: rel });
        }
        fs::read_to_string(&full).map_err(|e| StoreError::from_io(&rel, e))
    }

    /// Overwrite an existing file. Fails with `NotFound` if it is absent.
    pub fn edit(&self, path: &str, content: &str) -> Result<String, StoreError> {
        let (rel, full) = self.file_target(path)?;
        let metadata = fs::metadata(&full).map_err(|e| StoreError::from_io(&rel, e))?;
        if metadata.is_dir() {
            return Err(StoreError::NotAFile { path: rel });
        }

        write_atomic(&full, content).map_err(|e| StoreError::from_io(&rel, e))?;
        self.invalidate_tree();

        tracing::info!(path = %rel, bytes = content.len(), "updated file");
        Ok(format!("Updated file: {rel}"))
    }

    /// Remove a file.
    pub fn delete(&self, path: &str) -> Result<String, StoreError> {
        let (rel, full) = self.file_target(path)?;
        let metadata = fs::metadata(&full).map_err(|e| StoreError::from_io(&rel, e))?;
        if metadata.is_dir() {
            return Err(StoreError::NotAFile { path: rel });
        }

        fs::remove_file(&full).map_err(|e| StoreError::from_io(&rel, e))?;
        self.invalidate_tree();

        tracing::info!(path = %rel, "deleted file");
        Ok(format!("Deleted file: {rel}"))
    }

    /// Whether a file exists at the (sanitized) path.
    pub fn exists(&self, path: &str) -> bool {
        self.file_target(path)
            .map(|(_, full)| full.is_file())
            .unwrap_or(false)
    }

    // ─── Listing ────────────────────────────────────────────────────────

    /// List one directory's children.
    ///
    /// Returns entries sorted: directories first, then files, both
    /// case-insensitively by name. Dot-files and the hidden models directory
    /// are skipped. An empty `directory` (or `.`) lists the root.
    pub fn list(&self, directory: &str) -> Result<Vec<FileEntry>, StoreError> {
        let (rel, full) = self.checked(directory)?;
        let metadata = fs::metadata(&full).map_err(|e| StoreError::from_io(&rel, e))?;
        if !metadata.is_dir() {
            return Err(StoreError::NotADirectory { path: rel });
        }
        read_entries(&full, &rel)
    }

    /// Recursive snapshot of the whole sandbox (hidden areas excluded).
    ///
    /// Cached until the next mutating call. Entries are in depth-first order
    /// with each directory's children sorted like [`SandboxStore::list`].
    pub fn tree(&self) -> Result<Arc<Vec<FileEntry>>, StoreError> {
        let mut cache = self
            .tree_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(ref tree) = *cache {
            return Ok(Arc::clone(tree));
        }

        let mut entries = Vec::new();
        collect_tree(&self.root, "", &mut entries)?;
        let tree = Arc::new(entries);
        *cache = Some(Arc::clone(&tree));

        tracing::debug!(entries = tree.len(), revision = self.revision(), "rebuilt tree");
        Ok(tree)
    }

    // ─── Search ─────────────────────────────────────────────────────────

    /// Case-insensitive substring search across text/markdown files.
    ///
    /// Reports at most one match per file (its first matching line, cut to
    /// the snippet length) and at most `search_limit` matches in total.
    /// Files are visited in sorted depth-first order, so results are stable.
    pub fn search(&self, query: &str) -> Result<Vec<SearchMatch>, StoreError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(StoreError::InvalidQuery {
                reason: "query is empty".to_string(),
            });
        }

        let mut matches = Vec::new();
        self.search_dir(&self.root, "", &needle, &mut matches)?;

        tracing::debug!(query = %query, matches = matches.len(), "search complete");
        Ok(matches)
    }

    fn search_dir(
        &self,
        dir: &Path,
        rel: &str,
        needle: &str,
        matches: &mut Vec<SearchMatch>,
    ) -> Result<(), StoreError> {
        let entries = match read_entries(dir, rel) {
            Ok(entries) => entries,
            Err(e) if !rel.is_empty() => {
                tracing::debug!(path = %rel, error = %e, "skipping unreadable directory");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        for entry in entries {
            if matches.len() >= self.search_limit {
                return Ok(());
            }
            let full = self.root.join(&entry.path);
            if entry.is_dir() {
                self.search_dir(&full, &entry.path, needle, matches)?;
                continue;
            }
            if !is_searchable(&entry.name) {
                continue;
            }

            let content = match fs::read_to_string(&full) {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(path = %entry.path, error = %e, "skipping unreadable file");
                    continue;
                }
            };

            if let Some(line) = content
                .lines()
                .find(|line| line.to_lowercase().contains(needle))
            {
                matches.push(SearchMatch {
                    path: entry.path.clone(),
                    line: line.trim_end().chars().take(self.snippet_chars).collect(),
                });
            }
        }
        Ok(())
    }

    // ─── Path helpers ───────────────────────────────────────────────────

    /// Sanitize, drop `.` segments, and resolve; rejects the hidden directory.
    fn checked(&self, path: &str) -> Result<(String, PathBuf), StoreError> {
        let rel = sanitize(path)
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("/");
        if is_hidden_path(&rel) {
            return Err(StoreError::PathRejected {
                path: rel,
                reason: "hidden directory".to_string(),
            });
        }
        let full = resolve(&self.root, &rel);
        Ok((rel, full))
    }

    /// Like [`Self::checked`], but the path must name something below the root.
    fn file_target(&self, path: &str) -> Result<(String, PathBuf), StoreError> {
        let (rel, full) = self.checked(path)?;
        if rel.is_empty() {
            return Err(StoreError::PathRejected {
                path: path.to_string(),
                reason: "empty path".to_string(),
            });
        }
        Ok((rel, full))
    }

    /// Drop the cached tree and bump the revision.
    fn invalidate_tree(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
        let mut cache = self
            .tree_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cache = None;
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Write `content` to a sibling temp file, then rename it over `path`.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    fs::write(&tmp, content)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Read and sort one directory's visible entries.
fn read_entries(dir: &Path, rel: &str) -> Result<Vec<FileEntry>, StoreError> {
    let read_dir = fs::read_dir(dir).map_err(|e| StoreError::from_io(rel, e))?;
    let mut entries = Vec::new();

    for entry_result in read_dir {
        let entry = entry_result.map_err(|e| StoreError::from_io(rel, e))?;
        let name = entry.file_name().to_string_lossy().to_string();

        if is_dot_entry(&name) || (rel.is_empty() && name == HIDDEN_DIRECTORY) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(name = %name, error = %e, "skipping entry without metadata");
                continue;
            }
        };

        let modified = metadata
            .modified()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
            .unwrap_or_default();

        let path = if rel.is_empty() {
            name.clone()
        } else {
            format!("{rel}/{name}")
        };

        entries.push(FileEntry {
            name,
            path,
            entry_type: if metadata.is_dir() {
                EntryType::Dir
            } else {
                EntryType::File
            },
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified,
        });
    }

    // Sort: directories first, then files, both alphabetically
    entries.sort_by(|a, b| {
        b.is_dir()
            .cmp(&a.is_dir())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    Ok(entries)
}

fn collect_tree(dir: &Path, rel: &str, out: &mut Vec<FileEntry>) -> Result<(), StoreError> {
    for entry in read_entries(dir, rel)? {
        let child_dir = entry.is_dir().then(|| (dir.join(&entry.name), entry.path.clone()));
        out.push(entry);
        if let Some((child_dir, child_rel)) = child_dir {
            collect_tree(&child_dir, &child_rel, out)?;
        }
    }
    Ok(())
}

fn is_searchable(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            SEARCHABLE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
