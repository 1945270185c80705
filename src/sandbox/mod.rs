//! Sandboxed file store.
//!
//! Every tool-visible path is confined to one root directory with fixed
//! subdirectories (`memory/`, `tasks/`, `notes/`, `chats/`) and a hidden
//! `models/` directory that never shows up in listings or search.

pub mod errors;
pub mod paths;
pub mod store;

pub use errors::StoreError;
pub use paths::sanitize;
pub use store::{EntryType, FileEntry, SandboxStore, SearchMatch};
