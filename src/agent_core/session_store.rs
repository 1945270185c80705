//! Session persistence: one JSON snapshot per session under `chats/`.
//!
//! Each save overwrites `chats/<id>.json` with the full session via a temp
//! file + rename, so a crash mid-write leaves the previous snapshot intact.

use std::fs;
use std::path::{Path, PathBuf};

use super::errors::AgentError;
use super::types::{Session, SessionSummary};

// ─── SessionStore ───────────────────────────────────────────────────────────

/// File-backed session catalogue.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open (or create) a session directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the full session snapshot.
    pub fn save(&self, session: &Session) -> Result<(), AgentError> {
        let path = self.path_for(&session.id)?;
        let json = serde_json::to_string_pretty(session)?;

        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::debug!(
            session_id = %session.id,
            messages = session.messages.len(),
            "session saved"
        );
        Ok(())
    }

    /// Load a session by id.
    pub fn load(&self, session_id: &str) -> Result<Session, AgentError> {
        let path = self.path_for(session_id)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AgentError::SessionNotFound {
                    session_id: session_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load every readable session. Corrupt files are skipped with a warning.
    fn load_all(&self) -> Result<Vec<Session>, AgentError> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(AgentError::from)
                .and_then(|raw| serde_json::from_str::<Session>(&raw).map_err(AgentError::from));
            match parsed {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session file");
                }
            }
        }
        Ok(sessions)
    }

    /// Catalogue of all sessions: pinned first, then most recently updated.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, AgentError> {
        let mut summaries: Vec<SessionSummary> =
            self.load_all()?.iter().map(Session::summary).collect();
        summaries.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }

    /// Rename a session. Blank names are ignored.
    pub fn rename_session(&self, session_id: &str, name: &str) -> Result<Session, AgentError> {
        let mut session = self.load(session_id)?;
        let name = name.trim();
        if !name.is_empty() {
            session.name = name.to_string();
            session.touch();
            self.save(&session)?;
        }
        Ok(session)
    }

    pub fn set_pinned(&self, session_id: &str, pinned: bool) -> Result<Session, AgentError> {
        let mut session = self.load(session_id)?;
        session.pinned = pinned;
        session.touch();
        self.save(&session)?;
        Ok(session)
    }

    /// Remove a session's backing record.
    pub fn delete_session(&self, session_id: &str) -> Result<(), AgentError> {
        let path = self.path_for(session_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(session_id = %session_id, "session deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AgentError::SessionNotFound {
                session_id: session_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete persisted sessions that never received a user message.
    ///
    /// Returns how many were removed.
    pub fn cleanup_empty_sessions(&self) -> Result<usize, AgentError> {
        let mut removed = 0;
        for session in self.load_all()? {
            if !session.has_user_message() {
                self.delete_session(&session.id)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "cleaned up empty sessions");
        }
        Ok(removed)
    }

    /// Session ids are uuids; anything else could name a path outside `dir`.
    fn path_for(&self, session_id: &str) -> Result<PathBuf, AgentError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AgentError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::types::Message;
    use crate::inference::types::{Role, ToolCall, ToolCallStatus};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("chats")).unwrap();
        (dir, store)
    }

    fn session_with_user(text: &str) -> Session {
        let mut session = Session::new();
        session.messages.push(Message::new(Role::User, text));
        session.auto_name();
        session
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_dir, store) = test_store();
        let mut session = session_with_user("hello");

        let mut assistant = Message::new(Role::Assistant, "Saving it.");
        let mut params = BTreeMap::new();
        params.insert("path".to_string(), "notes/a.md".to_string());
        let mut call = ToolCall::new("read_file", params);
        call.status = ToolCallStatus::Success;
        call.result = Some("hi".into());
        assistant.tool_calls = Some(vec![call]);
        session.messages.push(assistant);

        let mut streaming = Message::provisional();
        streaming.content = "partial".into();
        session.messages.push(streaming);

        store.save(&session).unwrap();
        let loaded = store.load(&session.id).unwrap();

        assert_eq!(loaded.messages.len(), 3);
        for (a, b) in loaded.messages.iter().zip(&session.messages) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.role, b.role);
            assert_eq!(a.content, b.content);
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.tool_calls, b.tool_calls);
        }
        assert!(!loaded.messages[2].is_streaming);
        assert_eq!(loaded.created_at, session.created_at);
        assert_eq!(loaded.name, "hello");
    }

    #[test]
    fn test_snapshot_lives_under_id() {
        let (_dir, store) = test_store();
        let session = session_with_user("x");
        store.save(&session).unwrap();
        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.json", session.id)]);
    }

    #[test]
    fn test_load_missing_and_bad_ids() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.load("nope").unwrap_err(),
            AgentError::SessionNotFound { .. }
        ));
        assert!(matches!(
            store.load("../../etc/passwd").unwrap_err(),
            AgentError::SessionNotFound { .. }
        ));
    }

    #[test]
    fn test_list_sessions_pinned_then_recent() {
        let (_dir, store) = test_store();
        let mut old = session_with_user("old");
        old.updated_at = chrono::Utc::now() - chrono::Duration::hours(2);
        let mut recent = session_with_user("recent");
        recent.updated_at = chrono::Utc::now() - chrono::Duration::hours(1);
        let mut pinned = session_with_user("pinned");
        pinned.updated_at = chrono::Utc::now() - chrono::Duration::hours(5);
        pinned.pinned = true;
        for s in [&old, &recent, &pinned] {
            store.save(s).unwrap();
        }
        fs::write(store.dir().join("garbage.json"), "{not json").unwrap();

        let names: Vec<String> = store
            .list_sessions()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["pinned", "recent", "old"]);
    }

    #[test]
    fn test_rename_pin_delete() {
        let (_dir, store) = test_store();
        let session = session_with_user("first");
        store.save(&session).unwrap();

        assert_eq!(store.rename_session(&session.id, "  Groceries ").unwrap().name, "Groceries");
        assert_eq!(store.rename_session(&session.id, "   ").unwrap().name, "Groceries");
        assert!(store.set_pinned(&session.id, true).unwrap().pinned);
        assert!(store.load(&session.id).unwrap().pinned);

        store.delete_session(&session.id).unwrap();
        assert!(matches!(
            store.delete_session(&session.id).unwrap_err(),
            AgentError::SessionNotFound { .. }
        ));
    }

    #[test]
    fn test_cleanup_empty_sessions() {
        let (_dir, store) = test_store();
        store.save(&Session::new()).unwrap();
        let kept = session_with_user("keep me");
        store.save(&kept).unwrap();

        assert_eq!(store.cleanup_empty_sessions().unwrap(), 1);
        let remaining = store.list_sessions().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept.id);
    }
}
