//! Session identifier persistence
//!
//! Each chat surface owns one session id at a time. The id is generated
//! client-side and kept in a small key/value store that lives as long as
//! the hosting tab (or, for the file store, across process restarts).

use crate::error::{ClientError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A chat surface that owns its own session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatSurface {
    /// Public chat with a published agent
    PublishedAgent(String),
    SkillFinder,
    AgentBuilder,
    SkillEvolve,
}

impl ChatSurface {
    /// Storage key holding this surface's session id
    pub fn storage_key(&self) -> String {
        match self {
            ChatSurface::PublishedAgent(agent_id) => format!("published-session-{}", agent_id),
            ChatSurface::SkillFinder => "skill-finder-session-id".to_string(),
            ChatSurface::AgentBuilder => "agent-builder-session-id".to_string(),
            ChatSurface::SkillEvolve => "skill-evolve-session-id".to_string(),
        }
    }
}

/// Key/value storage for per-surface state
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store, scoped to the lifetime of the value
#[derive(Default)]
pub struct MemorySessionStore {
    entries: std::sync::RwLock<HashMap<String, String>>,
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| ClientError::Storage(format!("Failed to acquire store lock: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| ClientError::Storage(format!("Failed to acquire store lock: {}", e)))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| ClientError::Storage(format!("Failed to acquire store lock: {}", e)))?;
        entries.remove(key);
        Ok(())
    }
}

/// JSON file-backed store
///
/// The whole map is rewritten on every change via temp file + rename.
pub struct FileSessionStore {
    path: PathBuf,
    lock: std::sync::Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: std::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<HashMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| storage_error("parse", &self.path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(storage_error("read", &self.path, e)),
        }
    }

    /// Read-modify-write under the store lock; the file is replaced whole
    fn modify(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries = self.read_entries()?;
        f(&mut entries);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| storage_error("create", dir, e))?;
        }
        let staged = self.path.with_extension("tmp");
        std::fs::write(&staged, serde_json::to_vec_pretty(&entries)?)
            .map_err(|e| storage_error("write", &staged, e))?;
        std::fs::rename(&staged, &self.path)
            .map_err(|e| storage_error("replace", &self.path, e))?;

        tracing::debug!(path = %self.path.display(), sessions = entries.len(), "Session ids persisted");
        Ok(())
    }
}

fn storage_error(action: &str, path: &Path, e: impl std::fmt::Display) -> ClientError {
    ClientError::Storage(format!("Cannot {} {}: {}", action, path.display(), e))
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}

/// The session id currently owned by one chat surface
///
/// Reads the persisted id on open, generating and persisting a new one
/// when none exists.
pub struct SessionSlot {
    surface: ChatSurface,
    store: Arc<dyn SessionStore>,
    session_id: String,
}

impl SessionSlot {
    pub fn open(surface: ChatSurface, store: Arc<dyn SessionStore>) -> Result<Self> {
        let key = surface.storage_key();
        let session_id = match store.get(&key)? {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = new_session_id();
                store.set(&key, &id)?;
                tracing::debug!(key = %key, session_id = %id, "Generated session id");
                id
            }
        };

        Ok(Self {
            surface,
            store,
            session_id,
        })
    }

    pub fn surface(&self) -> &ChatSurface {
        &self.surface
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Replace the session with a freshly generated id
    pub fn renew(&mut self) -> Result<&str> {
        let id = new_session_id();
        self.persist(id)?;
        Ok(&self.session_id)
    }

    /// Adopt an existing (historical) session id
    pub fn switch_to(&mut self, session_id: &str) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(ClientError::Validation(
                "Session id must not be empty".to_string(),
            ));
        }
        self.persist(session_id.to_string())
    }

    fn persist(&mut self, session_id: String) -> Result<()> {
        self.store.set(&self.surface.storage_key(), &session_id)?;
        tracing::debug!(
            key = %self.surface.storage_key(),
            from = %self.session_id,
            to = %session_id,
            "Session id changed"
        );
        self.session_id = session_id;
        Ok(())
    }
}

/// Generate a new client-side session id
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
