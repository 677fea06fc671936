use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::models::ChatSession;

pub const SESSIONS_KEY: &str = "sessions.json";
pub const ACTIVE_SESSION_KEY: &str = "active_session";

/// Durable key-value surface for small text blobs.
pub trait BlobStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// One file per key under a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens the store in the default per-user data directory.
    pub fn new() -> Result<Self> {
        Self::with_dir(Self::data_dir())
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn data_dir() -> PathBuf {
        let base = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").expect("HOME not set");
                PathBuf::from(home).join(".local/share")
            });
        base.join("colloquy")
    }
}

impl BlobStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.dir.join(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.dir.join(key);
        fs::write(&path, value).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// In-memory store, used for testing and as an embedder placeholder.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Clone)]
pub struct StorageService {
    store: Arc<dyn BlobStore>,
}

impl StorageService {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Loads persisted sessions plus the saved active id. Never fails: a
    /// missing or unreadable blob means "no saved state", and an empty list
    /// is replaced by a single fresh session so callers always have
    /// something to select. Fields absent from old data are backfilled by
    /// the session's serde defaults.
    pub fn load(&self) -> (Vec<ChatSession>, Option<String>) {
        let mut sessions: Vec<ChatSession> = match self.store.read(SESSIONS_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable session data: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read saved sessions: {}", e);
                Vec::new()
            }
        };

        if sessions.is_empty() {
            sessions.push(ChatSession::new());
        }

        let active_id = match self.store.read(ACTIVE_SESSION_KEY) {
            Ok(Some(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
            _ => None,
        };

        (sessions, active_id)
    }

    pub fn save_sessions(&self, sessions: &[ChatSession]) -> Result<()> {
        let json = serde_json::to_string_pretty(sessions)?;
        self.store.write(SESSIONS_KEY, &json)
    }

    pub fn save_active_id(&self, id: &str) -> Result<()> {
        self.store.write(ACTIVE_SESSION_KEY, id)
    }
}
