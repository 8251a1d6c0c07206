// ABOUTME: Durable map of channel key to resumption token, stored as a flat JSON file.
// ABOUTME: Read once at startup and rewritten after completions, cancels and resets.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One persisted channel entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub session_id: String,
    #[serde(default)]
    pub label: String,
    /// RFC 3339 timestamp of the last write
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Channel key -> persisted entry, ordered so the file diff stays stable
pub type SessionMap = BTreeMap<String, PersistedSession>;

/// Where session ids live between restarts
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    /// Read every persisted entry. A missing store is an empty map.
    async fn read_all(&self) -> Result<SessionMap>;

    /// Replace the persisted map
    async fn write_all(&self, sessions: &SessionMap) -> Result<()>;
}

/// `sessions.json` in the workspace directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub const FILE_NAME: &'static str = "sessions.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<workspace>/sessions.json`
    pub fn in_workspace(workspace: &Path) -> Self {
        Self::new(workspace.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionPersistence for JsonFileStore {
    async fn read_all(&self) -> Result<SessionMap> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SessionMap::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read session file: {}", self.path.display())
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(SessionMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", self.path.display()))
    }

    async fn write_all(&self, sessions: &SessionMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(sessions).context("Failed to serialize session map")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))
    }
}

/// In-memory store for tests and runs that should not touch disk
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<SessionMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(sessions: SessionMap) -> Self {
        Self {
            sessions: Mutex::new(sessions),
        }
    }

    /// Current contents
    pub fn sessions(&self) -> SessionMap {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SessionPersistence for MemoryStore {
    async fn read_all(&self) -> Result<SessionMap> {
        Ok(self.sessions())
    }

    async fn write_all(&self, sessions: &SessionMap) -> Result<()> {
        *self.sessions.lock().unwrap_or_else(|e| e.into_inner()) = sessions.clone();
        Ok(())
    }
}
