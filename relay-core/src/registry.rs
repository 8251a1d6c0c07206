// ABOUTME: Session registry mapping channel keys to live ChannelSession records.
// ABOUTME: Lazily creates entries and restores/persists resumption tokens through a store.

use crate::queue::MessageQueue;
use crate::store::{PersistedSession, SessionMap, SessionPersistence};
use crate::traits::DeliverySink;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Per-submission knobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Start without resuming the stored session
    pub fresh_session: bool,
    /// Ask the backend to continue the latest conversation in the working directory
    pub continue_conversation: bool,
    /// Model override for this input only
    pub model: Option<String>,
}

/// An input waiting for its turn on a busy channel
pub struct QueuedInput {
    pub prompt: String,
    pub sink: Arc<dyn DeliverySink>,
    pub options: SubmitOptions,
}

impl std::fmt::Debug for QueuedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedInput")
            .field("prompt", &self.prompt)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// The in-flight task's handle. Only the executor creates and retires these.
#[derive(Debug)]
pub(crate) struct ActiveTask {
    pub(crate) token: CancellationToken,
    pub(crate) generation: u64,
}

#[derive(Debug)]
pub(crate) struct ChannelState {
    pub(crate) label: String,
    pub(crate) session_id: Option<String>,
    /// RFC 3339 time the session id last changed
    pub(crate) updated_at: Option<String>,
    pub(crate) active: Option<ActiveTask>,
    pub(crate) queue: MessageQueue<QueuedInput>,
    next_generation: u64,
}

impl ChannelState {
    fn new(label: String, session_id: Option<String>, updated_at: Option<String>) -> Self {
        Self {
            label,
            session_id,
            updated_at,
            active: None,
            queue: MessageQueue::new(),
            next_generation: 0,
        }
    }

    /// Replace the session id, stamping the change time when it differs
    pub(crate) fn set_session_id(&mut self, session_id: Option<String>) {
        if self.session_id != session_id {
            self.session_id = session_id;
            self.updated_at = Some(chrono::Utc::now().to_rfc3339());
        }
    }

    /// Install a fresh cancellation handle. Callers check `active` first.
    pub(crate) fn activate(&mut self) -> (CancellationToken, u64) {
        debug_assert!(self.active.is_none(), "channel already has an active task");
        self.next_generation += 1;
        let token = CancellationToken::new();
        self.active = Some(ActiveTask {
            token: token.clone(),
            generation: self.next_generation,
        });
        (token, self.next_generation)
    }

    /// Whether the task of `generation` still owns the channel
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }
}

/// One conversation channel
#[derive(Debug)]
pub struct ChannelSession {
    key: String,
    working_dir: PathBuf,
    state: Mutex<ChannelState>,
}

impl ChannelSession {
    fn new(
        key: &str,
        label: &str,
        workspace: &Path,
        persisted: Option<PersistedSession>,
    ) -> Self {
        let (session_id, updated_at) = match persisted {
            Some(entry) => (Some(entry.session_id), entry.updated_at),
            None => (None, None),
        };
        Self {
            key: key.to_string(),
            working_dir: workspace.join(directory_name(key)),
            state: Mutex::new(ChannelState::new(label.to_string(), session_id, updated_at)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn label(&self) -> String {
        self.lock_state().label.clone()
    }

    /// Stored resumption token
    pub fn session_id(&self) -> Option<String> {
        self.lock_state().session_id.clone()
    }

    /// When the stored session id last changed
    pub fn updated_at(&self) -> Option<String> {
        self.lock_state().updated_at.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock_state().active.is_some()
    }

    pub fn queue_len(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Never held across an await
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Directory name for a channel key.
///
/// Keys made only of [A-Za-z0-9_-] are used as-is. Any other key is sanitized
/// and suffixed with a digest of the raw key, so keys that sanitize alike
/// ("team/dev", "team:dev") still get separate directories.
pub fn directory_name(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !key.is_empty() && sanitized == key {
        return sanitized;
    }

    let base = sanitized.trim_matches('_');
    let base = if base.is_empty() { "channel" } else { base };
    format!("{}-{}", base, key_digest(key))
}

/// First 6 bytes of the key's SHA-256, hex encoded
fn key_digest(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}

/// All channel sessions known to this process
pub struct SessionRegistry {
    workspace: PathBuf,
    sessions: Mutex<HashMap<String, Arc<ChannelSession>>>,
    // Serializes snapshot+write so an older snapshot never lands after a newer one
    save_lock: tokio::sync::Mutex<()>,
}

impl SessionRegistry {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            sessions: Mutex::new(HashMap::new()),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<ChannelSession>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the session for `key`, creating it on first use.
    ///
    /// Every call for the same key returns the same `Arc`. A non-empty label
    /// replaces the stored one so renamed channels show their current name.
    pub fn get_or_create(&self, key: &str, label: &str) -> Arc<ChannelSession> {
        let mut sessions = self.lock_sessions();
        if let Some(existing) = sessions.get(key) {
            if !label.is_empty() {
                let mut state = existing.lock_state();
                if state.label != label {
                    state.label = label.to_string();
                }
            }
            return Arc::clone(existing);
        }

        tracing::debug!(channel = %key, label = %label, "Creating channel session");
        let session = Arc::new(ChannelSession::new(key, label, &self.workspace, None));
        sessions.insert(key.to_string(), Arc::clone(&session));
        session
    }

    pub fn get(&self, key: &str) -> Option<Arc<ChannelSession>> {
        self.lock_sessions().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_sessions().is_empty()
    }

    /// All sessions, sorted by key
    pub fn channels(&self) -> Vec<Arc<ChannelSession>> {
        let mut channels: Vec<_> = self.lock_sessions().values().cloned().collect();
        channels.sort_by(|a, b| a.key.cmp(&b.key));
        channels
    }

    /// Persistable view: channels that currently hold a session id
    pub fn snapshot(&self) -> SessionMap {
        self.channels()
            .into_iter()
            .filter_map(|session| {
                let state = session.lock_state();
                state.session_id.as_ref().map(|session_id| {
                    (
                        session.key.clone(),
                        PersistedSession {
                            session_id: session_id.clone(),
                            label: state.label.clone(),
                            updated_at: state.updated_at.clone(),
                        },
                    )
                })
            })
            .collect()
    }

    /// Repopulate from the store. Failures leave the registry as it was.
    ///
    /// Returns the number of sessions restored.
    pub async fn load(&self, store: &dyn SessionPersistence) -> usize {
        let persisted = match store.read_all().await {
            Ok(persisted) => persisted,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted sessions - starting empty");
                return 0;
            }
        };

        let mut sessions = self.lock_sessions();
        let mut restored = 0;
        for (key, entry) in persisted {
            match sessions.get(&key) {
                Some(existing) => {
                    let mut state = existing.lock_state();
                    if state.session_id.is_none() {
                        state.session_id = Some(entry.session_id);
                        state.updated_at = entry.updated_at;
                        restored += 1;
                    }
                }
                None => {
                    let label = entry.label.clone();
                    let session = ChannelSession::new(&key, &label, &self.workspace, Some(entry));
                    sessions.insert(key, Arc::new(session));
                    restored += 1;
                }
            }
        }

        tracing::info!(restored, "Restored persisted sessions");
        restored
    }

    /// Write the current snapshot. Failures are logged, never returned.
    pub async fn save(&self, store: &dyn SessionPersistence) -> bool {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.snapshot();
        match store.write_all(&snapshot).await {
            Ok(()) => {
                tracing::debug!(sessions = snapshot.len(), "Persisted sessions");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist sessions");
                crate::metrics::record_error("persist");
                false
            }
        }
    }
}
