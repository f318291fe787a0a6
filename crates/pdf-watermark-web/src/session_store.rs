//! Per-request working directories.
//!
//! Every watermark request gets its own directory under the session root,
//! named `<unix-millis>-<8 hex chars>`. The directory holds the uploaded
//! source, the per-phrase outputs and the archive, and is removed:
//!
//! - immediately when the request fails or is abandoned mid-pipeline,
//! - a short delay after the response body is dropped (see [`RetireGuard`]),
//! - by the periodic [`SessionStore::sweep`] once older than the retention
//!   window, for anything the first two missed (crashes, restarts).
//!
//! Active sessions are spared by the sweep only while their current state
//! is younger than the retention window.
//!
//! ## Lifecycle
//!
//! ```text
//! Created -> Populating -> Streaming -> Retired
//!     \_________\______________________/
//!          (error: retired immediately)
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Directory exists, nothing written yet
    Created,
    /// Source and outputs are being written
    Populating,
    /// The response body is being sent
    Streaming,
    /// Directory removed (or scheduled for removal)
    Retired,
}

impl SessionState {
    /// Whether a request is still working inside the directory.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Populating | Self::Streaming)
    }
}

/// State plus the moment it was entered.
#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: SessionState,
    since: SystemTime,
}

impl Tracked {
    fn now(state: SessionState) -> Self {
        Self {
            state,
            since: SystemTime::now(),
        }
    }
}

/// A freshly created working directory.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub dir: PathBuf,
}

/// Owns the session root and tracks live sessions.
///
/// The state map only holds metadata; all file I/O happens outside the lock.
pub struct SessionStore {
    root: PathBuf,
    retention: Duration,
    states: RwLock<HashMap<String, Tracked>>,
}

impl SessionStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, retention: Duration) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!("Session root at {}", root.display());

        Ok(Self {
            root,
            retention,
            states: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new, empty session directory.
    pub async fn create(&self) -> io::Result<Session> {
        let id = new_session_id();
        let dir = self.root.join(&id);
        tokio::fs::create_dir_all(&dir).await?;

        self.states
            .write()
            .await
            .insert(id.clone(), Tracked::now(SessionState::Created));
        debug!("Created session {}", id);

        Ok(Session { id, dir })
    }

    pub async fn set_state(&self, id: &str, state: SessionState) {
        self.states
            .write()
            .await
            .insert(id.to_string(), Tracked::now(state));
    }

    /// Current state, or `None` for ids this store never created (or pruned).
    pub async fn state(&self, id: &str) -> Option<SessionState> {
        self.states.read().await.get(id).map(|t| t.state)
    }

    /// Remove a session directory. Safe to call more than once.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn retire(&self, id: &str) {
        self.set_state(id, SessionState::Retired).await;
        remove_entry(&self.root.join(id)).await;
    }

    /// Entries under the root whose modification time is older than the
    /// retention window, as seen from `now`.
    pub async fn list_expired(&self, now: SystemTime) -> io::Result<Vec<PathBuf>> {
        let mut expired = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                continue;
            };
            // Entries from the future (clock skew) are never expired
            if now
                .duration_since(modified)
                .is_ok_and(|age| age > self.retention)
            {
                expired.push(entry.path());
            }
        }

        Ok(expired)
    }

    /// Whether a request is still working in session `id`.
    ///
    /// A session stuck in an active state for longer than the retention
    /// window counts as abandoned.
    async fn is_busy(&self, id: &str, now: SystemTime) -> bool {
        self.states.read().await.get(id).is_some_and(|t| {
            t.state.is_active()
                && now
                    .duration_since(t.since)
                    .map_or(true, |age| age <= self.retention)
        })
    }

    /// Remove every expired entry that no request is still using.
    ///
    /// Returns the number of entries removed.
    pub async fn sweep(&self) -> usize {
        let now = SystemTime::now();
        let expired = match self.list_expired(now).await {
            Ok(expired) => expired,
            Err(e) => {
                warn!("Failed to scan session root {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for path in expired {
            let id = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if self.is_busy(&id, now).await {
                debug!("Skipping active session {}", id);
                continue;
            }

            if remove_entry(&path).await {
                removed += 1;
            }
            self.states.write().await.remove(&id);
        }

        // Forget retired sessions so the map does not grow forever
        self.states
            .write()
            .await
            .retain(|_, tracked| tracked.state != SessionState::Retired);

        if removed > 0 {
            info!("Swept {} expired session(s)", removed);
        }
        removed
    }
}

/// Schedules [`SessionStore::retire`] when dropped.
///
/// The handler holds one with no delay while the pipeline runs, so a
/// dropped request future still cleans up. It then moves into the response
/// body stream with the configured delay, and drops once the body has been
/// fully sent or the client goes away.
pub struct RetireGuard {
    store: Arc<SessionStore>,
    id: Option<String>,
    delay: Duration,
}

impl RetireGuard {
    pub const fn new(store: Arc<SessionStore>, id: String, delay: Duration) -> Self {
        Self {
            store,
            id: Some(id),
            delay,
        }
    }

    /// Same guard, retiring after `delay` instead.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Drop without scheduling anything.
    pub fn disarm(mut self) {
        self.id = None;
    }
}

impl Drop for RetireGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let delay = self.delay;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    store.retire(&id).await;
                });
            }
            Err(_) => {
                // Runtime already gone; the sweep will catch it
                warn!("No runtime to schedule cleanup of session {}", id);
            }
        }
    }
}

fn new_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{millis}-{}", &suffix[..8])
}

/// Remove a file or directory. Returns whether something was removed.
async fn remove_entry(path: &Path) -> bool {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            debug!("Removed {}", path.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}
