//! Session manager: a thread-safe registry of live [`Session`]s (§4.7).
//!
//! Generalized directly from the teacher's `SessionManager`/`ProcessRegistry`
//! pattern -- one `tokio::sync::Mutex`-guarded `HashMap`, snapshot-then-act
//! to keep the lock out of any `.await` that does real I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::config;
use crate::error::{GdbError, GdbResult};
use crate::observability::{self, Observation};
use crate::session::{Session, SessionSummary};

/// Generates session ids from a monotonic counter plus the manager's spawn
/// time, so ids are unique for the lifetime of the process without needing
/// a UUID dependency (§3: "generated from a monotonic timestamp plus a
/// per-manager counter so collisions are impossible").
struct IdGenerator {
    epoch_ms: u128,
    counter: AtomicU64,
}

impl IdGenerator {
    fn new() -> Self {
        let epoch_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        IdGenerator {
            epoch_ms,
            counter: AtomicU64::new(0),
        }
    }

    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("gdb-{}-{}", self.epoch_ms, n)
    }
}

/// Thread-safe registry of live GDB sessions.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
    ids: Arc<IdGenerator>,
    obs_tx: broadcast::Sender<Observation>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        let (obs_tx, _rx) = observability::channel();
        SessionManager {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ids: Arc::new(IdGenerator::new()),
            obs_tx,
        }
    }

    /// Subscribe to manager-level lifecycle observations (`session-added`,
    /// `session-removed`). Per-session observations (state changes, stops,
    /// console output) are published on the session's own channel instead;
    /// see [`Session::subscribe`].
    pub fn subscribe(&self) -> broadcast::Receiver<Observation> {
        self.obs_tx.subscribe()
    }

    /// Allocate an id and construct a new (not-yet-started) supervisor,
    /// insert it into the map, and return its summary. Rejects with
    /// `SessionLimit` once `GDB_MCP_MAX_SESSIONS` live sessions already
    /// exist. Call [`Self::start`] to actually spawn the GDB subprocess.
    pub async fn create(
        &self,
        gdb_path: Option<String>,
        working_directory: Option<String>,
        timeout_ms: Option<u64>,
    ) -> GdbResult<SessionSummary> {
        let max = config::max_sessions();
        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= max {
            return Err(GdbError::SessionLimit {
                current: sessions.len(),
                max,
            });
        }

        let id = self.ids.next();
        let gdb_path = gdb_path.unwrap_or_else(config::gdb_path);
        let timeout_ms = timeout_ms.unwrap_or_else(config::command_timeout_ms);
        let session = Arc::new(Session::new(
            id.clone(),
            gdb_path,
            working_directory,
            timeout_ms,
        ));
        sessions.insert(id.clone(), session.clone());
        observability::publish(&self.obs_tx, Observation::SessionAdded { session_id: id });
        Ok(session.summary())
    }

    /// Spawn the GDB subprocess for a previously created session and wait
    /// for it to reach `Ready`.
    pub async fn start(&self, id: &str) -> GdbResult<SessionSummary> {
        let session = {
            let sessions = self.sessions.lock().await;
            sessions
                .get(id)
                .cloned()
                .ok_or_else(|| GdbError::SessionNotFound(id.to_string()))?
        };
        session.start().await?;
        Ok(session.summary())
    }

    /// Look up a session's current summary.
    pub async fn get(&self, id: &str) -> Option<SessionSummary> {
        let sessions = self.sessions.lock().await;
        sessions.get(id).map(|s| s.summary())
    }

    /// Look up the live supervisor handle (for `execute`/`execute_mi`
    /// callers that need the full `Session` API, not just its summary).
    pub async fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.lock().await;
        sessions.get(id).cloned()
    }

    /// Terminate and remove a session. Returns `false` if no such session
    /// exists.
    pub async fn remove(&self, id: &str) -> GdbResult<bool> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(id)
        };
        match session {
            Some(session) => {
                session.terminate().await?;
                observability::publish(
                    &self.obs_tx,
                    Observation::SessionRemoved {
                        session_id: id.to_string(),
                    },
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot of every live session's summary.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock().await;
        sessions.values().map(|s| s.summary()).collect()
    }

    /// Terminate every live session. The id set is snapshotted under lock
    /// and the lock released before any termination I/O runs.
    pub async fn terminate_all(&self) {
        let ids: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions.keys().cloned().collect()
        };
        for id in ids {
            let _ = self.remove(&id).await;
        }
    }

    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
