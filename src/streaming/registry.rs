//! Process-wide map of live encode sessions and their idle reapers.
//!
//! Both maps sit behind a single mutex so a lookup, a launch and the arming of
//! its reaper happen atomically: two concurrent requests for the same file can
//! never start two encoders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use setbox_av::{ProcessLauncher, TerminationPolicy};
use setbox_core::config::StreamingConfig;
use setbox_core::{Error, Result};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::session::{EncodeSession, Liveness};

/// Shortest interval between two reaper checks.
const MIN_RECHECK: Duration = Duration::from_millis(50);

/// A session shared between requests and its reaper.
pub type SharedSession = Arc<AsyncMutex<EncodeSession>>;

/// Tunables of the session registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// Blocks retained per session for resumption.
    pub max_blocks: usize,
    /// Inactivity after which a session is reaped.
    pub idle_timeout: Duration,
    /// How encoders are stopped.
    pub termination: TerminationPolicy,
}

impl RegistryOptions {
    pub fn from_config(config: &StreamingConfig) -> Self {
        Self {
            max_blocks: config.max_blocks,
            idle_timeout: config.idle_timeout(),
            termination: TerminationPolicy::default(),
        }
    }
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::from_config(&StreamingConfig::default())
    }
}

/// A registered session and the identity it was registered under.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub session: SharedSession,
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    /// A request is currently streaming from this session.
    pub busy: bool,
    pub idle_secs: u64,
    /// Fields below are only known when the session is not busy.
    pub pid: Option<u32>,
    pub window_start: Option<u64>,
    pub window_end: Option<u64>,
}

struct Entry {
    id: Uuid,
    session: SharedSession,
    liveness: Liveness,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct Maps {
    sessions: HashMap<PathBuf, Entry>,
    reapers: HashMap<PathBuf, CancellationToken>,
}

/// Outcome of one reaper check.
enum ReapCheck {
    /// Session reaped or already gone; the reaper stops.
    Done,
    /// Check again after this long.
    Wait(Duration),
}

/// Registry of live encode sessions keyed by source path.
pub struct SessionRegistry {
    maps: Mutex<Maps>,
    launcher: Arc<dyn ProcessLauncher>,
    options: RegistryOptions,
    this: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, options: RegistryOptions) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            maps: Mutex::new(Maps::default()),
            launcher,
            options,
            this: this.clone(),
        })
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Look up the live session for a path.
    pub fn get(&self, path: &Path) -> Option<SessionHandle> {
        let maps = self.maps.lock();
        maps.sessions.get(path).map(|entry| SessionHandle {
            id: entry.id,
            session: Arc::clone(&entry.session),
        })
    }

    /// Return the live session for `path`, launching `program args` for it
    /// when there is none. The flag tells whether a new encoder was started.
    pub fn get_or_start(
        &self,
        path: &Path,
        program: &Path,
        args: &[String],
        preamble: Option<Bytes>,
    ) -> Result<(SessionHandle, bool)> {
        let mut maps = self.maps.lock();
        if let Some(entry) = maps.sessions.get(path) {
            let handle = SessionHandle {
                id: entry.id,
                session: Arc::clone(&entry.session),
            };
            return Ok((handle, false));
        }

        let process = self
            .launcher
            .launch(program, args)
            .map_err(|e| Error::process_io(format!("launch {}", program.display()), e))?;

        let id = Uuid::new_v4();
        let session = EncodeSession::new(
            id,
            path.to_path_buf(),
            process,
            self.options.max_blocks,
            preamble,
        );
        info!(
            session_id = %id,
            path = %path.display(),
            pid = ?session.pid(),
            "Started encoder session"
        );

        let started_at = session.started_at();
        let liveness = session.liveness().clone();
        let session = Arc::new(AsyncMutex::new(session));
        maps.sessions.insert(
            path.to_path_buf(),
            Entry {
                id,
                session: Arc::clone(&session),
                liveness,
                started_at,
            },
        );
        let token = self.arm_reaper(path.to_path_buf(), id);
        if let Some(previous) = maps.reapers.insert(path.to_path_buf(), token) {
            previous.cancel();
        }

        Ok((SessionHandle { id, session }, true))
    }

    /// Unregister the session for `path` if it is still the one identified
    /// by `id`, cancelling its reaper. Returns whether anything was removed.
    ///
    /// The caller is responsible for closing the session itself.
    pub fn remove(&self, path: &Path, id: Uuid) -> bool {
        let mut maps = self.maps.lock();
        match maps.sessions.get(path) {
            Some(entry) if entry.id == id => {
                maps.sessions.remove(path);
                if let Some(token) = maps.reapers.remove(path) {
                    token.cancel();
                }
                debug!(session_id = %id, path = %path.display(), "Removed encoder session");
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.maps.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Describe every live session without waiting on busy ones.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let maps = self.maps.lock();
        let mut infos: Vec<SessionInfo> = maps
            .sessions
            .iter()
            .map(|(path, entry)| {
                let mut info = SessionInfo {
                    id: entry.id,
                    path: path.clone(),
                    started_at: entry.started_at,
                    busy: true,
                    idle_secs: entry.liveness.idle_for().as_secs(),
                    pid: None,
                    window_start: None,
                    window_end: None,
                };
                if let Ok(session) = entry.session.try_lock() {
                    info.busy = false;
                    info.pid = session.pid();
                    info.window_start = Some(session.window().start());
                    info.window_end = Some(session.window().end());
                }
                info
            })
            .collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        infos
    }

    /// Stop every encoder and cancel every reaper.
    ///
    /// In-flight requests are told to give up their sessions and are waited
    /// for.
    pub async fn shutdown_all(&self) {
        let entries: Vec<(PathBuf, Entry)> = {
            let mut maps = self.maps.lock();
            for (_, token) in maps.reapers.drain() {
                token.cancel();
            }
            maps.sessions.drain().collect()
        };

        if !entries.is_empty() {
            info!(count = entries.len(), "Stopping encoder sessions");
        }
        for (_, entry) in &entries {
            entry.liveness.abandon();
        }
        for (path, entry) in entries {
            let mut session = entry.session.lock().await;
            debug!(session_id = %entry.id, path = %path.display(), "Stopping encoder");
            session.close(self.options.termination).await;
        }
    }

    fn arm_reaper(&self, path: PathBuf, id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let registry = self.this.clone();
        let mut delay = self.options.idle_timeout;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                match registry.reap_if_idle(&path, id).await {
                    ReapCheck::Done => break,
                    ReapCheck::Wait(next) => delay = next,
                }
            }
        });

        token
    }

    async fn reap_if_idle(&self, path: &Path, id: Uuid) -> ReapCheck {
        let timeout = self.options.idle_timeout;
        let (session, liveness) = {
            let maps = self.maps.lock();
            match maps.sessions.get(path) {
                Some(entry) if entry.id == id => {
                    (Arc::clone(&entry.session), entry.liveness.clone())
                }
                _ => return ReapCheck::Done,
            }
        };

        let idle = liveness.idle_for();
        if idle < timeout {
            return ReapCheck::Wait((timeout - idle).max(MIN_RECHECK));
        }

        // A request holding the lock is stuck on the encoder or the client.
        // Abandon the session; the request tears it down and removes it.
        let Ok(mut session) = session.try_lock() else {
            if !liveness.is_abandoned() {
                info!(
                    session_id = %id,
                    path = %path.display(),
                    idle_secs = idle.as_secs(),
                    "Abandoning stalled encoder session"
                );
                liveness.abandon();
            }
            return ReapCheck::Wait(timeout.max(MIN_RECHECK));
        };
        if session.is_closed() {
            return ReapCheck::Done;
        }
        if !self.remove(path, id) {
            return ReapCheck::Done;
        }

        info!(
            session_id = %id,
            path = %path.display(),
            idle_secs = idle.as_secs(),
            "Reaping idle encoder session"
        );
        session.close(self.options.termination).await;
        ReapCheck::Done
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("options", &self.options)
            .finish()
    }
}
