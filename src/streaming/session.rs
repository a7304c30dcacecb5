//! A live encode of one source file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use setbox_av::{shutdown, EncoderProcess, TerminationPolicy};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::window::RetainedWindow;

/// Activity clock and stop signal of a session, readable without taking the
/// session lock.
///
/// The reaper uses it to judge a session that a request is holding: when
/// the clock is stale it abandons the session, and the holder tears it down.
#[derive(Debug, Clone)]
pub struct Liveness {
    last_activity: Arc<Mutex<Instant>>,
    abandoned: CancellationToken,
}

impl Liveness {
    fn new() -> Self {
        Self {
            last_activity: Arc::new(Mutex::new(Instant::now())),
            abandoned: CancellationToken::new(),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Ask whoever holds the session to give it up.
    pub fn abandon(&self) {
        self.abandoned.cancel();
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_cancelled()
    }

    /// Resolves once the session has been abandoned.
    pub async fn abandoned(&self) {
        self.abandoned.cancelled().await
    }
}

/// One running encoder process plus the output retained for resumption.
///
/// Guarded by a per-session async mutex: whoever holds it is the only reader
/// of the encoder output.
pub struct EncodeSession {
    id: Uuid,
    path: PathBuf,
    process: Box<dyn EncoderProcess>,
    window: RetainedWindow,
    liveness: Liveness,
    started_at: DateTime<Utc>,
    closed: bool,
}

impl EncodeSession {
    pub fn new(
        id: Uuid,
        path: PathBuf,
        process: Box<dyn EncoderProcess>,
        max_blocks: usize,
        preamble: Option<Bytes>,
    ) -> Self {
        let mut window = RetainedWindow::new(max_blocks.max(1));
        if let Some(preamble) = preamble.filter(|p| !p.is_empty()) {
            window.push(preamble);
        }
        Self {
            id,
            path,
            process,
            window,
            liveness: Liveness::new(),
            started_at: Utc::now(),
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn window(&self) -> &RetainedWindow {
        &self.window
    }

    /// Whether the session has been torn down and must not be used again.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Record activity, postponing the idle reaper.
    pub fn touch(&self) {
        self.liveness.touch();
    }

    pub fn idle_for(&self) -> Duration {
        self.liveness.idle_for()
    }

    /// Read the next output block and retain it.
    ///
    /// An empty block means the encoder has finished.
    pub async fn next_block(&mut self, max: usize) -> std::io::Result<Bytes> {
        let block = self.process.read_block(max).await?;
        self.touch();
        if !block.is_empty() {
            self.window.push(block.clone());
        }
        Ok(block)
    }

    /// Drop the retained bytes after they were delivered.
    pub fn release_window(&mut self) {
        self.window.clear();
    }

    /// Stop the encoder and mark the session closed. Idempotent.
    pub async fn close(&mut self, policy: TerminationPolicy) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.window.clear();
        if let Err(e) = shutdown(self.process.as_mut(), policy).await {
            tracing::warn!(
                session_id = %self.id,
                path = %self.path.display(),
                error = %e,
                "Failed to stop encoder"
            );
        }
    }
}

impl std::fmt::Debug for EncodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeSession")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("pid", &self.process.id())
            .field("window", &self.window)
            .field("closed", &self.closed)
            .finish()
    }
}
