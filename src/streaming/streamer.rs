//! Delivery of encoder output to a client, resumable at a byte offset.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use setbox_av::ProcessLauncher;
use setbox_core::config::StreamingConfig;
use setbox_core::{Error, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::chunked::write_chunk;
use super::registry::{RegistryOptions, SessionRegistry};
use super::session::{EncodeSession, Liveness};

/// What to run for a source file that is not already being encoded.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    /// Source file; also the session key.
    pub path: PathBuf,
    /// Encoder binary.
    pub program: PathBuf,
    /// Full encoder argument list.
    pub args: Vec<String>,
    /// Bytes placed at offset 0 of the encoded stream.
    pub preamble: Option<Bytes>,
}

/// Why a transfer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEnd {
    /// The encoder finished and everything was delivered.
    Completed,
    /// Writing to the client failed; the session stays resumable.
    ClientGone,
}

/// Summary of one request's transfer.
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub session_id: Uuid,
    /// Offset the transfer started at.
    pub offset: u64,
    /// Payload bytes delivered, excluding chunk framing.
    pub bytes_written: u64,
    /// Whether an existing session was reused.
    pub resumed: bool,
    pub end: StreamEnd,
}

/// Streams encoder output for a file, sharing one encoder per file across
/// requests.
#[derive(Debug, Clone)]
pub struct Streamer {
    registry: Arc<SessionRegistry>,
    block_size: usize,
}

impl Streamer {
    pub fn new(registry: Arc<SessionRegistry>, block_size: usize) -> Self {
        Self {
            registry,
            block_size: block_size.max(1),
        }
    }

    pub fn from_config(launcher: Arc<dyn ProcessLauncher>, config: &StreamingConfig) -> Self {
        let registry = SessionRegistry::new(launcher, RegistryOptions::from_config(config));
        Self::new(registry, config.effective_block_size())
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Write the encoded stream for `request` from `offset` on to `sink` as
    /// chunk frames.
    ///
    /// Offset 0 starts an encoder if none runs for the file. Other offsets
    /// must resume an existing session: either inside its retained window or
    /// exactly at its end. An unreachable offset tears the session down and
    /// fails with [`Error::ResumeOffsetInvalid`], except at offset 0 where
    /// the encode is restarted.
    pub async fn stream<W>(
        &self,
        request: &EncodeRequest,
        offset: u64,
        sink: &mut W,
    ) -> Result<StreamReport>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        loop {
            let (handle, started) = if offset == 0 {
                self.registry.get_or_start(
                    &request.path,
                    &request.program,
                    &request.args,
                    request.preamble.clone(),
                )?
            } else {
                match self.registry.get(&request.path) {
                    Some(handle) => (handle, false),
                    None => {
                        return Err(Error::resume_offset(
                            offset,
                            "no encoder session for this file",
                        ))
                    }
                }
            };

            let mut session = handle.session.lock().await;
            if session.liveness().is_abandoned() {
                // The reaper gave up on it while a stalled request held it.
                self.teardown(&mut session).await;
            }
            if session.is_closed() {
                // Torn down while this request waited for the lock.
                if offset == 0 {
                    continue;
                }
                return Err(Error::resume_offset(offset, "encoder session has ended"));
            }

            let (start, end) = (session.window().start(), session.window().end());
            if session.window().covers(offset) || offset == end {
                return self.transfer(&mut session, offset, !started, sink).await;
            }

            self.teardown(&mut session).await;
            if offset == 0 {
                info!(
                    path = %request.path.display(),
                    window_start = start,
                    "Offset 0 no longer retained; restarting encode"
                );
                continue;
            }
            return Err(Error::resume_offset(
                offset,
                format!("retained window is {start}..{end}"),
            ));
        }
    }

    async fn transfer<W>(
        &self,
        session: &mut EncodeSession,
        offset: u64,
        resumed: bool,
        sink: &mut W,
    ) -> Result<StreamReport>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut report = StreamReport {
            session_id: session.id(),
            offset,
            bytes_written: 0,
            resumed,
            end: StreamEnd::Completed,
        };

        let liveness = session.liveness().clone();
        let replay = session.window().replay_from(offset);
        if !replay.is_empty() {
            debug!(
                session_id = %report.session_id,
                offset,
                window_end = session.window().end(),
                "Replaying retained output"
            );
        }
        for block in replay {
            match unless_abandoned(&liveness, write_chunk(sink, &block)).await {
                None => return Err(self.give_up(session).await),
                Some(Err(e)) => return Ok(self.client_gone(session, report, &e)),
                Some(Ok(())) => report.bytes_written += block.len() as u64,
            }
        }
        session.touch();
        session.release_window();

        loop {
            let block = match unless_abandoned(&liveness, session.next_block(self.block_size)).await
            {
                None => return Err(self.give_up(session).await),
                Some(Ok(block)) => block,
                Some(Err(e)) => {
                    error!(
                        session_id = %report.session_id,
                        error = %e,
                        "Failed to read encoder output"
                    );
                    self.teardown(session).await;
                    return Err(Error::process_io("read encoder output", e));
                }
            };

            if block.is_empty() {
                match unless_abandoned(&liveness, sink.flush()).await {
                    None => return Err(self.give_up(session).await),
                    Some(Err(e)) => return Ok(self.client_gone(session, report, &e)),
                    Some(Ok(())) => {}
                }
                info!(
                    session_id = %report.session_id,
                    path = %session.path().display(),
                    bytes = report.bytes_written,
                    "Encode complete"
                );
                self.teardown(session).await;
                return Ok(report);
            }

            match unless_abandoned(&liveness, write_chunk(sink, &block)).await {
                None => return Err(self.give_up(session).await),
                Some(Err(e)) => return Ok(self.client_gone(session, report, &e)),
                Some(Ok(())) => report.bytes_written += block.len() as u64,
            }
        }
    }

    /// Tear down a session the reaper abandoned while this request held it.
    async fn give_up(&self, session: &mut EncodeSession) -> Error {
        warn!(
            session_id = %session.id(),
            path = %session.path().display(),
            idle_secs = session.idle_for().as_secs(),
            "No encoder activity within the idle timeout; stopping encoder"
        );
        self.teardown(session).await;
        Error::process_io(
            "stream encoder output",
            io::Error::new(io::ErrorKind::TimedOut, "encoder session abandoned"),
        )
    }

    fn client_gone(
        &self,
        session: &mut EncodeSession,
        mut report: StreamReport,
        error: &std::io::Error,
    ) -> StreamReport {
        session.touch();
        info!(
            session_id = %report.session_id,
            bytes = report.bytes_written,
            resume_from = session.window().start(),
            error = %error,
            "Client disconnected; session kept for resumption"
        );
        report.end = StreamEnd::ClientGone;
        report
    }

    async fn teardown(&self, session: &mut EncodeSession) {
        self.registry.remove(session.path(), session.id());
        session.close(self.registry.options().termination).await;
    }
}

/// Run `op` unless the session is abandoned first.
async fn unless_abandoned<T>(liveness: &Liveness, op: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = liveness.abandoned() => None,
        out = op => Some(out),
    }
}
