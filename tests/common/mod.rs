//! Shared test harness for integration tests.
//!
//! Provides [`FakeLauncher`], which hands out scripted encoder processes and
//! records every launch, a [`FailingSink`] that simulates a client dropping
//! the connection, and helpers to decode chunked bodies.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use setbox::streaming::{RegistryOptions, SessionRegistry, Streamer};
use setbox_av::{EncoderProcess, ProcessLauncher, TerminationPolicy};
use tokio::io::AsyncWrite;

/// Prober report of a native MPEG-2 program stream.
pub const MPEG2_PS_REPORT: &str = "\
Input #0, mpeg, from 'show.mpg':
  Duration: 00:30:00.52, start: 0.220000, bitrate: 6600 kb/s
    Stream #0:0[0x1e0]: Video: mpeg2video (Main), yuv420p(tv, top first), 720x480 [SAR 8:9 DAR 4:3], 6000 kb/s, 29.97 fps, 29.97 tbr, 90k tbn, 59.94 tbc
    Stream #0:1[0x80]: Audio: ac3, 48000 Hz, stereo, fltp, 192 kb/s
At least one output file must be specified
";

/// Prober report of a Matroska file that always needs re-encoding for SD.
pub const MKV_H264_REPORT: &str = "\
Input #0, matroska,webm, from 'movie.mkv':
  Duration: 01:42:10.125, start: 0.000000, bitrate: 9500 kb/s
    Stream #0:0(eng): Video: h264 (High), yuv420p(progressive), 1280x720 [SAR 1:1 DAR 16:9], 23.98 fps, 23.98 tbr, 1k tbn, 47.95 tbc (default)
    Stream #0:1(eng): Audio: dts (DTS), 48000 Hz, 5.1(side), fltp, 1536 kb/s (default)
    Stream #0:2(fre): Audio: ac3, 48000 Hz, 5.1(side), fltp, 448 kb/s
";

// ---------------------------------------------------------------------------
// Scripted encoder processes
// ---------------------------------------------------------------------------

/// What a scripted process does once its blocks are used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    /// Close the output (end of stream).
    Eof,
    /// Fail the next read.
    ReadError,
    /// Never produce anything again until stopped.
    Hang,
}

/// Observable state of one scripted process.
#[derive(Debug, Default)]
pub struct ProcessState {
    pub terminations: AtomicU32,
    pub killed: AtomicBool,
    pub exited: AtomicBool,
}

impl ProcessState {
    pub fn is_stopped(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

pub struct ScriptedProcess {
    blocks: VecDeque<Bytes>,
    tail: Tail,
    state: Arc<ProcessState>,
}

#[async_trait]
impl EncoderProcess for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    async fn read_block(&mut self, _max: usize) -> io::Result<Bytes> {
        if let Some(block) = self.blocks.pop_front() {
            return Ok(block);
        }
        match self.tail {
            Tail::Eof => Ok(Bytes::new()),
            Tail::ReadError => Err(io::Error::new(io::ErrorKind::Other, "encoder crashed")),
            Tail::Hang => std::future::pending().await,
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.state.terminations.fetch_add(1, Ordering::SeqCst);
        self.state.exited.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.state.killed.store(true, Ordering::SeqCst);
        self.state.exited.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        if self.state.is_stopped() {
            return Ok(true);
        }
        tokio::time::sleep(timeout).await;
        Ok(self.state.is_stopped())
    }
}

/// One recorded launch.
#[derive(Debug, Clone)]
pub struct Launch {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub state: Arc<ProcessState>,
}

/// Launcher whose every process emits the same scripted blocks.
pub struct FakeLauncher {
    blocks: Vec<Bytes>,
    tail: Tail,
    launches: Mutex<Vec<Launch>>,
}

impl FakeLauncher {
    pub fn new(blocks: Vec<Bytes>, tail: Tail) -> Arc<Self> {
        Arc::new(Self {
            blocks,
            tail,
            launches: Mutex::new(Vec::new()),
        })
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.launches.lock().clone()
    }

    pub fn last_state(&self) -> Arc<ProcessState> {
        let launches = self.launches.lock();
        Arc::clone(&launches.last().expect("no process launched").state)
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn EncoderProcess>> {
        let state = Arc::new(ProcessState::default());
        self.launches.lock().push(Launch {
            program: program.to_path_buf(),
            args: args.to_vec(),
            state: Arc::clone(&state),
        });
        Ok(Box::new(ScriptedProcess {
            blocks: self.blocks.iter().cloned().collect(),
            tail: self.tail,
            state,
        }))
    }
}

/// `count` blocks of `len` bytes, filled with `a`, `b`, `c`, ...
pub fn lettered_blocks(count: usize, len: usize) -> Vec<Bytes> {
    (0..count)
        .map(|i| Bytes::from(vec![b'a' + i as u8; len]))
        .collect()
}

/// Registry options suitable for fast tests.
pub fn test_options(max_blocks: usize, idle_timeout: Duration) -> RegistryOptions {
    RegistryOptions {
        max_blocks,
        idle_timeout,
        termination: TerminationPolicy {
            graceful_attempts: 3,
            pause: Duration::from_millis(20),
        },
    }
}

/// A streamer over `launcher` retaining `max_blocks` blocks.
pub fn streamer(launcher: Arc<FakeLauncher>, max_blocks: usize) -> Streamer {
    let registry = SessionRegistry::new(launcher, test_options(max_blocks, Duration::from_secs(600)));
    Streamer::new(registry, 64 * 1024)
}

// ---------------------------------------------------------------------------
// Client sinks
// ---------------------------------------------------------------------------

/// Accepts `limit` bytes, then fails every write like a closed socket.
pub struct FailingSink {
    pub received: Vec<u8>,
    limit: usize,
}

impl FailingSink {
    pub fn new(limit: usize) -> Self {
        Self {
            received: Vec::new(),
            limit,
        }
    }
}

impl AsyncWrite for FailingSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let room = self.limit - self.received.len();
        if room == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "client closed the connection",
            )));
        }
        let n = room.min(buf.len());
        self.received.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Payload bytes of a chunked body, tolerating a truncated final chunk.
pub fn dechunk(mut body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    loop {
        let Some(eol) = body.windows(2).position(|w| w == b"\r\n") else {
            break;
        };
        let size = match std::str::from_utf8(&body[..eol])
            .ok()
            .and_then(|s| usize::from_str_radix(s, 16).ok())
        {
            Some(size) => size,
            None => break,
        };
        if size == 0 {
            break;
        }
        let data = &body[eol + 2..];
        let take = size.min(data.len());
        payload.extend_from_slice(&data[..take]);
        if take < size || data.len() < size + 2 {
            break;
        }
        body = &data[size + 2..];
    }
    payload
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

/// A prober script printing `report` on stderr and counting its runs in
/// `counter`.
#[cfg(unix)]
pub fn write_prober(path: &Path, report: &str, counter: &Path) {
    let body = format!(
        "echo run >> '{}'\ncat >&2 <<'REPORT'\n{}REPORT\nexit 1\n",
        counter.display(),
        report
    );
    write_script(path, &body);
}

/// Number of lines in a run counter file; 0 when it does not exist.
pub fn run_count(counter: &Path) -> usize {
    std::fs::read_to_string(counter)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
