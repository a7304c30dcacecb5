//! Encoder process handles.
//!
//! The streamer never talks to [`tokio::process::Child`] directly: it owns a
//! boxed [`EncoderProcess`], which lets tests substitute scripted doubles and
//! keeps the termination policy in one place ([`shutdown`]).

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// A running encoder whose standard output is consumed block by block.
#[async_trait]
pub trait EncoderProcess: Send {
    /// OS process id, when there is one.
    fn id(&self) -> Option<u32>;

    /// Read up to `max` bytes, returning fewer only at end of output.
    ///
    /// An empty block means the encoder closed its output.
    async fn read_block(&mut self, max: usize) -> io::Result<Bytes>;

    /// Ask the process to exit (SIGTERM on unix).
    fn terminate(&mut self) -> io::Result<()>;

    /// Forcefully kill the process.
    fn kill(&mut self) -> io::Result<()>;

    /// Wait up to `timeout` for the process to exit. Returns whether it did.
    async fn wait(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// How [`shutdown`] escalates from a graceful request to a forceful kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    /// Graceful termination requests sent before killing.
    pub graceful_attempts: u32,
    /// Time given to the process to exit after each signal.
    pub pause: Duration,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            graceful_attempts: 3,
            pause: Duration::from_millis(500),
        }
    }
}

/// Stop a process: terminate up to `graceful_attempts` times, then kill
/// repeatedly until it has exited.
pub async fn shutdown(
    process: &mut dyn EncoderProcess,
    policy: TerminationPolicy,
) -> io::Result<()> {
    let pid = process.id();

    for attempt in 1..=policy.graceful_attempts {
        tracing::debug!(?pid, attempt, "terminating encoder");
        process.terminate()?;
        if process.wait(policy.pause).await? {
            tracing::debug!(?pid, "encoder exited");
            return Ok(());
        }
    }

    loop {
        tracing::debug!(?pid, "killing encoder");
        process.kill()?;
        if process.wait(policy.pause).await? {
            tracing::debug!(?pid, "encoder killed");
            return Ok(());
        }
    }
}

// ---------------------------------------------------------------------------
// Child process implementation
// ---------------------------------------------------------------------------

/// [`EncoderProcess`] backed by a tokio child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    stdout: Option<ChildStdout>,
}

impl ChildProcess {
    /// Wrap a child spawned with a piped stdout.
    pub fn new(mut child: Child) -> Self {
        let stdout = child.stdout.take();
        Self { child, stdout }
    }
}

#[async_trait]
impl EncoderProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn read_block(&mut self, max: usize) -> io::Result<Bytes> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(Bytes::new());
        };

        let mut buf = vec![0u8; max];
        let mut filled = 0;
        let mut eof = false;
        while filled < max {
            let n = stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                eof = true;
                break;
            }
            filled += n;
        }
        if eof {
            self.stdout = None;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // `id()` is None once the child has been reaped.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.child.id().is_none() {
            return Ok(());
        }
        self.child.start_kill()
    }

    async fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_status)) => Ok(true),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Launching
// ---------------------------------------------------------------------------

/// Starts encoder processes. Injected so tests can count launches.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn EncoderProcess>>;
}

/// Launches real child processes with stdout piped and stdin/stderr closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildLauncher;

impl ProcessLauncher for ChildLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn EncoderProcess>> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        tracing::debug!(pid = ?child.id(), program = %program.display(), "encoder started");
        Ok(Box::new(ChildProcess::new(child)))
    }
}
