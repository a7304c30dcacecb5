//! Builder for executing short-lived external tool commands.
//!
//! Used for the prober and for version detection. Long-running encoder
//! processes go through [`crate::process`] instead, since their output is
//! consumed incrementally.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use setbox_av::ToolCommand;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// # async fn example() -> setbox_core::Result<()> {
/// // `ffmpeg -i` without an output exits non-zero but still prints the
/// // stream report on stderr.
/// let output = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-i")
///     .arg("/path/to/video.mkv")
///     .timeout(Duration::from_secs(10))
///     .allow_failure()
///     .execute()
///     .await?;
/// println!("{}", output.stderr);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
    allow_failure: bool,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    ///
    /// Without [`timeout`](Self::timeout) the command may run forever.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: None,
            allow_failure: false,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time. The process is killed when it expires.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = Some(d);
        self
    }

    /// Optional variant of [`timeout`](Self::timeout).
    pub fn maybe_timeout(&mut self, d: Option<Duration>) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Treat a non-zero exit status as success.
    pub fn allow_failure(&mut self) -> &mut Self {
        self.allow_failure = true;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// Standard input is closed so tools that prompt never block.
    ///
    /// # Errors
    ///
    /// - Returns [`setbox_core::Error::Tool`] if the process times out (message
    ///   includes the timeout duration). The process is killed.
    /// - Returns [`setbox_core::Error::Tool`] if the process exits with a
    ///   non-zero status, unless [`allow_failure`](Self::allow_failure) is set.
    /// - Returns [`setbox_core::Error::Tool`] if spawning the process fails.
    pub async fn execute(&self) -> setbox_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| setbox_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    return Err(setbox_core::Error::tool(
                        program_name,
                        format!("timed out after {limit:?}"),
                    ));
                }
            },
            None => child.wait_with_output().await,
        };

        let output = result.map_err(|e| {
            setbox_core::Error::tool(&program_name, format!("I/O error waiting for process: {e}"))
        })?;

        let tool_output = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() && !self.allow_failure {
            return Err(setbox_core::Error::tool(
                program_name,
                format!(
                    "exited with status {}: {}",
                    output.status,
                    tool_output.stderr.trim()
                ),
            ));
        }

        Ok(tool_output)
    }
}
