//! Unified error type for setbox.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for the HTTP layer to derive a status code via [`Error::http_status`].
//!
//! A file that fails the compatibility rules is not an error: it simply takes
//! the re-encode path. Write failures towards a client are not errors either;
//! the streamer reports them as a disconnect.

use std::fmt;

/// Unified error type covering all failure modes in setbox.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external prober is missing, crashed or timed out.
    #[error("Prober unavailable: {0}")]
    ProbeUnavailable(String),

    /// No encoder binary is configured or discoverable.
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// The requested resume offset lies outside the retained window.
    #[error("Resume offset {offset} is not reachable: {detail}")]
    ResumeOffsetInvalid {
        /// The byte offset the client asked for.
        offset: u64,
        /// What the session could offer instead.
        detail: String,
    },

    /// Reading from an encoder process failed.
    #[error("Process I/O error [{context}]: {source}")]
    ProcessIo {
        /// What was being done when the failure happened.
        context: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "file", "session").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Configuration or request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::ProbeUnavailable(_) => 422,
            Error::EncoderUnavailable(_) => 503,
            Error::ResumeOffsetInvalid { .. } => 416,
            Error::ProcessIo { .. } => 502,
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::ProcessIo`].
    pub fn process_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::ProcessIo {
            context: context.into(),
            source,
        }
    }

    /// Convenience constructor for [`Error::ResumeOffsetInvalid`].
    pub fn resume_offset(offset: u64, detail: impl Into<String>) -> Self {
        Error::ResumeOffsetInvalid {
            offset,
            detail: detail.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_unavailable_display() {
        let err = Error::ProbeUnavailable("ffmpeg timed out".into());
        assert_eq!(err.to_string(), "Prober unavailable: ffmpeg timed out");
        assert_eq!(err.http_status(), 422);
    }

    #[test]
    fn encoder_unavailable_display() {
        let err = Error::EncoderUnavailable("ffmpeg not found".into());
        assert_eq!(err.to_string(), "Encoder unavailable: ffmpeg not found");
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn resume_offset_display() {
        let err = Error::resume_offset(4096, "window is 8192..16384");
        assert_eq!(
            err.to_string(),
            "Resume offset 4096 is not reachable: window is 8192..16384"
        );
        assert_eq!(err.http_status(), 416);
    }

    #[test]
    fn process_io_display() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = Error::process_io("read encoder output", io);
        assert!(err.to_string().contains("read encoder output"));
        assert!(err.to_string().contains("pipe closed"));
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn not_found_display() {
        let err = Error::not_found("file", "/media/a.mpg");
        assert_eq!(err.to_string(), "file not found: /media/a.mpg");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("bad bitrate".into());
        assert_eq!(err.to_string(), "Validation error: bad bitrate");
        assert_eq!(err.http_status(), 400);
    }
}
