//! Resumable streaming of encoder output.
//!
//! One encoder process runs per source file. Its output is framed as HTTP
//! chunks and the last few blocks are retained, so a client that drops the
//! connection can reconnect at the byte offset it reached and pick up where
//! it left off. Sessions that nobody reads from are reaped after an idle
//! timeout.

pub mod chunked;
mod registry;
mod session;
mod streamer;
mod window;

pub use registry::{RegistryOptions, SessionHandle, SessionInfo, SessionRegistry, SharedSession};
pub use session::{EncodeSession, Liveness};
pub use streamer::{EncodeRequest, StreamEnd, StreamReport, Streamer};
pub use window::RetainedWindow;
