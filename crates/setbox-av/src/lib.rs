//! # setbox-av
//!
//! External tool management, probing and encoder processes for setbox.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache the paths of the
//!   encoder and the prober.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for short-lived external processes.
//! - **Encoder processes** ([`process`]) -- the cancellable process handle the
//!   streamer reads encoded output from, with graceful termination.
//! - **Probing** ([`probe`]) -- turn the prober's textual report and sidecar
//!   override files into a cached [`setbox_core::SourceDescriptor`].

pub mod command;
pub mod probe;
pub mod process;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use probe::{parse_report, DescriptorCache, SourceProbe};
pub use process::{
    shutdown, ChildLauncher, ChildProcess, EncoderProcess, ProcessLauncher, TerminationPolicy,
};
pub use tools::{ToolInfo, ToolRegistry};
