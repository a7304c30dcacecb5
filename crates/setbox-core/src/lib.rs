//! setbox-core: shared types, errors and configuration.
//!
//! This crate is the foundational dependency for the other setbox crates,
//! providing the unified error type, the probed [`SourceDescriptor`], the
//! per-device [`DeviceProfile`] and the configuration tree it is resolved
//! from.

pub mod bitrate;
pub mod config;
pub mod error;
pub mod media;
pub mod profile;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use media::*;
pub use profile::{AspectPolicy, DeviceClass, DeviceProfile};
