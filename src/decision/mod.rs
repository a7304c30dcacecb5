//! Pass-through versus re-encode decisions.
//!
//! [`decide`] checks a probed source against a device profile stream by
//! stream. A source that fails a rule is not an error: the failing stream is
//! simply re-encoded.

mod audio_track;
mod engine;

pub use audio_track::{select_audio_track, track_matches};
pub use engine::{decide, negotiate_format, Decision, StreamAction};
