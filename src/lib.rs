//! Setbox - transcode decisions and resumable streaming for set-top boxes
//!
//! This library crate exposes the engine for the binary and for integration
//! testing: device-aware pass-through decisions, encoder command construction
//! and a resumable, process-backed streamer.

pub mod config;
pub mod decision;
pub mod encode;
pub mod service;
pub mod streaming;

pub use service::{Plan, ServeOutcome, ServeRequest, TranscodeService};
