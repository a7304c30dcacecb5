//! Encoder invocation: the argument list that turns a source into something
//! the device can play.

pub mod aspect;
mod builder;

pub use builder::{build, encoder_args, map_args, select_audio_codec, video_bitrate, AudioCodec};
