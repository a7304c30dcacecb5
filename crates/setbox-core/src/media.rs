//! Media-domain types shared by the probe, the decision engine and the
//! command builder.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// MIME type requesting an MPEG transport stream.
pub const MIME_MPEG_TS: &str = "video/x-tivo-mpeg-ts";
/// MIME type requesting an MPEG program stream.
pub const MIME_MPEG_PS: &str = "video/x-tivo-mpeg";
/// Generic MPEG MIME type, served as a program stream.
pub const MIME_MPEG: &str = "video/mpeg";

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

/// Container the client asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// MPEG-2 program stream (`vob` muxer).
    ProgramStream,
    /// MPEG-2 transport stream.
    TransportStream,
}

impl OutputFormat {
    /// Map a requested MIME type onto an output format.
    ///
    /// Anything that is not the transport stream MIME type is served as a
    /// program stream.
    pub fn from_mime(mime: &str) -> Self {
        if mime.eq_ignore_ascii_case(MIME_MPEG_TS) {
            OutputFormat::TransportStream
        } else {
            OutputFormat::ProgramStream
        }
    }

    /// Container name the prober reports for a file already in this format.
    pub fn container_name(self) -> &'static str {
        match self {
            OutputFormat::ProgramStream => "mpeg",
            OutputFormat::TransportStream => "mpegts",
        }
    }

    /// Encoder muxer name (`-f` argument).
    pub fn muxer(self) -> &'static str {
        match self {
            OutputFormat::ProgramStream => "vob",
            OutputFormat::TransportStream => "mpegts",
        }
    }

    /// MIME type announced to the client.
    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::ProgramStream => MIME_MPEG_PS,
            OutputFormat::TransportStream => MIME_MPEG_TS,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

// ---------------------------------------------------------------------------
// Source descriptor
// ---------------------------------------------------------------------------

/// Pixel aspect ratio reported by the prober (`PAR num:den`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelAspectRatio {
    pub num: u32,
    pub den: u32,
    /// `num / den`.
    pub value: f64,
}

impl PixelAspectRatio {
    /// Build a ratio, rejecting zero terms.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        Some(Self {
            num,
            den,
            value: f64::from(num) / f64::from(den),
        })
    }

    /// Parse `num:den`.
    pub fn parse(s: &str) -> Option<Self> {
        let (num, den) = s.trim().split_once(':')?;
        Self::new(num.trim().parse().ok()?, den.trim().parse().ok()?)
    }

    /// The `num:den` form, as the prober prints it.
    pub fn label(&self) -> String {
        format!("{}:{}", self.num, self.den)
    }
}

/// One audio stream as detected by the prober.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStream {
    /// Stream specifier usable with `-map`, e.g. `0:1`.
    pub id: String,
    /// Free text following the stream id, including the language tag.
    pub description: String,
}

impl AudioStream {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Technical description of a source file, rebuilt whenever the file changes.
///
/// When `supported` is false the remaining fields are best-effort defaults and
/// the file must never be passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Whether the probe extracted enough to make any decision.
    pub supported: bool,
    /// Container name (`mpeg`, `mpegts`, `matroska,webm`, ...); empty if unknown.
    pub container: String,
    /// Video codec name; empty if unknown.
    pub video_codec: String,
    /// Audio codec name; empty for silent sources.
    pub audio_codec: String,
    pub video_width: u32,
    pub video_height: u32,
    /// Decimal frame rate such as `29.97`.
    pub frame_rate: String,
    pub duration_millis: u64,
    /// Overall stream bitrate as reported; includes the audio bitrate.
    pub video_kbps: Option<u32>,
    pub audio_kbps: Option<u32>,
    pub audio_channels: Option<u32>,
    /// Sample rate in Hz, as a string; empty if unknown.
    pub audio_sample_rate: String,
    pub pixel_aspect_ratio: Option<PixelAspectRatio>,
    /// Display aspect ratio tag such as `16:9`.
    pub display_aspect_ratio: Option<String>,
    /// Stream specifier of the video stream, used for `-map`.
    pub video_stream: Option<String>,
    /// Audio streams in detection order; the first one is the default.
    pub audio_streams: Vec<AudioStream>,
    /// Container metadata passed through to the client.
    pub raw_metadata: BTreeMap<String, String>,
}

impl Default for SourceDescriptor {
    fn default() -> Self {
        Self {
            supported: false,
            container: String::new(),
            video_codec: String::new(),
            audio_codec: String::new(),
            video_width: 0,
            video_height: 0,
            frame_rate: String::new(),
            duration_millis: 0,
            video_kbps: None,
            audio_kbps: None,
            audio_channels: None,
            audio_sample_rate: String::new(),
            pixel_aspect_ratio: None,
            display_aspect_ratio: None,
            video_stream: None,
            audio_streams: Vec::new(),
            raw_metadata: BTreeMap::new(),
        }
    }
}

impl SourceDescriptor {
    /// Descriptor for a file that could not be probed.
    pub fn unsupported() -> Self {
        Self::default()
    }

    /// Whether the source carries any audio at all.
    pub fn has_audio(&self) -> bool {
        !self.audio_codec.is_empty()
    }

    /// Pixel aspect ratio as a float, assuming square pixels when unknown.
    pub fn pixel_aspect(&self) -> f64 {
        self.pixel_aspect_ratio.map(|p| p.value).unwrap_or(1.0)
    }

    /// The default (first detected) audio stream.
    pub fn default_audio_stream(&self) -> Option<&AudioStream> {
        self.audio_streams.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_mime() {
        assert_eq!(
            OutputFormat::from_mime("video/x-tivo-mpeg-ts"),
            OutputFormat::TransportStream
        );
        assert_eq!(
            OutputFormat::from_mime("video/x-tivo-mpeg"),
            OutputFormat::ProgramStream
        );
        assert_eq!(OutputFormat::from_mime(""), OutputFormat::ProgramStream);
        assert_eq!(
            OutputFormat::from_mime("video/mpeg"),
            OutputFormat::ProgramStream
        );
    }

    #[test]
    fn output_format_names() {
        assert_eq!(OutputFormat::ProgramStream.muxer(), "vob");
        assert_eq!(OutputFormat::ProgramStream.container_name(), "mpeg");
        assert_eq!(OutputFormat::TransportStream.muxer(), "mpegts");
        assert_eq!(OutputFormat::TransportStream.container_name(), "mpegts");
    }

    #[test]
    fn pixel_aspect_parse() {
        let par = PixelAspectRatio::parse("32:27").unwrap();
        assert_eq!(par.num, 32);
        assert_eq!(par.den, 27);
        assert!((par.value - 1.185).abs() < 0.001);
        assert_eq!(par.label(), "32:27");
        assert!(PixelAspectRatio::parse("0:1").is_none());
        assert!(PixelAspectRatio::parse("square").is_none());
    }

    #[test]
    fn unsupported_descriptor_defaults() {
        let d = SourceDescriptor::unsupported();
        assert!(!d.supported);
        assert!(!d.has_audio());
        assert_eq!(d.pixel_aspect(), 1.0);
        assert!(d.default_audio_stream().is_none());
    }

    #[test]
    fn descriptor_serializes() {
        let mut d = SourceDescriptor::unsupported();
        d.audio_streams.push(AudioStream::new("0:1", "(eng): ac3"));
        let json = serde_json::to_string(&d).unwrap();
        let back: SourceDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
