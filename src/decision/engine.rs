use std::fmt;

use serde::{Deserialize, Serialize};
use setbox_core::{DeviceProfile, OutputFormat, SourceDescriptor};

use super::audio_track::select_audio_track;

/// Video codecs a program stream may carry untouched.
const PS_VIDEO_CODECS: &[&str] = &["mpeg2video", "mpeg1video"];
/// Video codecs a transport stream may carry untouched.
const TS_VIDEO_CODECS: &[&str] = &["h264", "mpeg2video"];
/// Audio codecs a program stream may carry untouched.
const PS_AUDIO_CODECS: &[&str] = &["ac3", "liba52", "mp2"];
/// Audio codecs a transport stream may carry untouched.
const TS_AUDIO_CODECS: &[&str] = &["ac3", "liba52", "mp2", "aac_latm"];

/// Frame rates SD devices play natively.
const SD_FRAME_RATES: &[&str] = &["29.97", "59.94"];
/// Display aspect ratios accepted by devices that cannot show 16:9.
const NARROW_ASPECTS: &[&str] = &["4:3", "8:9", "880:657"];
/// Resolutions SD devices play natively.
const SD_MODES: &[(u32, u32)] = &[
    (720, 480),
    (704, 480),
    (544, 480),
    (528, 480),
    (480, 480),
    (352, 480),
    (352, 240),
];

/// What to do with one stream (or with the container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamAction {
    PassThrough,
    Reencode,
}

impl StreamAction {
    fn from_failure(failure: &Option<String>) -> Self {
        if failure.is_some() {
            StreamAction::Reencode
        } else {
            StreamAction::PassThrough
        }
    }
}

/// Outcome of checking a source against a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub video: StreamAction,
    pub audio: StreamAction,
    pub container: StreamAction,
    /// The first failing rule, in video, audio, container order.
    pub reason: String,
    /// Observations that did not affect the outcome.
    pub notes: Vec<String>,
}

impl Decision {
    /// The file can be sent as is.
    pub fn is_pass_through(&self) -> bool {
        self.video == StreamAction::PassThrough
            && self.audio == StreamAction::PassThrough
            && self.container == StreamAction::PassThrough
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.is_pass_through() {
            "pass-through"
        } else {
            "transcode"
        };
        write!(f, "{verdict}: {}", self.reason)
    }
}

/// The format actually served: transport streams are only sent to devices
/// that can play them.
pub fn negotiate_format(requested: OutputFormat, profile: &DeviceProfile) -> OutputFormat {
    match requested {
        OutputFormat::TransportStream if !profile.transport_stream_capable => {
            tracing::debug!(
                identity = %profile.identity,
                "device cannot play transport streams, serving a program stream"
            );
            OutputFormat::ProgramStream
        }
        other => other,
    }
}

/// Decide, per stream, whether `desc` can be sent to the device untouched.
pub fn decide(desc: &SourceDescriptor, profile: &DeviceProfile, format: OutputFormat) -> Decision {
    if !desc.supported {
        return Decision {
            video: StreamAction::Reencode,
            audio: StreamAction::Reencode,
            container: StreamAction::Reencode,
            reason: "source format not supported".to_string(),
            notes: Vec::new(),
        };
    }

    let video = video_failure(desc, profile, format);
    let (audio, note) = audio_failure(desc, profile, format);
    let container = container_failure(desc, format);

    let reason = video
        .clone()
        .or_else(|| audio.clone())
        .or_else(|| container.clone())
        .unwrap_or_else(|| "all compatible".to_string());

    let decision = Decision {
        video: StreamAction::from_failure(&video),
        audio: StreamAction::from_failure(&audio),
        container: StreamAction::from_failure(&container),
        reason,
        notes: note.into_iter().collect(),
    };
    tracing::debug!(
        identity = %profile.identity,
        format = %format,
        pass_through = decision.is_pass_through(),
        reason = %decision.reason,
        "transcode decision"
    );
    decision
}

fn video_failure(
    desc: &SourceDescriptor,
    profile: &DeviceProfile,
    format: OutputFormat,
) -> Option<String> {
    let codecs = match format {
        OutputFormat::ProgramStream => PS_VIDEO_CODECS,
        OutputFormat::TransportStream => TS_VIDEO_CODECS,
    };
    if !codecs.contains(&desc.video_codec.as_str()) {
        return Some(format!("video codec {} not compatible", desc.video_codec));
    }
    // Transport streams are judged on the codec alone.
    if format == OutputFormat::TransportStream {
        return None;
    }

    let Some(kbps) = desc.video_kbps else {
        return Some("video bitrate unknown".to_string());
    };
    let video_kbps = u64::from(kbps).saturating_sub(u64::from(desc.audio_kbps.unwrap_or(0)));
    if video_kbps > profile.max_video_bitrate / 1000 {
        return Some(format!("{kbps} kbps exceeds max video bitrate"));
    }

    if profile.class.is_high_definition() {
        return None;
    }

    if !SD_FRAME_RATES.contains(&desc.frame_rate.as_str()) {
        return Some(format!("frame rate {} should be 29.97", desc.frame_rate));
    }

    let aspect = profile.aspect;
    let narrow_only =
        (aspect.blacklist_16x9 && !aspect.allow_16x9) || (aspect.letterbox_16x9 && aspect.allow_16x9);
    if narrow_only {
        if let Some(dar) = desc.display_aspect_ratio.as_deref() {
            if !NARROW_ASPECTS.contains(&dar) {
                return Some(format!("display aspect {dar} not supported by this device"));
            }
        }
    }

    let mode = (desc.video_width, desc.video_height);
    if !SD_MODES.contains(&mode) {
        return Some(format!("{}x{} not in supported modes", mode.0, mode.1));
    }

    None
}

fn audio_failure(
    desc: &SourceDescriptor,
    profile: &DeviceProfile,
    format: OutputFormat,
) -> (Option<String>, Option<String>) {
    if !desc.has_audio() {
        return (None, None);
    }

    let codecs = match format {
        OutputFormat::ProgramStream => PS_AUDIO_CODECS,
        OutputFormat::TransportStream => TS_AUDIO_CODECS,
    };
    if !codecs.contains(&desc.audio_codec.as_str()) {
        return (
            Some(format!("audio codec {} not compatible", desc.audio_codec)),
            None,
        );
    }
    if format == OutputFormat::TransportStream {
        return (None, None);
    }

    match desc.audio_kbps {
        Some(kbps) if kbps <= profile.max_audio_kbps => {}
        Some(kbps) => return (Some(format!("{kbps} kbps exceeds max audio bitrate")), None),
        None => return (Some("audio bitrate unknown".to_string()), None),
    }

    let note = if profile.audio_languages.is_empty() {
        None
    } else {
        let selected = select_audio_track(&desc.audio_streams, &profile.audio_languages);
        match (selected, desc.default_audio_stream()) {
            (Some(selected), Some(default)) if selected.id != default.id => Some(format!(
                "preferred audio track {} is not the default track {}",
                selected.id, default.id
            )),
            _ => None,
        }
    };
    (None, note)
}

fn container_failure(desc: &SourceDescriptor, format: OutputFormat) -> Option<String> {
    let compatible = match format {
        OutputFormat::ProgramStream => {
            desc.container == format.container_name() && desc.video_codec != "mpeg1video"
        }
        OutputFormat::TransportStream => desc.container == format.container_name(),
    };
    if compatible {
        None
    } else {
        Some(format!("container {} not compatible", desc.container))
    }
}
