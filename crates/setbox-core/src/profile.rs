//! Device profiles: the capability limits and policy flags of a playback
//! device, resolved from its identity and the layered configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitrate::{parse_bitrate, trunc64_kbps};
use crate::config::{Config, TranscodeSettings};

/// Capability class of a playback device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    #[serde(rename = "sd")]
    StandardDefinition,
    #[serde(rename = "hd")]
    HighDefinition,
    #[serde(rename = "uhd")]
    UltraHighDefinition,
}

/// Identity prefix of the SD devices that letterbox 16:9 material themselves.
const LETTERBOX_PREFIX: &str = "649";

impl DeviceClass {
    /// Derive the class from a device identity.
    ///
    /// Identities starting with `6` or above are high definition, except the
    /// letterboxing SD family. Unknown (empty) identities are treated as SD.
    pub fn from_identity(identity: &str) -> Self {
        match identity.chars().next() {
            Some(c) if c >= '6' && !identity.starts_with(LETTERBOX_PREFIX) => {
                DeviceClass::HighDefinition
            }
            _ => DeviceClass::StandardDefinition,
        }
    }

    /// HD and UHD devices skip the SD frame-rate and resolution checks.
    pub fn is_high_definition(self) -> bool {
        !matches!(self, DeviceClass::StandardDefinition)
    }

    fn default_size(self) -> (u32, u32) {
        match self {
            DeviceClass::StandardDefinition => (544, 480),
            DeviceClass::HighDefinition => (1920, 1080),
            DeviceClass::UltraHighDefinition => (3840, 2160),
        }
    }

    fn default_video_bitrate(self) -> &'static str {
        match self {
            DeviceClass::StandardDefinition => "4096K",
            DeviceClass::HighDefinition => "16384K",
            DeviceClass::UltraHighDefinition => "32768K",
        }
    }

    fn default_max_video_bitrate(self) -> &'static str {
        match self {
            DeviceClass::UltraHighDefinition => "60000k",
            _ => "30000k",
        }
    }

    fn default_buffer_size(self) -> &'static str {
        match self {
            DeviceClass::StandardDefinition => "1024k",
            DeviceClass::HighDefinition => "4096k",
            DeviceClass::UltraHighDefinition => "8192k",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceClass::StandardDefinition => "sd",
            DeviceClass::HighDefinition => "hd",
            DeviceClass::UltraHighDefinition => "uhd",
        };
        f.write_str(s)
    }
}

/// How a device copes with widescreen material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectPolicy {
    /// 16:9 output may be sent.
    pub allow_16x9: bool,
    /// The device letterboxes 16:9 material for a 4:3 display itself.
    pub letterbox_16x9: bool,
    /// The device cannot pad 16:9 material; it must arrive as 4:3.
    pub blacklist_16x9: bool,
}

/// Capability limits of one device, read-only for the duration of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub identity: String,
    pub class: DeviceClass,
    /// Target video bitrate (bits/s) when re-encoding.
    pub video_bitrate: u64,
    /// Maximum video bitrate (bits/s) the device accepts.
    pub max_video_bitrate: u64,
    /// Encoder rate-control buffer (bits).
    pub buffer_size: u64,
    /// Target audio bitrate (kb/s) when re-encoding.
    pub audio_bitrate_kbps: u32,
    /// Maximum audio bitrate (kb/s) the device accepts.
    pub max_audio_kbps: u32,
    /// Output width ceiling.
    pub width: u32,
    /// Output height ceiling.
    pub height: u32,
    /// Lower-cased language tokens, highest priority first.
    pub audio_languages: Vec<String>,
    pub aspect: AspectPolicy,
    pub transport_stream_capable: bool,
    pub optimized_resolution: bool,
    /// Extra encoder arguments appended verbatim.
    pub encoder_params: Option<String>,
}

impl DeviceProfile {
    /// Built-in profile for a device class, without any configuration.
    pub fn for_class(class: DeviceClass) -> Self {
        Self::build(&Config::default(), "", class)
    }

    /// Resolve the profile for a device identity.
    pub fn resolve(config: &Config, identity: &str) -> Self {
        let class = config
            .device(identity)
            .and_then(|d| d.class)
            .unwrap_or_else(|| DeviceClass::from_identity(identity));
        Self::build(config, identity, class)
    }

    fn build(config: &Config, identity: &str, class: DeviceClass) -> Self {
        let device = config.device(identity);
        let layers: Vec<&TranscodeSettings> = device
            .map(|d| &d.settings)
            .into_iter()
            .chain([config.profiles.for_class(class), &config.transcode])
            .collect();

        let video_bitrate = bitrate_or(
            first(&layers, |s| s.video_br.as_ref()),
            class.default_video_bitrate(),
        );
        let max_video_bitrate = bitrate_or(
            first(&layers, |s| s.max_video_br.as_ref()),
            class.default_max_video_bitrate(),
        );
        let buffer_size = bitrate_or(
            first(&layers, |s| s.bufsize.as_ref()),
            class.default_buffer_size(),
        );

        let max_audio_kbps = first(&layers, |s| s.max_audio_br.as_ref())
            .and_then(|v| parsed(v))
            .map(trunc64_kbps)
            .unwrap_or(448);
        let audio_bitrate_kbps =
            trunc64_kbps(bitrate_or(first(&layers, |s| s.audio_br.as_ref()), "448k"))
                .min(max_audio_kbps);

        let (default_width, default_height) = class.default_size();
        let width = first(&layers, |s| s.width).unwrap_or(default_width);
        let height = first(&layers, |s| s.height).unwrap_or(default_height);

        let letterbox_16x9 = identity.starts_with(LETTERBOX_PREFIX);
        let blacklist_16x9 =
            !identity.is_empty() && !class.is_high_definition() && !letterbox_16x9;
        let allow_16x9 = match first(&layers, |s| s.aspect169) {
            Some(flag) => flag,
            None if identity.is_empty() => true,
            None => !(blacklist_16x9 || letterbox_16x9),
        };

        let transport_stream_capable = device
            .and_then(|d| d.transport_stream)
            .unwrap_or_else(|| transport_stream_by_identity(identity));

        let audio_languages = first(&layers, |s| s.audio_lang.as_ref())
            .map(|langs| parse_languages(langs))
            .unwrap_or_default();

        Self {
            identity: identity.to_string(),
            class,
            video_bitrate,
            max_video_bitrate,
            buffer_size,
            audio_bitrate_kbps,
            max_audio_kbps,
            width,
            height,
            audio_languages,
            aspect: AspectPolicy {
                allow_16x9,
                letterbox_16x9,
                blacklist_16x9,
            },
            transport_stream_capable,
            optimized_resolution: first(&layers, |s| s.optres).unwrap_or(false),
            encoder_params: first(&layers, |s| s.ffmpeg_params.as_ref())
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
        }
    }
}

/// First value set in any layer, highest priority layer first.
fn first<'a, T>(
    layers: &[&'a TranscodeSettings],
    get: impl Fn(&'a TranscodeSettings) -> Option<T>,
) -> Option<T> {
    layers.iter().copied().find_map(get)
}

fn parsed(value: &str) -> Option<u64> {
    match parse_bitrate(value) {
        Ok(bits) => Some(bits),
        Err(e) => {
            tracing::warn!("{e}; falling back to the default");
            None
        }
    }
}

fn bitrate_or(value: Option<&String>, default: &str) -> u64 {
    value
        .and_then(|v| parsed(v))
        .or_else(|| parse_bitrate(default).ok())
        .unwrap_or(0)
}

fn transport_stream_by_identity(identity: &str) -> bool {
    matches!(identity.chars().next(), Some(c) if c >= '7') || identity.starts_with("663")
}

/// Split a language preference string into lower-cased tokens.
pub fn parse_languages(langs: &str) -> Vec<String> {
    langs
        .split(',')
        .map(|l| l.replace(' ', "").to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}
