//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML by the binary and
//! carries the tool locations, streaming limits and the layered transcode
//! settings that device profiles are resolved from. Every section defaults
//! sensibly so an empty file is valid.
//!
//! Transcode settings are looked up device first, then device class, then the
//! global `[transcode]` table, then the built-in class default.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bitrate::parse_bitrate;
use crate::profile::DeviceClass;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub streaming: StreamingConfig,
    /// Global transcode defaults, applied to every device.
    pub transcode: TranscodeSettings,
    /// Per-class overrides.
    pub profiles: ClassProfiles,
    /// Per-device overrides, matched by identity.
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Find the per-device section for an identity.
    pub fn device(&self, identity: &str) -> Option<&DeviceConfig> {
        if identity.is_empty() {
            return None;
        }
        self.devices.iter().find(|d| d.identity == identity)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.streaming.block_size == 0 {
            warnings.push("streaming.block_size is 0; the default will be used".into());
        }
        if self.streaming.max_blocks == 0 {
            warnings.push("streaming.max_blocks is 0; one block will be retained".into());
        }
        if self.streaming.idle_timeout_secs == 0 {
            warnings.push(
                "streaming.idle_timeout_secs is 0; encoder sessions are reaped immediately"
                    .into(),
            );
        }

        self.transcode.collect_warnings("transcode", &mut warnings);
        self.profiles.sd.collect_warnings("profiles.sd", &mut warnings);
        self.profiles.hd.collect_warnings("profiles.hd", &mut warnings);
        self.profiles.uhd.collect_warnings("profiles.uhd", &mut warnings);

        let mut seen = HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            if device.identity.is_empty() {
                warnings.push(format!("devices[{i}].identity is empty"));
            } else if !seen.insert(device.identity.as_str()) {
                warnings.push(format!(
                    "devices[{i}].identity '{}' is listed more than once; only the first entry is used",
                    device.identity
                ));
            }
            device
                .settings
                .collect_warnings(&format!("devices[{i}]"), &mut warnings);
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Locations of the external prober and encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Encoder binary. Discovered on `PATH` when unset.
    pub ffmpeg_path: Option<PathBuf>,
    /// Prober binary. Defaults to the encoder, which prints the same report.
    pub prober_path: Option<PathBuf>,
    /// Seconds to wait for the prober before giving up; 0 waits forever.
    pub probe_wait_secs: u64,
    /// Number of descriptors kept in the probe cache.
    pub probe_cache_size: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            prober_path: None,
            probe_wait_secs: 0,
            probe_cache_size: 1000,
        }
    }
}

impl ToolsConfig {
    /// Prober wait limit, `None` meaning unbounded.
    pub fn probe_wait(&self) -> Option<Duration> {
        (self.probe_wait_secs > 0).then(|| Duration::from_secs(self.probe_wait_secs))
    }
}

/// Limits of the resumable streamer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Bytes read from the encoder per block.
    pub block_size: usize,
    /// Blocks retained for resumption; at least one is always kept.
    pub max_blocks: usize,
    /// Seconds without activity before an encoder session is reaped.
    pub idle_timeout_secs: u64,
}

pub const DEFAULT_BLOCK_SIZE: usize = 512 * 1024;
pub const DEFAULT_MAX_BLOCKS: usize = 2;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_blocks: DEFAULT_MAX_BLOCKS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl StreamingConfig {
    /// Block size, falling back to the default when misconfigured.
    pub fn effective_block_size(&self) -> usize {
        if self.block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            self.block_size
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// One layer of transcode settings. Unset fields fall through to the next
/// layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    /// Target video bitrate when re-encoding (e.g. `4096K`).
    pub video_br: Option<String>,
    /// Maximum video bitrate the device accepts.
    pub max_video_br: Option<String>,
    /// Encoder rate-control buffer size.
    pub bufsize: Option<String>,
    /// Target audio bitrate when re-encoding.
    pub audio_br: Option<String>,
    /// Maximum audio bitrate the device accepts.
    pub max_audio_br: Option<String>,
    /// Output width ceiling.
    pub width: Option<u32>,
    /// Output height ceiling.
    pub height: Option<u32>,
    /// Whether 16:9 output may be sent to the device.
    pub aspect169: Option<bool>,
    /// Shrink output to the nearest optimized resolution below the source.
    pub optres: Option<bool>,
    /// Comma separated audio language preference, highest priority first.
    pub audio_lang: Option<String>,
    /// Extra encoder arguments, whitespace separated.
    pub ffmpeg_params: Option<String>,
}

impl TranscodeSettings {
    fn collect_warnings(&self, section: &str, warnings: &mut Vec<String>) {
        let rates = [
            ("video_br", &self.video_br),
            ("max_video_br", &self.max_video_br),
            ("bufsize", &self.bufsize),
            ("audio_br", &self.audio_br),
            ("max_audio_br", &self.max_audio_br),
        ];
        for (key, value) in rates {
            if let Some(value) = value {
                if parse_bitrate(value).is_err() {
                    warnings.push(format!(
                        "{section}.{key} '{value}' is not a valid bitrate; the default will be used"
                    ));
                }
            }
        }
        if self.width == Some(0) || self.height == Some(0) {
            warnings.push(format!("{section} output width/height must be non-zero"));
        }
    }
}

/// Per-class override tables (`[profiles.sd]`, `[profiles.hd]`, `[profiles.uhd]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassProfiles {
    pub sd: TranscodeSettings,
    pub hd: TranscodeSettings,
    pub uhd: TranscodeSettings,
}

impl ClassProfiles {
    pub fn for_class(&self, class: DeviceClass) -> &TranscodeSettings {
        match class {
            DeviceClass::StandardDefinition => &self.sd,
            DeviceClass::HighDefinition => &self.hd,
            DeviceClass::UltraHighDefinition => &self.uhd,
        }
    }
}

/// A `[[devices]]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Identity string the device presents (serial number).
    pub identity: String,
    /// Friendly name for logs.
    pub name: Option<String>,
    /// Forces the device class instead of deriving it from the identity.
    pub class: Option<DeviceClass>,
    /// Forces transport stream capability.
    pub transport_stream: Option<bool>,
    #[serde(flatten)]
    pub settings: TranscodeSettings,
}
