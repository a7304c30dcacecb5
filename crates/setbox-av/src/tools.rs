//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the encoder and
//! the prober. The prober defaults to the encoder binary itself: `ffmpeg -i`
//! prints the stream report the probe parses.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use setbox_core::config::ToolsConfig;

/// Name the encoder is looked up under in `PATH`.
pub const ENCODER: &str = "ffmpeg";
/// Registry key of the prober.
pub const PROBER: &str = "prober";

/// A discovered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Registry key (`ffmpeg` or `prober`).
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding the discovered encoder and prober.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    encoder: Option<ToolConfig>,
    prober: Option<ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// A configured path is used when it exists; otherwise [`which::which`]
    /// looks for `ffmpeg`. A configured prober that does not exist falls back
    /// to the encoder.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let encoder_path = match tools_config.ffmpeg_path.as_deref() {
            Some(p) if p.exists() => Some(p.to_path_buf()),
            Some(p) => {
                tracing::warn!(path = %p.display(), "configured encoder not found, searching PATH");
                which::which(ENCODER).ok()
            }
            None => which::which(ENCODER).ok(),
        };

        let prober_path = match tools_config.prober_path.as_deref() {
            Some(p) if p.exists() => Some(p.to_path_buf()),
            Some(p) => {
                tracing::warn!(path = %p.display(), "configured prober not found, using the encoder");
                encoder_path.clone()
            }
            None => encoder_path.clone(),
        };

        Self::with_paths(encoder_path, prober_path)
    }

    /// Build a registry from already-resolved paths.
    pub fn with_paths(encoder: Option<PathBuf>, prober: Option<PathBuf>) -> Self {
        Self {
            encoder: encoder.map(|path| ToolConfig {
                name: ENCODER.to_string(),
                path,
            }),
            prober: prober.map(|path| ToolConfig {
                name: PROBER.to_string(),
                path,
            }),
        }
    }

    /// The encoder, if one was found.
    pub fn encoder(&self) -> Option<&ToolConfig> {
        self.encoder.as_ref()
    }

    /// The prober, if one was found.
    pub fn prober(&self) -> Option<&ToolConfig> {
        self.prober.as_ref()
    }

    /// Return the encoder or [`setbox_core::Error::EncoderUnavailable`].
    pub fn require_encoder(&self) -> setbox_core::Result<&ToolConfig> {
        self.encoder.as_ref().ok_or_else(|| {
            setbox_core::Error::EncoderUnavailable(format!(
                "{ENCODER} not found; is it installed and in PATH?"
            ))
        })
    }

    /// Check both tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        [(ENCODER, &self.encoder), (PROBER, &self.prober)]
            .into_iter()
            .map(|(name, tool)| match tool {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .stdin(std::process::Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_with_default_config() {
        let cfg = ToolsConfig::default();
        let registry = ToolRegistry::discover(&cfg);
        // We cannot guarantee ffmpeg is installed in CI,
        // but the call itself must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn empty_registry_has_no_encoder() {
        let registry = ToolRegistry::default();
        assert!(registry.encoder().is_none());
        assert!(registry.prober().is_none());
        let err = registry.require_encoder().unwrap_err();
        assert!(matches!(err, setbox_core::Error::EncoderUnavailable(_)));
    }

    #[test]
    fn check_all_lists_both_tools() {
        let registry = ToolRegistry::default();
        let infos = registry.check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec![ENCODER, PROBER]);
        assert!(infos.iter().all(|i| !i.available));
    }

    #[test]
    fn missing_configured_prober_falls_back_to_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = dir.path().join("ffmpeg");
        std::fs::write(&encoder, b"").unwrap();

        let cfg = ToolsConfig {
            ffmpeg_path: Some(encoder.clone()),
            prober_path: Some(dir.path().join("missing-prober")),
            ..ToolsConfig::default()
        };
        let registry = ToolRegistry::discover(&cfg);
        assert_eq!(registry.encoder().unwrap().path, encoder);
        assert_eq!(registry.prober().unwrap().path, encoder);
    }

    #[test]
    fn tool_config_serialization() {
        let cfg = ToolConfig {
            name: "ffmpeg".to_string(),
            path: PathBuf::from("/usr/bin/ffmpeg"),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("ffmpeg"));
        let back: ToolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
