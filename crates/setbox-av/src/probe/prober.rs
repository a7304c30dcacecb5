//! The source probe: runs the prober, parses its report, applies sidecar
//! overrides and caches the result per file modification time.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use setbox_core::config::ToolsConfig;
use setbox_core::{Error, Result, SourceDescriptor};

use super::cache::DescriptorCache;
use super::report::parse_report;
use super::sidecar::{apply_overrides, read_sidecars};
use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Extensions assumed to be playable when no prober is available.
const NATIVE_EXTENSIONS: &[&str] = &["mpg", "mpeg", "vob", "tivo", "ts"];

/// Resolution assumed when no prober is available.
const FALLBACK_SIZE: (u32, u32) = (704, 480);

/// Probes source files and caches their descriptors.
#[derive(Debug)]
pub struct SourceProbe {
    prober: Option<PathBuf>,
    encoder: Option<PathBuf>,
    wait: Option<Duration>,
    cache: DescriptorCache,
}

impl SourceProbe {
    pub fn new(tools: &ToolRegistry, config: &ToolsConfig) -> Self {
        Self::with_tools(
            tools.prober().map(|t| t.path.clone()),
            tools.encoder().map(|t| t.path.clone()),
            config.probe_wait(),
            config.probe_cache_size,
        )
    }

    pub fn with_tools(
        prober: Option<PathBuf>,
        encoder: Option<PathBuf>,
        wait: Option<Duration>,
        cache_size: usize,
    ) -> Self {
        Self {
            prober,
            encoder,
            wait,
            cache: DescriptorCache::new(cache_size),
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    /// Describe `path`, from the cache when its mtime is unchanged.
    ///
    /// Only fails when the file itself cannot be stat'ed. Prober failures
    /// produce (and cache) an unsupported descriptor.
    pub async fn probe(&self, path: &Path) -> Result<SourceDescriptor> {
        let mtime = modified(path).await?;
        if let Some(desc) = self.cache.get(path, mtime) {
            tracing::trace!(path = %path.display(), "probe cache hit");
            return Ok(desc);
        }

        let desc = self.probe_uncached(path).await;
        tracing::debug!(
            path = %path.display(),
            supported = desc.supported,
            container = %desc.container,
            video_codec = %desc.video_codec,
            audio_codec = %desc.audio_codec,
            "probed source"
        );
        self.cache.insert(path.to_path_buf(), mtime, desc.clone());
        Ok(desc)
    }

    async fn probe_uncached(&self, path: &Path) -> SourceDescriptor {
        let Some(prober) = self.prober.as_deref() else {
            return fallback_descriptor(path);
        };

        let mut desc = match self.run_prober(prober, path).await {
            Ok(desc) => desc,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "probe failed, marking unsupported");
                return SourceDescriptor::unsupported();
            }
        };

        let owned = path.to_path_buf();
        let values = tokio::task::spawn_blocking(move || read_sidecars(&owned))
            .await
            .unwrap_or_default();
        if apply_overrides(&mut desc, &values) {
            tracing::debug!(path = %path.display(), "applied sidecar overrides");
        }
        desc
    }

    async fn run_prober(&self, prober: &Path, path: &Path) -> Result<SourceDescriptor> {
        // The prober exits non-zero without an output file; the report is
        // still complete.
        let output = ToolCommand::new(prober.to_path_buf())
            .arg("-i")
            .arg(path.to_string_lossy())
            .maybe_timeout(self.wait)
            .allow_failure()
            .execute()
            .await
            .map_err(|e| Error::ProbeUnavailable(e.to_string()))?;
        Ok(parse_report(&output.stderr))
    }

    /// Measure the audio of `path` by re-encoding one second with the audio
    /// stream copied and probing that sample. Never cached.
    ///
    /// `map_args` selects the streams (`-map` pairs). Returns `None` when no
    /// usable sample could be produced.
    pub async fn audio_check(
        &self,
        path: &Path,
        map_args: &[String],
    ) -> Result<Option<SourceDescriptor>> {
        let encoder = self
            .encoder
            .as_deref()
            .ok_or_else(|| Error::EncoderUnavailable("no encoder for the audio check".into()))?;
        let Some(prober) = self.prober.as_deref() else {
            return Ok(None);
        };

        let sample = tempfile::Builder::new()
            .prefix("setbox-audio-")
            .suffix(".vob")
            .tempfile()?;

        let result = ToolCommand::new(encoder.to_path_buf())
            .arg("-i")
            .arg(path.to_string_lossy())
            .args([
                "-y", "-c:v", "mpeg2video", "-r", "29.97", "-b:v", "1000k", "-c:a", "copy",
            ])
            .args(map_args.iter().cloned())
            .args(["-t", "00:00:01", "-f", "vob"])
            .arg(sample.path().to_string_lossy())
            .maybe_timeout(self.wait)
            .execute()
            .await;
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "audio check encode failed");
            return Ok(None);
        }

        match self.run_prober(prober, sample.path()).await {
            Ok(desc) => Ok(Some(desc)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "audio check probe failed");
                Ok(None)
            }
        }
    }
}

async fn modified(path: &Path) -> Result<SystemTime> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found("file", path.display())
        } else {
            Error::from(e)
        }
    })?;
    Ok(meta.modified()?)
}

fn fallback_descriptor(path: &Path) -> SourceDescriptor {
    let native = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| NATIVE_EXTENSIONS.contains(&e.as_str()));
    SourceDescriptor {
        supported: native,
        video_width: FALLBACK_SIZE.0,
        video_height: FALLBACK_SIZE.1,
        ..SourceDescriptor::default()
    }
}
