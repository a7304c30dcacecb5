//! Request-level entry point.
//!
//! [`TranscodeService`] probes the source, resolves the device profile,
//! decides between pass-through and re-encoding and, when re-encoding, builds
//! the encoder command and streams its output through the [`Streamer`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use setbox_av::{ChildLauncher, ProcessLauncher, SourceProbe, ToolRegistry};
use setbox_core::config::Config;
use setbox_core::{DeviceProfile, Error, OutputFormat, Result, SourceDescriptor};
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::decision::{decide, negotiate_format, Decision, StreamAction};
use crate::encode::{build, encoder_args, map_args};
use crate::streaming::{EncodeRequest, StreamReport, Streamer};

/// Audio codecs whose bitrate is worth measuring when the probe left it out.
const MEASURABLE_AUDIO: &[&str] = &["ac3", "liba52", "mp2"];

/// One client request for a file.
#[derive(Debug, Clone)]
pub struct ServeRequest {
    pub path: PathBuf,
    /// Identity (serial number) of the requesting device.
    pub identity: String,
    /// Requested MIME type; selects program or transport stream.
    pub mime: String,
    /// Byte offset to resume from.
    pub offset: u64,
    /// Bytes placed at offset 0 of an encoded stream.
    pub preamble: Option<Bytes>,
}

impl ServeRequest {
    pub fn new(path: impl Into<PathBuf>, identity: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            identity: identity.into(),
            mime: mime.into(),
            offset: 0,
            preamble: None,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<Bytes>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }
}

/// Everything known about serving a file to a device, before any encoding.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub descriptor: SourceDescriptor,
    pub profile: DeviceProfile,
    /// Format actually served after negotiation.
    pub format: OutputFormat,
    pub decision: Decision,
}

impl Plan {
    /// Encoder arguments after the input, as used when streaming.
    pub fn encoder_settings(&self) -> Vec<String> {
        build(&self.descriptor, &self.profile, self.format)
    }
}

/// How a request was served.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServeOutcome {
    /// Nothing was written; the caller sends the file itself.
    PassThrough {
        decision: Decision,
        format: OutputFormat,
    },
    /// Encoder output was written to the sink.
    Encoded {
        decision: Decision,
        format: OutputFormat,
        report: StreamReport,
    },
}

impl ServeOutcome {
    pub fn decision(&self) -> &Decision {
        match self {
            ServeOutcome::PassThrough { decision, .. } | ServeOutcome::Encoded { decision, .. } => {
                decision
            }
        }
    }
}

/// Probe, decide and stream.
#[derive(Debug)]
pub struct TranscodeService {
    config: Arc<Config>,
    tools: ToolRegistry,
    probe: SourceProbe,
    streamer: Streamer,
}

impl TranscodeService {
    /// Build a service that discovers its tools and runs real encoder
    /// processes.
    pub fn new(config: Config) -> Self {
        let tools = ToolRegistry::discover(&config.tools);
        Self::with_parts(config, tools, Arc::new(ChildLauncher))
    }

    /// Build a service from explicit tools and a process launcher.
    pub fn with_parts(
        config: Config,
        tools: ToolRegistry,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let probe = SourceProbe::new(&tools, &config.tools);
        let streamer = Streamer::from_config(launcher, &config.streaming);
        Self {
            config: Arc::new(config),
            tools,
            probe,
            streamer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn probe(&self) -> &SourceProbe {
        &self.probe
    }

    pub fn streamer(&self) -> &Streamer {
        &self.streamer
    }

    /// Probe `path` and decide how it would be served to `identity`.
    ///
    /// Never launches the encoder.
    pub async fn plan(&self, path: &Path, identity: &str, mime: &str) -> Result<Plan> {
        let profile = DeviceProfile::resolve(&self.config, identity);
        let format = negotiate_format(OutputFormat::from_mime(mime), &profile);
        let descriptor = self.probe.probe(path).await?;
        let decision = decide(&descriptor, &profile, format);
        Ok(Plan {
            descriptor,
            profile,
            format,
            decision,
        })
    }

    /// Serve one request: either report pass-through without writing, or
    /// write the (resumable) encoded stream to `sink` as chunk frames.
    ///
    /// The terminating empty chunk is left to the caller.
    pub async fn decide_and_maybe_stream<W>(
        &self,
        request: &ServeRequest,
        sink: &mut W,
    ) -> Result<ServeOutcome>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut plan = self
            .plan(&request.path, &request.identity, &request.mime)
            .await?;

        let Some(encoder) = self.tools.encoder() else {
            return self.serve_without_encoder(request, plan);
        };

        if plan.decision.is_pass_through() {
            debug!(path = %request.path.display(), "serving file as is");
            return Ok(ServeOutcome::PassThrough {
                decision: plan.decision,
                format: plan.format,
            });
        }

        // Only a request that will launch the encoder needs exact audio
        // figures; resumed and shared sessions already run with theirs.
        if request.offset == 0 && self.streamer.registry().get(&request.path).is_none() {
            self.measure_audio(&request.path, &mut plan).await;
        }

        let args = encoder_args(&request.path, plan.encoder_settings());
        info!(
            path = %request.path.display(),
            identity = %request.identity,
            format = %plan.format,
            offset = request.offset,
            reason = %plan.decision.reason,
            "Transcoding"
        );
        debug!(args = %args.join(" "), "encoder arguments");

        let encode = EncodeRequest {
            path: request.path.clone(),
            program: encoder.path.clone(),
            args,
            preamble: request.preamble.clone(),
        };
        let report = self.streamer.stream(&encode, request.offset, sink).await?;

        Ok(ServeOutcome::Encoded {
            decision: plan.decision,
            format: plan.format,
            report,
        })
    }

    /// Stop every running encoder.
    pub async fn shutdown(&self) {
        self.streamer.registry().shutdown_all().await;
    }

    fn serve_without_encoder(&self, request: &ServeRequest, plan: Plan) -> Result<ServeOutcome> {
        if plan.descriptor.supported && plan.format == OutputFormat::ProgramStream {
            debug!(
                path = %request.path.display(),
                "no encoder available, serving file as is"
            );
            let decision = Decision {
                video: StreamAction::PassThrough,
                audio: StreamAction::PassThrough,
                container: StreamAction::PassThrough,
                reason: "no encoder available".to_string(),
                notes: plan.decision.notes,
            };
            return Ok(ServeOutcome::PassThrough {
                decision,
                format: plan.format,
            });
        }
        Err(Error::EncoderUnavailable(format!(
            "cannot transcode {}: no encoder available",
            request.path.display()
        )))
    }

    /// Fill in an audio bitrate the probe could not report by sampling the
    /// file. Best effort: failures leave the descriptor as it was.
    async fn measure_audio(&self, path: &Path, plan: &mut Plan) {
        let desc = &plan.descriptor;
        if !MEASURABLE_AUDIO.contains(&desc.audio_codec.as_str()) || desc.audio_kbps.is_some() {
            return;
        }

        let map = map_args(desc, &plan.profile);
        match self.probe.audio_check(path, &map).await {
            Ok(Some(sample)) => {
                debug!(
                    path = %path.display(),
                    audio_kbps = ?sample.audio_kbps,
                    audio_channels = ?sample.audio_channels,
                    "measured audio"
                );
                plan.descriptor.audio_kbps = sample.audio_kbps;
                plan.descriptor.audio_channels = sample.audio_channels;
            }
            Ok(None) => {}
            Err(e) => debug!(path = %path.display(), error = %e, "audio check skipped"),
        }
    }
}
