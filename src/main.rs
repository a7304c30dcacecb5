mod cli;

use setbox::config;
use setbox::decision::StreamAction;
use setbox::encode::encoder_args;
use setbox::streaming::{chunked, StreamEnd};
use setbox::{ServeOutcome, ServeRequest, TranscodeService};
use setbox_av::tools::ENCODER;
use setbox_av::ToolRegistry;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::signal;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "setbox=trace,setbox_av=trace,setbox_core=debug".to_string()
        } else {
            "setbox=info,setbox_av=info,setbox_core=info".to_string()
        }
    });

    // Logs go to stderr; stdout may carry the stream body.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Probe { file, json } => block_on(probe_file(&file, json, config_path)),
        Commands::Decide {
            file,
            device,
            mime,
            json,
        } => block_on(decide(&file, &device, &mime, json, config_path)),
        Commands::Command { file, device, mime } => {
            block_on(print_command(&file, &device, &mime, config_path))
        }
        Commands::Stream {
            file,
            device,
            mime,
            offset,
            output,
        } => {
            let request = ServeRequest::new(file, device, mime).with_offset(offset);
            block_on(stream_file(request, output.as_deref(), config_path))
        }
        Commands::CheckTools => check_tools(config_path),
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("setbox {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(future)
}

fn load_service(config_path: Option<&Path>) -> Result<TranscodeService> {
    let config = config::load_config_or_default(config_path)?;
    Ok(TranscodeService::new(config))
}

fn action_label(action: StreamAction) -> &'static str {
    match action {
        StreamAction::PassThrough => "pass-through",
        StreamAction::Reencode => "re-encode",
    }
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    let service = load_service(config_path)?;
    let desc = service.probe().probe(file).await?;

    if json {
        let json_str = serde_json::to_string_pretty(&desc)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Supported: {}", desc.supported);
    println!("Container: {}", desc.container);
    let secs = desc.duration_millis / 1000;
    println!(
        "Duration: {:02}:{:02}:{:02}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    if let Some(kbps) = desc.video_kbps {
        println!("Bitrate: {} kb/s", kbps);
    }

    print!(
        "\nVideo: {} {}x{}",
        desc.video_codec, desc.video_width, desc.video_height
    );
    if !desc.frame_rate.is_empty() {
        print!(", {} fps", desc.frame_rate);
    }
    if let Some(par) = desc.pixel_aspect_ratio {
        print!(", PAR {}", par.label());
    }
    if let Some(ref dar) = desc.display_aspect_ratio {
        print!(", DAR {}", dar);
    }
    println!();

    if desc.has_audio() {
        print!("Audio: {}", desc.audio_codec);
        if !desc.audio_sample_rate.is_empty() {
            print!(" {} Hz", desc.audio_sample_rate);
        }
        if let Some(ch) = desc.audio_channels {
            print!(" {}ch", ch);
        }
        if let Some(kbps) = desc.audio_kbps {
            print!(" {} kb/s", kbps);
        }
        println!();
    } else {
        println!("Audio: none");
    }

    println!("\nAudio Tracks: {}", desc.audio_streams.len());
    for stream in &desc.audio_streams {
        println!("  [{}] {}", stream.id, stream.description);
    }

    if !desc.raw_metadata.is_empty() {
        println!("\nMetadata:");
        for (key, value) in &desc.raw_metadata {
            println!("  {}: {}", key, value);
        }
    }

    Ok(())
}

async fn decide(
    file: &Path,
    device: &str,
    mime: &str,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let service = load_service(config_path)?;
    let plan = service.plan(file, device, mime).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let identity = if device.is_empty() { "(any)" } else { device };
    println!("File: {}", file.display());
    println!("Device: {} ({})", identity, plan.profile.class);
    println!("Format: {}", plan.format);
    println!("  Video: {}", action_label(plan.decision.video));
    println!("  Audio: {}", action_label(plan.decision.audio));
    println!("  Container: {}", action_label(plan.decision.container));
    println!("Decision: {}", plan.decision);
    for note in &plan.decision.notes {
        println!("  note: {}", note);
    }

    Ok(())
}

async fn print_command(
    file: &Path,
    device: &str,
    mime: &str,
    config_path: Option<&Path>,
) -> Result<()> {
    let service = load_service(config_path)?;
    let plan = service.plan(file, device, mime).await?;

    if plan.decision.is_pass_through() {
        println!("# no encoding needed: {}", plan.decision.reason);
        return Ok(());
    }

    let program = service
        .tools()
        .encoder()
        .map(|tool| tool.path.display().to_string())
        .unwrap_or_else(|| ENCODER.to_string());
    let args = encoder_args(file, plan.encoder_settings());
    println!("{} {}", program, args.join(" "));

    Ok(())
}

async fn stream_file(
    request: ServeRequest,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let service = load_service(config_path)?;

    let mut sink: Box<dyn AsyncWrite + Unpin + Send> = match output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create output file: {:?}", path))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let outcome = tokio::select! {
        result = service.decide_and_maybe_stream(&request, &mut sink) => result?,
        _ = shutdown_signal() => {
            tracing::info!("Interrupted, stopping encoder");
            service.shutdown().await;
            return Ok(());
        }
    };

    match outcome {
        ServeOutcome::PassThrough { decision, .. } => {
            tracing::info!(reason = %decision.reason, "Sending file as is");
            let mut file = tokio::fs::File::open(&request.path)
                .await
                .with_context(|| format!("Failed to open {:?}", request.path))?;
            let copied = tokio::io::copy(&mut file, &mut sink).await?;
            sink.flush().await?;
            eprintln!("pass-through: {} bytes", copied);
        }
        ServeOutcome::Encoded { report, .. } => {
            if report.end == StreamEnd::Completed {
                chunked::write_terminator(&mut sink).await?;
            }
            eprintln!(
                "encoded: {} bytes from offset {} ({:?})",
                report.bytes_written, report.offset, report.end
            );
        }
    }

    service.shutdown().await;
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Without an encoder only native program streams can be served.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!(
        "  Streaming: {} byte blocks, {} retained, {}s idle timeout",
        config.streaming.effective_block_size(),
        config.streaming.max_blocks,
        config.streaming.idle_timeout_secs
    );
    println!("  Devices: {}", config.devices.len());

    let warnings = config.validate();
    for warning in &warnings {
        println!("  warning: {}", warning);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
