use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "setbox")]
#[command(author, version, about = "Transcode decisions and resumable streaming for set-top boxes")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decide whether a file can be sent to a device untouched
    Decide {
        /// File to check
        #[arg(required = true)]
        file: PathBuf,

        /// Device identity (serial number)
        #[arg(short, long, default_value = "")]
        device: String,

        /// Requested MIME type
        #[arg(short, long, default_value = "video/x-tivo-mpeg")]
        mime: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the encoder command that would serve a file to a device
    Command {
        /// Source file
        #[arg(required = true)]
        file: PathBuf,

        /// Device identity (serial number)
        #[arg(short, long, default_value = "")]
        device: String,

        /// Requested MIME type
        #[arg(short, long, default_value = "video/x-tivo-mpeg")]
        mime: String,
    },

    /// Serve a file as a device would receive it, as a chunked body
    Stream {
        /// Source file
        #[arg(required = true)]
        file: PathBuf,

        /// Device identity (serial number)
        #[arg(short, long, default_value = "")]
        device: String,

        /// Requested MIME type
        #[arg(short, long, default_value = "video/x-tivo-mpeg")]
        mime: String,

        /// Byte offset to resume from
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Write the body here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
