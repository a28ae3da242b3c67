use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "audioforge")]
#[command(author, version, about = "Convert uploaded or remote media into audio files")]
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
    /// Start the HTTP server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Convert a local media file and print the outcome as JSON
    Convert {
        /// Media file to convert; it is copied into the staging directory first
        #[arg(required = true)]
        input: PathBuf,

        /// Output format (mp3, wav, aac, ogg); anything else means mp3
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Pull a remote URL, convert it and print the outcome as JSON
    Fetch {
        /// Media page or stream URL
        #[arg(required = true)]
        url: String,

        /// Output format (mp3, wav, aac, ogg); anything else means mp3
        #[arg(short, long)]
        format: Option<String>,
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
