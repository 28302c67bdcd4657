use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(author, version, about = "Real-time media conversion orchestrator")]
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
    /// Classify a file by name and show its default output format
    Classify {
        /// File name to classify
        file_name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve the conversion variant and encoder parameters for a request
    Plan {
        /// Source file name
        file_name: String,

        /// Output format extension (defaults by media kind)
        #[arg(short, long)]
        format: Option<String>,

        /// Quality tier: high, medium, low
        #[arg(short, long, default_value = "medium")]
        quality: String,

        /// Source size in bytes, for the load timeout
        #[arg(long, default_value = "0")]
        size: u64,

        /// MIME types the encoder supports (all when omitted)
        #[arg(long)]
        supports: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a full conversion against a synthetic media source
    Simulate {
        /// Source file name
        file_name: String,

        /// Output format extension (defaults by media kind)
        #[arg(short, long)]
        format: Option<String>,

        /// Quality tier: high, medium, low
        #[arg(short, long, default_value = "medium")]
        quality: String,

        /// Source length in seconds
        #[arg(long, default_value = "5")]
        duration: f64,

        /// Simulate a source without an audio track
        #[arg(long)]
        no_audio: bool,

        /// Source size in bytes
        #[arg(long, default_value = "1048576")]
        size: usize,

        /// MIME types the encoder supports (all when omitted)
        #[arg(long)]
        supports: Vec<String>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
