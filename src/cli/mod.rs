use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "metascribe",
    about = "Metascribe - Transcribe video from Facebook Ads, Instagram, YouTube, and Google Ads",
    version,
    long_about = "Takes a playable video URL resolved from a social/ad platform, extracts the audio \
track, and transcribes it through a speech-to-text provider. Long media is split into bounded \
segments and transcribed with automatic API key rotation."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe the audio track of a playable video URL
    Transcribe {
        /// Playable video URL (progressive file or live playlist)
        #[arg(value_name = "URL")]
        url: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Language code for transcription (provider auto-detects if not specified)
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,

        /// Vocabulary hint to bias recognition (brand names, jargon, etc.)
        #[arg(short, long, value_name = "TEXT")]
        prompt: Option<String>,
    },

    /// Manage the transcription API key pool
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Show or edit provider and media settings
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List platforms whose resolved video URLs are accepted
    Platforms,
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Register a provider API key
    Add {
        /// The raw API key value
        #[arg(value_name = "KEY")]
        key: String,
    },

    /// Remove a key by its position in `keys list`
    Remove {
        /// Zero-based key index
        #[arg(value_name = "INDEX")]
        index: usize,
    },

    /// Show the registered keys (masked)
    List,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON with language and timestamp metadata
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
