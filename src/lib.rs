//! Metascribe - transcribes playable video from social/ad platforms
//!
//! This library takes a resolved video URL (Facebook Ads Library, Instagram,
//! YouTube, Google Ads Transparency), extracts the audio track, and transcribes
//! it through a rate-limited speech-to-text provider arbitrated by a pool of
//! API keys with rotation and retry.

pub mod cli;
pub mod config;
pub mod keypool;
pub mod media;
pub mod output;
pub mod source;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use keypool::{Credential, KeyPool, KeyStatus, PoolStatus};
pub use source::{Platform, ResolvedVideo};
pub use transcribe::{TranscriptionOrchestrator, TranscriptionOutcome};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the transcription pipeline
#[derive(thiserror::Error, Debug)]
pub enum MetascribeError {
    #[error("API key must not be empty")]
    InvalidKey,

    #[error("API key is already registered")]
    DuplicateKey,

    #[error("no key at index {0}")]
    IndexOutOfRange(usize),

    #[error("key at index {0} is currently in use and cannot be removed")]
    KeyInUse(usize),

    #[error("no API key available: the pool is empty or every key is in use")]
    NoKeyAvailable,

    #[error("downloaded file is only {bytes} bytes; the video URL likely returned an error page")]
    DownloadTooSmall { bytes: u64 },

    #[error("the source media has no audio track")]
    NoAudioTrack,

    #[error("transcription provider rejected the request: {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },

    #[error("transcription failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}
