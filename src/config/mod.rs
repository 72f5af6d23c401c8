use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Speech-to-text provider settings
    pub provider: ProviderConfig,

    /// Media download and extraction settings
    pub media: MediaConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the transcription API
    pub api_base: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Upload size ceiling in bytes; audio above this is chunked.
    /// Kept below the provider's stated 25MB limit to leave framing margin.
    pub max_upload_bytes: u64,

    /// Per-request timeout in seconds (uploads of near-ceiling files are slow)
    pub request_timeout_secs: u64,

    /// Attempt ceiling for the per-segment retry loop
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Output sample rate for extracted audio
    pub sample_rate: u32,

    /// Audio bitrate for media at or under the long-media threshold
    pub standard_bitrate: String,

    /// Audio bitrate for media over the long-media threshold
    pub reduced_bitrate: String,

    /// Audio bitrate for re-encoded chunks of oversized files
    pub chunk_bitrate: String,

    /// Media longer than this (seconds) is extracted at the reduced bitrate
    pub long_media_threshold_secs: f64,

    /// Fixed window length (seconds) when splitting oversized audio
    pub chunk_window_secs: f64,

    /// Wall-clock cap (seconds) for live-playlist capture
    pub live_capture_cap_secs: u64,

    /// Timeout (seconds) for progressive media downloads
    pub download_timeout_secs: u64,

    /// Downloads smaller than this (bytes) are treated as CDN error pages
    pub min_download_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for per-job temporary files
    pub temp_dir: Option<PathBuf>,

    /// Default output format
    pub default_output_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                api_base: "https://api.openai.com/v1".to_string(),
                model: "whisper-1".to_string(),
                max_upload_bytes: 24 * 1024 * 1024,
                request_timeout_secs: 300,
                max_attempts: 3,
            },
            media: MediaConfig {
                sample_rate: 16000,
                standard_bitrate: "128k".to_string(),
                reduced_bitrate: "64k".to_string(),
                chunk_bitrate: "48k".to_string(),
                long_media_threshold_secs: 600.0,
                chunk_window_secs: 600.0,
                live_capture_cap_secs: 600,
                download_timeout_secs: 180,
                min_download_bytes: 1000,
            },
            app: AppConfig {
                temp_dir: None,
                default_output_format: "text".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("metascribe").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        Url::parse(&self.provider.api_base)
            .context("provider.api_base must be a valid URL")?;

        if self.provider.max_upload_bytes == 0 {
            anyhow::bail!("provider.max_upload_bytes must be positive");
        }

        if self.provider.max_attempts == 0 {
            anyhow::bail!("provider.max_attempts must be at least 1");
        }

        if self.media.chunk_window_secs <= 0.0 {
            anyhow::bail!("media.chunk_window_secs must be positive");
        }

        Ok(())
    }

    /// Where the active config file lives, for display
    pub fn path_hint() -> Result<String> {
        Ok(Self::config_path()?.display().to_string())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Provider API: {}", self.provider.api_base);
        println!("  Model: {}", self.provider.model);
        println!(
            "  Upload ceiling: {}",
            crate::utils::format_file_size(self.provider.max_upload_bytes)
        );
        println!("  Retry attempts: {}", self.provider.max_attempts);
        println!("  Chunk window: {}s", self.media.chunk_window_secs);
        println!("  Default format: {}", self.app.default_output_format);
    }

    /// Root directory for per-job temporary artifacts
    pub fn temp_root(&self) -> PathBuf {
        self.app
            .temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("metascribe"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_upload_ceiling_leaves_margin_below_provider_limit() {
        let config = Config::default();
        assert!(config.provider.max_upload_bytes < 25 * 1024 * 1024);
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.provider.model, config.provider.model);
        assert_eq!(parsed.provider.max_upload_bytes, config.provider.max_upload_bytes);
        assert_eq!(parsed.media.chunk_window_secs, config.media.chunk_window_secs);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.provider.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
