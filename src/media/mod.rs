use anyhow::{Context, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{ORIGIN, REFERER};
use reqwest::Client;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub mod chunk;
pub mod ffmpeg;

pub use chunk::{plan_chunks, plan_windows, AudioSegment, ChunkPlan, Chunker};
pub use ffmpeg::{ExtractRequest, FfmpegTool, MediaProbe};

use crate::config::MediaConfig;
use crate::source::Platform;
use crate::MetascribeError;

/// Browser identity presented to media CDNs; several reject the default
/// HTTP-library identity outright.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Turns a playable video URL into a local mono 16kHz audio file.
///
/// Progressive URLs are downloaded in full and then demuxed; live playlists
/// are demuxed in place under a hard wall-clock cap since their total
/// duration is unknowable up front.
pub struct MediaFetcher {
    client: Client,
    tool: FfmpegTool,
    media: MediaConfig,
}

impl MediaFetcher {
    pub fn new(media: MediaConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(media.download_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            tool: FfmpegTool::new(),
            media,
        })
    }

    pub fn tool(&self) -> &FfmpegTool {
        &self.tool
    }

    /// Live playlists carry segment manifests rather than one media file
    pub fn is_live_playlist(url: &str) -> bool {
        url.contains(".m3u8") || url.contains("manifest")
    }

    /// Fetch `url` and produce the job's audio track under `job_dir`
    pub async fn fetch(&self, url: &str, job_dir: &Path) -> Result<PathBuf> {
        let audio_path = job_dir.join("audio.mp3");
        let platform = Platform::from_url(url);

        if Self::is_live_playlist(url) {
            info!("Live playlist detected, extracting audio directly from the stream");
            self.capture_live(url, &audio_path, platform).await?;
            return Ok(audio_path);
        }

        let video_path = job_dir.join("video.mp4");
        self.download(url, &video_path, platform).await?;

        let probe = self.tool.probe(&video_path).await?;

        debug!(
            "Probed media: {:.1}s (audio: {}, video: {})",
            probe.duration_secs, probe.has_audio, probe.has_video
        );

        if !probe.has_audio {
            return Err(MetascribeError::NoAudioTrack.into());
        }

        let bitrate = self.bitrate_for(probe.duration_secs);

        debug!(
            "Extracting audio ({:.1}s of media at {})",
            probe.duration_secs, bitrate
        );

        self.tool
            .extract_audio(&ExtractRequest::file(
                &video_path,
                &audio_path,
                bitrate,
                self.media.sample_rate,
            ))
            .await?;

        Ok(audio_path)
    }

    /// Long media is extracted at the reduced bitrate to keep output size
    /// manageable for the upload ceiling
    fn bitrate_for(&self, duration_secs: f64) -> &str {
        if duration_secs > self.media.long_media_threshold_secs {
            &self.media.reduced_bitrate
        } else {
            &self.media.standard_bitrate
        }
    }

    /// Stream the media file to disk, with the headers the platform's CDN
    /// expects
    async fn download(&self, url: &str, dest: &Path, platform: Platform) -> Result<u64> {
        info!("Downloading video from {} host", platform);

        let mut request = self.client.get(url);

        if let Some((referer, origin)) = platform.cdn_headers() {
            request = request.header(REFERER, referer).header(ORIGIN, origin);
        }

        let response = request.send().await.context("Failed to fetch video URL")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download video: HTTP {}", response.status());
        }

        let total_size = response.content_length().unwrap_or(0);

        let progress = ProgressBar::new(total_size);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress.set_message("Downloading video...");

        let mut file = fs_err::File::create(dest)?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(piece) = stream.next().await {
            let piece = piece.context("Download stream interrupted")?;
            file.write_all(&piece)?;
            downloaded += piece.len() as u64;
            progress.set_position(downloaded);
        }

        progress.finish_with_message("Download complete");

        if downloaded < self.media.min_download_bytes {
            return Err(MetascribeError::DownloadTooSmall { bytes: downloaded }.into());
        }

        debug!("Downloaded {} bytes to {}", downloaded, dest.display());
        Ok(downloaded)
    }

    /// Demux a live playlist straight to audio, capped in wall-clock time
    /// and always at the conservative bitrate since total size is unknown
    async fn capture_live(&self, url: &str, output: &Path, platform: Platform) -> Result<()> {
        let (referer, origin) = match platform.cdn_headers() {
            Some((referer, origin)) => (Some(referer.to_string()), Some(origin.to_string())),
            None => (None, None),
        };

        let request = ExtractRequest {
            input: url.to_string(),
            output: output.to_path_buf(),
            bitrate: self.media.reduced_bitrate.clone(),
            sample_rate: self.media.sample_rate,
            start_secs: None,
            duration_secs: Some(self.media.live_capture_cap_secs as f64),
            user_agent: Some(BROWSER_USER_AGENT.to_string()),
            referer,
            origin,
            // Margin over the capture cap for playlist negotiation and muxing
            timeout_secs: Some(self.media.live_capture_cap_secs + 120),
        };

        self.tool.extract_audio(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_live_playlist_classification() {
        assert!(MediaFetcher::is_live_playlist(
            "https://video.fbcdn.net/hls/playlist.m3u8?tag=live"
        ));
        assert!(MediaFetcher::is_live_playlist(
            "https://example.com/stream/manifest?id=4"
        ));
        assert!(!MediaFetcher::is_live_playlist(
            "https://video.fbcdn.net/v/clip.mp4"
        ));
    }

    #[test]
    fn test_long_media_uses_reduced_bitrate() {
        let fetcher = MediaFetcher::new(Config::default().media).unwrap();

        assert_eq!(fetcher.bitrate_for(30.0), "128k");
        assert_eq!(fetcher.bitrate_for(600.0), "128k");
        assert_eq!(fetcher.bitrate_for(601.0), "64k");
        assert_eq!(fetcher.bitrate_for(7200.0), "64k");
    }
}
