use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::MetascribeError;

/// Stderr substrings that identify a missing audio stream rather than a
/// generic demux failure.
const NO_AUDIO_MARKERS: &[&str] = &[
    "does not contain any stream",
    "no audio",
    "matches no streams",
];

/// Wall-clock cap on file-to-file extraction when the request carries none;
/// nothing the demuxer does may block indefinitely.
const DEFAULT_EXTRACT_TIMEOUT_SECS: u64 = 900;

/// Probing a local file is fast; anything longer means a wedged subprocess.
const PROBE_TIMEOUT_SECS: u64 = 30;

/// Stream facts reported by the probe tool
#[derive(Debug, Clone, Copy)]
pub struct MediaProbe {
    pub duration_secs: f64,
    pub has_audio: bool,
    pub has_video: bool,
}

/// One demuxer invocation: input, optional time window, encoding, and the
/// request headers to present when the input is a network URL.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Local file path or network URL
    pub input: String,
    pub output: PathBuf,
    pub bitrate: String,
    pub sample_rate: u32,
    pub start_secs: Option<f64>,
    pub duration_secs: Option<f64>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub origin: Option<String>,
    /// Wall-clock cap on the subprocess; the default cap applies when unset
    pub timeout_secs: Option<u64>,
}

impl ExtractRequest {
    /// Plain file-to-file extraction with no time window or headers
    pub fn file(input: &Path, output: &Path, bitrate: &str, sample_rate: u32) -> Self {
        Self {
            input: input.to_string_lossy().into_owned(),
            output: output.to_path_buf(),
            bitrate: bitrate.to_string(),
            sample_rate,
            start_secs: None,
            duration_secs: None,
            user_agent: None,
            referer: None,
            origin: None,
            timeout_secs: None,
        }
    }
}

/// Boundary to the external demux/probe tool.
///
/// The tool is a black-box collaborator: exit code 0 means success, and a
/// nonzero exit has its stderr inspected for the known no-audio markers to
/// separate "this media has no audio track" from generic decode failures.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg_path: String,
    ffprobe_path: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

impl FfmpegTool {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    /// Probe duration and stream layout before attempting extraction
    pub async fn probe(&self, input: &Path) -> Result<MediaProbe> {
        let mut cmd = Command::new(&self.ffprobe_path);
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("ffprobe timed out after {}s", PROBE_TIMEOUT_SECS))?
            .context("Failed to run ffprobe")?;

        if !output.status.success() {
            anyhow::bail!("ffprobe failed for {}", input.display());
        }

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
            .context("Failed to parse ffprobe output")?;

        let duration_secs = parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let has_stream = |kind: &str| {
            parsed
                .streams
                .iter()
                .any(|s| s.codec_type.as_deref() == Some(kind))
        };

        Ok(MediaProbe {
            duration_secs,
            has_audio: has_stream("audio"),
            has_video: has_stream("video"),
        })
    }

    /// Run the demuxer for one extraction request
    pub async fn extract_audio(&self, request: &ExtractRequest) -> Result<()> {
        let args = build_extract_args(request);
        tracing::debug!("Running demuxer: {} {}", self.ffmpeg_path, args.join(" "));

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let secs = request.timeout_secs.unwrap_or(DEFAULT_EXTRACT_TIMEOUT_SECS);
        let output = tokio::time::timeout(Duration::from_secs(secs), cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("demuxer timed out after {}s", secs))?
            .context("Failed to run ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_extract_failure(&stderr));
        }

        Ok(())
    }
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Argument list for one extraction: strip video, re-encode mono MP3 at the
/// requested bitrate/sample rate, seek and cap when a window is given.
fn build_extract_args(request: &ExtractRequest) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(user_agent) = &request.user_agent {
        args.push("-user_agent".to_string());
        args.push(user_agent.clone());
    }

    let mut header_lines = String::new();
    if let Some(referer) = &request.referer {
        header_lines.push_str(&format!("Referer: {}\r\n", referer));
    }
    if let Some(origin) = &request.origin {
        header_lines.push_str(&format!("Origin: {}\r\n", origin));
    }
    if !header_lines.is_empty() {
        args.push("-headers".to_string());
        args.push(header_lines);
    }

    if let Some(start) = request.start_secs {
        args.push("-ss".to_string());
        args.push(start.to_string());
    }

    args.push("-i".to_string());
    args.push(request.input.clone());

    args.push("-vn".to_string());
    args.push("-acodec".to_string());
    args.push("libmp3lame".to_string());
    args.push("-b:a".to_string());
    args.push(request.bitrate.clone());
    args.push("-ar".to_string());
    args.push(request.sample_rate.to_string());
    args.push("-ac".to_string());
    args.push("1".to_string());

    if let Some(duration) = request.duration_secs {
        args.push("-t".to_string());
        args.push(duration.to_string());
    }

    args.push("-y".to_string());
    args.push(request.output.to_string_lossy().into_owned());

    args
}

/// Map a failed demuxer run to a typed error where stderr identifies the
/// cause, keeping only the tail of stderr for generic failures.
fn classify_extract_failure(stderr: &str) -> anyhow::Error {
    let lowered = stderr.to_lowercase();

    if NO_AUDIO_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return MetascribeError::NoAudioTrack.into();
    }

    let chars: Vec<char> = stderr.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(500)..].iter().collect();

    anyhow::anyhow!("audio extraction failed: {}", tail.trim())
}
