use anyhow::{Context, Result};
use url::Url;

/// Reject source URLs the fetcher cannot handle before any network work
/// happens, returning the normalized form on success.
pub fn validate_and_normalize_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("invalid URL: {}", url))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed.into()),
        other => anyhow::bail!(
            "unsupported URL scheme '{}': only http(s) sources can be fetched",
            other
        ),
    }
}

/// Human-readable byte size for status displays
pub fn format_file_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= KIB && unit < UNITS.len() - 1 {
        size /= KIB;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Check if the current environment has required tools
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("ffmpeg").await {
        missing.push("ffmpeg - required for audio extraction and chunking".to_string());
    }

    if !check_command_available("ffprobe").await {
        missing.push("ffprobe - required for media duration and stream probing".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("-version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
