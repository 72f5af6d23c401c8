use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::transcribe::TranscriptionOutcome;

/// JSON envelope for transcripts written to disk or stdout
#[derive(Serialize)]
struct TranscriptExport<'a> {
    text: &'a str,
    language: &'a str,
    transcribed_at: DateTime<Utc>,
}

/// Render a transcription outcome in the requested format
pub fn render(outcome: &TranscriptionOutcome, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(outcome.text.clone()),
        OutputFormat::Json => {
            let export = TranscriptExport {
                text: &outcome.text,
                language: &outcome.language,
                transcribed_at: Utc::now(),
            };

            Ok(serde_json::to_string_pretty(&export)?)
        }
    }
}

/// Save transcription result to file
pub async fn save_to_file(
    outcome: &TranscriptionOutcome,
    path: &Path,
    format: &OutputFormat,
) -> Result<()> {
    let content = render(outcome, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print transcription result to console
pub fn print_to_console(outcome: &TranscriptionOutcome, format: &OutputFormat) -> Result<()> {
    println!("{}", render(outcome, format)?);
    Ok(())
}
