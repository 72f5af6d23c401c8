use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod provider;

pub use provider::{ProviderError, ProviderTranscript, Transcriber, WhisperClient};

use crate::config::Config;
use crate::keypool::KeyPool;
use crate::media::{AudioSegment, Chunker, MediaFetcher};
use crate::MetascribeError;

/// One end-to-end fetch+transcribe request.
///
/// Every job gets a uniquely named directory for its artifacts (video file,
/// audio file, chunks) so concurrent jobs never collide on the filesystem.
/// The directory is removed when the job is dropped, so success, failure,
/// and unwinds all clean up.
pub struct MediaJob {
    id: String,
    dir: PathBuf,
    pub language: Option<String>,
    pub prompt: Option<String>,
}

impl MediaJob {
    pub fn create(
        temp_root: &Path,
        language: Option<String>,
        prompt: Option<String>,
    ) -> Result<Self> {
        let id = Uuid::new_v4().simple().to_string();
        let dir = temp_root.join(&id);

        fs_err::create_dir_all(&dir).context("Failed to create job directory")?;

        Ok(Self {
            id,
            dir,
            language,
            prompt,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for MediaJob {
    /// Delete every artifact the job produced. Failure to clean is logged,
    /// never propagated; the transcript outcome must not depend on it.
    fn drop(&mut self) {
        if let Err(e) = fs_err::remove_dir_all(&self.dir) {
            warn!("Failed to clean up job {}: {}", self.id, e);
        }
    }
}

/// Final transcript handed back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionOutcome {
    pub text: String,
    pub language: String,
}

/// Drives fetch, chunking, and per-segment provider calls with key rotation.
///
/// Segments are transcribed strictly in time order, one provider call at a
/// time per job; the key pool is the only resource shared with concurrent
/// jobs.
pub struct TranscriptionOrchestrator {
    config: Config,
    pool: Arc<KeyPool>,
    provider: Arc<dyn Transcriber>,
    fetcher: MediaFetcher,
}

impl TranscriptionOrchestrator {
    pub fn new(config: Config, pool: Arc<KeyPool>) -> Result<Self> {
        let provider = Arc::new(WhisperClient::new(&config.provider)?);
        Self::with_provider(config, pool, provider)
    }

    /// Construct with a caller-supplied provider implementation
    pub fn with_provider(
        config: Config,
        pool: Arc<KeyPool>,
        provider: Arc<dyn Transcriber>,
    ) -> Result<Self> {
        let fetcher = MediaFetcher::new(config.media.clone())?;

        Ok(Self {
            config,
            pool,
            provider,
            fetcher,
        })
    }

    /// Transcribe the media behind one playable video URL.
    ///
    /// The job's artifacts are removed on every exit path by its Drop guard.
    pub async fn transcribe_url(
        &self,
        url: &str,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<TranscriptionOutcome> {
        let job = MediaJob::create(
            &self.config.temp_root(),
            language.map(str::to_string),
            prompt.map(str::to_string),
        )?;

        info!("Job {} started for {}", job.id(), url);

        self.run_job(&job, url).await
    }

    async fn run_job(&self, job: &MediaJob, url: &str) -> Result<TranscriptionOutcome> {
        let audio_path = self.fetcher.fetch(url, job.dir()).await?;

        let chunker = Chunker::new(self.fetcher.tool(), &self.config.media);
        let segments = chunker
            .chunk(&audio_path, job.dir(), self.config.provider.max_upload_bytes)
            .await?;

        info!(
            "Job {}: transcribing {} segment(s)",
            job.id(),
            segments.len()
        );

        let text = self
            .transcribe_segments(&segments, job.language.as_deref(), job.prompt.as_deref())
            .await?;

        Ok(TranscriptionOutcome {
            text,
            language: job.language.clone().unwrap_or_else(|| "auto".to_string()),
        })
    }

    /// Transcribe segments in time order and reassemble the full transcript
    pub async fn transcribe_segments(
        &self,
        segments: &[AudioSegment],
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<String> {
        let mut pieces = Vec::with_capacity(segments.len());

        for segment in segments {
            let text = self.transcribe_segment(segment, language, prompt).await?;
            pieces.push(text);
        }

        Ok(pieces.join(" ").trim().to_string())
    }

    /// Per-segment retry state machine.
    ///
    /// Each attempt reserves a key, calls the provider, and releases the key
    /// before the outcome is classified - a key must never stay reserved
    /// after its call completes. Retryable failures rotate to a key not yet
    /// tried for this segment, falling back to already-tried keys once every
    /// key has been seen, up to the attempt ceiling.
    pub async fn transcribe_segment(
        &self,
        segment: &AudioSegment,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<String> {
        let max_attempts = self.config.provider.max_attempts;
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_error: Option<ProviderError> = None;

        for attempt in 1..=max_attempts {
            // Selecting
            let credential = match self.pool.acquire_excluding(&tried) {
                Some(credential) => credential,
                None => match self.pool.acquire() {
                    Some(credential) => credential,
                    None => return Err(MetascribeError::NoKeyAvailable.into()),
                },
            };

            // Calling
            let outcome = self
                .provider
                .transcribe(&segment.path, credential.value(), language, prompt)
                .await;

            self.pool.mark_available(credential.value());

            match outcome {
                Ok(transcript) => return Ok(transcript.text),
                Err(error) if error.is_retryable() => {
                    warn!(
                        "Segment {} attempt {}/{} failed ({}), rotating key",
                        segment.index, attempt, max_attempts, error
                    );
                    tried.insert(credential.value().to_string());
                    last_error = Some(error);
                }
                Err(error) => {
                    return Err(MetascribeError::Provider {
                        status: error.status,
                        message: error.message,
                    }
                    .into());
                }
            }
        }

        let last = last_error
            .map(|error| error.to_string())
            .unwrap_or_else(|| "no provider error recorded".to_string());

        Err(MetascribeError::RetriesExhausted {
            attempts: max_attempts,
            last,
        }
        .into())
    }
}
