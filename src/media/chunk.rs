use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use super::ffmpeg::{ExtractRequest, FfmpegTool};
use crate::config::MediaConfig;

/// A time-bounded slice of a job's audio track, sized for one provider call
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub index: usize,
    pub path: PathBuf,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub byte_size: u64,
}

/// How one audio file maps onto provider-sized segments
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkPlan {
    /// At or under the ceiling: the whole file is one segment, untouched
    Single,
    /// Over the ceiling: re-encode each `(start, duration)` window
    Windows(Vec<(f64, f64)>),
}

/// Decide whether a file needs splitting and into which windows.
pub fn plan_chunks(
    byte_size: u64,
    size_ceiling: u64,
    total_secs: f64,
    window_secs: f64,
) -> ChunkPlan {
    if byte_size <= size_ceiling {
        ChunkPlan::Single
    } else {
        ChunkPlan::Windows(plan_windows(total_secs, window_secs))
    }
}

/// Contiguous `(start, duration)` windows covering `total_secs`.
///
/// The final window may be shorter than `window_secs`; windows never overlap
/// and their durations sum to the total.
pub fn plan_windows(total_secs: f64, window_secs: f64) -> Vec<(f64, f64)> {
    if total_secs <= 0.0 || window_secs <= 0.0 {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = 0.0;

    while start < total_secs {
        let duration = (total_secs - start).min(window_secs);
        windows.push((start, duration));
        start += window_secs;
    }

    windows
}

/// Splits audio that exceeds the provider's upload ceiling into fixed-length
/// windows, re-encoded at a reduced bitrate.
pub struct Chunker<'a> {
    tool: &'a FfmpegTool,
    media: &'a MediaConfig,
}

impl<'a> Chunker<'a> {
    pub fn new(tool: &'a FfmpegTool, media: &'a MediaConfig) -> Self {
        Self { tool, media }
    }

    /// Produce the ordered segment list for one audio file.
    ///
    /// Files at or under `size_ceiling` come back as a single segment
    /// wrapping the original file, with no re-encoding.
    pub async fn chunk(
        &self,
        audio_path: &Path,
        job_dir: &Path,
        size_ceiling: u64,
    ) -> Result<Vec<AudioSegment>> {
        let byte_size = fs_err::metadata(audio_path)?.len();
        let probe = self.tool.probe(audio_path).await?;

        let windows = match plan_chunks(
            byte_size,
            size_ceiling,
            probe.duration_secs,
            self.media.chunk_window_secs,
        ) {
            ChunkPlan::Single => {
                return Ok(vec![AudioSegment {
                    index: 0,
                    path: audio_path.to_path_buf(),
                    start_secs: 0.0,
                    duration_secs: probe.duration_secs,
                    byte_size,
                }]);
            }
            ChunkPlan::Windows(windows) => windows,
        };

        if windows.is_empty() {
            anyhow::bail!(
                "cannot split {}: probe reported no duration",
                audio_path.display()
            );
        }

        info!(
            "Splitting {} ({} bytes) into {} windows of {}s",
            audio_path.display(),
            byte_size,
            windows.len(),
            self.media.chunk_window_secs
        );

        let mut segments = Vec::with_capacity(windows.len());

        for (index, (start_secs, duration_secs)) in windows.into_iter().enumerate() {
            let chunk_path = job_dir.join(format!("chunk_{:03}.mp3", index));

            let mut request = ExtractRequest::file(
                audio_path,
                &chunk_path,
                &self.media.chunk_bitrate,
                self.media.sample_rate,
            );
            request.start_secs = Some(start_secs);
            request.duration_secs = Some(duration_secs);

            self.tool.extract_audio(&request).await?;

            let chunk_size = fs_err::metadata(&chunk_path)?.len();

            segments.push(AudioSegment {
                index,
                path: chunk_path,
                start_secs,
                duration_secs,
                byte_size: chunk_size,
            });
        }

        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(windows: &[(f64, f64)]) -> f64 {
        windows.iter().map(|(_, d)| d).sum()
    }

    #[test]
    fn test_windows_cover_duration_exactly() {
        let windows = plan_windows(1500.0, 600.0);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], (0.0, 600.0));
        assert_eq!(windows[1], (600.0, 600.0));
        assert_eq!(windows[2], (1200.0, 300.0));
        assert_eq!(total(&windows), 1500.0);
    }

    #[test]
    fn test_windows_are_contiguous_and_increasing() {
        let windows = plan_windows(3723.5, 600.0);

        assert_eq!(windows.len(), 7);

        for pair in windows.windows(2) {
            let (start, duration) = pair[0];
            let (next_start, _) = pair[1];
            assert_eq!(start + duration, next_start);
            assert!(next_start > start);
        }

        assert!((total(&windows) - 3723.5).abs() < 1e-9);
    }

    #[test]
    fn test_window_count_is_duration_over_window_rounded_up() {
        assert_eq!(plan_windows(600.0, 600.0).len(), 1);
        assert_eq!(plan_windows(600.1, 600.0).len(), 2);
        assert_eq!(plan_windows(59.0, 600.0).len(), 1);
    }

    #[test]
    fn test_degenerate_inputs_yield_no_windows() {
        assert!(plan_windows(0.0, 600.0).is_empty());
        assert!(plan_windows(-5.0, 600.0).is_empty());
        assert!(plan_windows(100.0, 0.0).is_empty());
    }

    #[test]
    fn test_file_under_ceiling_is_not_split() {
        let ceiling = 24 * 1024 * 1024;

        assert_eq!(plan_chunks(ceiling, ceiling, 1200.0, 600.0), ChunkPlan::Single);
        assert_eq!(plan_chunks(512, ceiling, 30.0, 600.0), ChunkPlan::Single);
    }

    #[test]
    fn test_twenty_five_minute_sixty_megabyte_file_splits_in_three() {
        let plan = plan_chunks(60 * 1024 * 1024, 24 * 1024 * 1024, 1500.0, 600.0);

        match plan {
            ChunkPlan::Windows(windows) => {
                assert_eq!(windows.len(), 3);
                assert_eq!(windows[0].1, 600.0);
                assert_eq!(windows[1].1, 600.0);
                assert_eq!(windows[2].1, 300.0);
            }
            ChunkPlan::Single => panic!("expected the file to be split"),
        }
    }
}
