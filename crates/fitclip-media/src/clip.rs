//! Exercise clip cutting.
//!
//! A [`ClipRequest`] is validated on construction, so an empty or inverted
//! range never reaches an encoder. [`FfmpegClipEncoder`] trims the range
//! and re-encodes both streams into `{slug}_{start_ms}.mp4`.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use fitclip_models::encoding::CLIP_EXTENSION;
use fitclip_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// A validated `[start, end]` extraction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipRequest {
    pub name: String,
    pub start_s: f64,
    pub end_s: f64,
    pub confidence: f64,
}

impl ClipRequest {
    /// Reject non-finite, negative or non-positive-duration ranges.
    pub fn new(
        name: impl Into<String>,
        start_s: f64,
        end_s: f64,
        confidence: f64,
    ) -> MediaResult<Self> {
        let valid = start_s.is_finite() && end_s.is_finite() && start_s >= 0.0 && end_s > start_s;
        if !valid {
            return Err(MediaError::InvalidClipRange {
                start: start_s,
                end: end_s,
            });
        }
        Ok(Self {
            name: name.into(),
            start_s,
            end_s,
            confidence,
        })
    }

    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }

    /// Deterministic output file name.
    pub fn output_file_name(&self) -> String {
        let start_ms = (self.start_s * 1000.0).round() as u64;
        format!("{}_{}.{}", slug(&self.name), start_ms, CLIP_EXTENSION)
    }
}

/// Lowercase ASCII slug; runs of other characters become one `_`.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        out.push_str("exercise");
    }
    out
}

/// A clip written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipOutput {
    pub name: String,
    pub path: PathBuf,
    pub start_s: f64,
    pub end_s: f64,
    pub size_bytes: u64,
}

/// Cuts one clip out of a source video.
#[async_trait]
pub trait ClipEncoder: Send + Sync {
    async fn encode(
        &self,
        source: &Path,
        request: &ClipRequest,
        output: &Path,
    ) -> MediaResult<ClipOutput>;
}

/// Encoder backed by the `ffmpeg` CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegClipEncoder {
    encoding: EncodingConfig,
    timeout_secs: Option<u64>,
}

impl FfmpegClipEncoder {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            encoding,
            timeout_secs: None,
        }
    }

    /// Kill FFmpeg if one clip takes longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// FFmpeg invocation for a request.
    pub fn command(&self, source: &Path, request: &ClipRequest, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(source, output)
            .seek(request.start_s)
            .duration(request.duration_s())
            .encoding(&self.encoding)
            .output_args(["-movflags", "+faststart"])
    }
}

#[async_trait]
impl ClipEncoder for FfmpegClipEncoder {
    async fn encode(
        &self,
        source: &Path,
        request: &ClipRequest,
        output: &Path,
    ) -> MediaResult<ClipOutput> {
        if !source.exists() {
            return Err(MediaError::FileNotFound(source.to_path_buf()));
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(
            clip = %request.name,
            start_s = request.start_s,
            duration_s = request.duration_s(),
            output = %output.display(),
            "Encoding clip"
        );

        let cmd = self.command(source, request, output);
        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        let total_ms = (request.duration_s() * 1000.0).round() as i64;
        runner
            .run_with_progress(&cmd, move |p| {
                debug!(
                    percent = p.percentage(total_ms),
                    speed = p.speed,
                    "Clip encode progress"
                );
            })
            .await?;

        let size_bytes = tokio::fs::metadata(output).await?.len();
        if size_bytes == 0 {
            return Err(MediaError::ffmpeg_failed(
                format!("FFmpeg produced an empty file: {}", output.display()),
                None,
                None,
            ));
        }

        Ok(ClipOutput {
            name: request.name.clone(),
            path: output.to_path_buf(),
            start_s: request.start_s,
            end_s: request.end_s,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_range_rejected() {
        let err = ClipRequest::new("Squat", 10.0, 4.0, 0.9).unwrap_err();
        assert!(matches!(err, MediaError::InvalidClipRange { .. }));
    }

    #[test]
    fn test_empty_and_non_finite_ranges_rejected() {
        assert!(ClipRequest::new("Squat", 5.0, 5.0, 0.9).is_err());
        assert!(ClipRequest::new("Squat", f64::NAN, 5.0, 0.9).is_err());
        assert!(ClipRequest::new("Squat", 0.0, f64::INFINITY, 0.9).is_err());
        assert!(ClipRequest::new("Squat", -1.0, 5.0, 0.9).is_err());
    }

    #[test]
    fn test_output_file_name() {
        let request = ClipRequest::new("Push-Up (Full Video)", 12.3456, 30.0, 0.8).unwrap();
        assert_eq!(request.output_file_name(), "push_up_full_video_12346.mp4");
        assert!((request.duration_s() - 17.6544).abs() < 1e-9);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Jumping Jack"), "jumping_jack");
        assert_eq!(slug("  Sun   salutation!! "), "sun_salutation");
        assert_eq!(slug("???"), "exercise");
    }

    #[test]
    fn test_ffmpeg_command_reencodes() {
        let request = ClipRequest::new("Plank", 10.0, 25.0, 0.9).unwrap();
        let encoder = FfmpegClipEncoder::new(EncodingConfig::default());
        let args = encoder
            .command(Path::new("in.mp4"), &request, Path::new("out/plank_10000.mp4"))
            .build_args();

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-ss") + 1], "10.000");
        assert_eq!(args[pos("-t") + 1], "15.000");
        assert_eq!(args[pos("-c:v") + 1], "libx264");
        assert_eq!(args[pos("-c:a") + 1], "aac");
    }

    #[tokio::test]
    async fn test_missing_source() {
        let request = ClipRequest::new("Plank", 0.0, 10.0, 0.9).unwrap();
        let result = FfmpegClipEncoder::default()
            .encode(Path::new("/nonexistent/video.mp4"), &request, Path::new("/tmp/x.mp4"))
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
