//! FFprobe video metadata.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Slack, in frames, absorbed when converting a time back to a frame index.
const FRAME_INDEX_EPSILON: f64 = 1e-6;

/// Container metadata needed by the keyframe pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Duration in seconds
    pub duration_s: f64,
    /// Nominal frame rate (fps)
    pub fps: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Total number of video frames
    pub frame_count: u64,
}

impl VideoMetadata {
    /// Build metadata, deriving the frame count from duration and fps.
    pub fn new(duration_s: f64, fps: f64, width: u32, height: u32) -> Self {
        Self {
            duration_s,
            fps,
            width,
            height,
            frame_count: estimate_frame_count(duration_s, fps),
        }
    }

    /// Source frame index for a timestamp, clamped to the last frame.
    ///
    /// Inverse of [`timestamp_of`](Self::timestamp_of): a time computed as
    /// `index / fps` maps back to `index` even when the product lands a few
    /// ulps below the integer.
    pub fn frame_index_at(&self, seconds: f64) -> u64 {
        if self.frame_count == 0 || !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        ((seconds * self.fps + FRAME_INDEX_EPSILON).floor() as u64).min(self.frame_count - 1)
    }

    /// Timestamp in seconds of a source frame index.
    pub fn timestamp_of(&self, index: u64) -> f64 {
        if self.fps > 0.0 {
            index as f64 / self.fps
        } else {
            0.0
        }
    }

    /// Reject metadata that cannot drive a sampling pass.
    pub fn validate(&self) -> MediaResult<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(MediaError::InvalidVideo(format!(
                "invalid frame rate {}",
                self.fps
            )));
        }
        if !self.duration_s.is_finite() || self.duration_s < 0.0 {
            return Err(MediaError::InvalidVideo(format!(
                "invalid duration {}",
                self.duration_s
            )));
        }
        Ok(())
    }
}

fn estimate_frame_count(duration_s: f64, fps: f64) -> u64 {
    if duration_s.is_finite() && fps.is_finite() && duration_s > 0.0 && fps > 0.0 {
        (duration_s * fps).round() as u64
    } else {
        0
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Probe a video file for its duration, frame rate and frame count.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoMetadata> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Interpret ffprobe's JSON document.
fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoMetadata> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    // Container duration first, stream duration as fallback
    let duration_s = probe
        .format
        .duration
        .as_deref()
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| MediaError::InvalidVideo("Missing duration".to_string()))?;

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| MediaError::InvalidVideo("Missing frame rate".to_string()))?;

    let mut metadata = VideoMetadata::new(
        duration_s,
        fps,
        video_stream.width.unwrap_or(0),
        video_stream.height.unwrap_or(0),
    );

    if let Some(count) = video_stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
    {
        metadata.frame_count = count;
    }

    metadata.validate()?;
    Ok(metadata)
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
///
/// Returns `None` for zero rates such as ffprobe's "0/0".
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index_inverts_timestamp() {
        for fps in [25.0, 30.0, 30000.0 / 1001.0, 60.0] {
            let meta = VideoMetadata::new(600.0, fps, 16, 16);
            for index in 0..meta.frame_count {
                assert_eq!(meta.frame_index_at(meta.timestamp_of(index)), index, "fps {}", fps);
            }
        }
    }

    #[test]
    fn test_frame_index_floors_between_frames() {
        let meta = VideoMetadata::new(10.0, 25.0, 16, 16);
        assert_eq!(meta.frame_index_at(1.159), 28);
        assert_eq!(meta.frame_index_at(1.16), 29);
        assert_eq!(meta.frame_index_at(99.0), 249);
        assert_eq!(meta.frame_index_at(-1.0), 0);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_output_prefers_nb_frames() {
        let json = br#"{
            "format": {"duration": "30.000000"},
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1280, "height": 720,
                 "avg_frame_rate": "30/1", "r_frame_rate": "30/1", "nb_frames": "901"}
            ]
        }"#;

        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.width, 1280);
        assert!((meta.fps - 30.0).abs() < 1e-9);
        assert_eq!(meta.frame_count, 901);
    }

    #[test]
    fn test_parse_probe_output_estimates_frame_count() {
        let json = br#"{
            "format": {"duration": "10.0"},
            "streams": [{"codec_type": "video", "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}]
        }"#;

        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.frame_count, 250);
    }

    #[test]
    fn test_parse_probe_output_without_video() {
        let json = br#"{"format": {"duration": "10.0"}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::InvalidVideo(_))
        ));
    }

    #[test]
    fn test_frame_index_clamped() {
        let meta = VideoMetadata::new(30.0, 30.0, 640, 360);
        assert_eq!(meta.frame_index_at(0.0), 0);
        assert_eq!(meta.frame_index_at(1.0), 30);
        assert_eq!(meta.frame_index_at(30.0), 899);
    }
}
