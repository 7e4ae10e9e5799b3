//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fitclip_media::{KeyframeConfig, SelectionPolicy};
use fitclip_models::EncodingConfig;

use crate::clip_pipeline::ClipLimits;
use crate::consolidation::ConsolidationConfig;
use crate::error::{WorkerError, WorkerResult};

/// Where candidate and keyframe images are kept during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactMode {
    /// JPEG files under the job's work directory
    Disk,
    /// Shared in-memory buffers
    Memory,
}

impl FromStr for ArtifactMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disk" => Ok(ArtifactMode::Disk),
            "memory" => Ok(ArtifactMode::Memory),
            other => Err(WorkerError::config_error(format!(
                "Unknown artifact mode: {}",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for temporary files
    pub work_dir: PathBuf,
    /// Output directory for clips
    pub clips_dir: PathBuf,
    /// Whole-job timeout
    pub job_timeout: Duration,
    /// Per-clip encode timeout
    pub clip_timeout: Duration,
    pub artifact_mode: ArtifactMode,
    /// Keep keyframe images after labeling
    pub keep_keyframes: bool,
    pub keyframes: KeyframeConfig,
    pub consolidation: ConsolidationConfig,
    pub clip_limits: ClipLimits,
    pub encoding: EncodingConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/fitclip"),
            clips_dir: PathBuf::from("/tmp/fitclip/clips"),
            job_timeout: Duration::from_secs(3600), // 1 hour
            clip_timeout: Duration::from_secs(600),
            artifact_mode: ArtifactMode::Disk,
            keep_keyframes: false,
            keyframes: KeyframeConfig::default(),
            consolidation: ConsolidationConfig::default(),
            clip_limits: ClipLimits::default(),
            encoding: EncodingConfig::default(),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key/value source; unset or unparsable keys
    /// fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let work_dir = lookup("FITCLIP_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);
        let clips_dir = lookup("FITCLIP_CLIPS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| work_dir.join("clips"));

        let kf = defaults.keyframes;
        let keyframes = KeyframeConfig {
            cut_threshold: parsed(&lookup, "FITCLIP_CUT_THRESHOLD", kf.cut_threshold),
            similarity_threshold: parsed(
                &lookup,
                "FITCLIP_SIMILARITY_THRESHOLD",
                kf.similarity_threshold,
            ),
            selection_policy: lookup("FITCLIP_SELECTION_POLICY")
                .and_then(|s| match s.trim().to_lowercase().as_str() {
                    "keep_distinct" => Some(SelectionPolicy::KeepDistinct),
                    "keep_similar" => Some(SelectionPolicy::KeepSimilar),
                    _ => None,
                })
                .unwrap_or(kf.selection_policy),
            min_fps: parsed(&lookup, "FITCLIP_MIN_FPS", kf.min_fps),
            max_fps: parsed(&lookup, "FITCLIP_MAX_FPS", kf.max_fps),
            boundary_epsilon_s: parsed(&lookup, "FITCLIP_BOUNDARY_EPSILON", kf.boundary_epsilon_s),
            blur_sigma: parsed(&lookup, "FITCLIP_BLUR_SIGMA", kf.blur_sigma),
            max_frame_width: parsed(&lookup, "FITCLIP_MAX_FRAME_WIDTH", kf.max_frame_width),
            max_decoded_frames: parsed(
                &lookup,
                "FITCLIP_MAX_DECODED_FRAMES",
                kf.max_decoded_frames,
            ),
            decode_timeout: Duration::from_secs(parsed(
                &lookup,
                "FITCLIP_DECODE_TIMEOUT",
                kf.decode_timeout.as_secs(),
            )),
        };

        let cc = defaults.consolidation;
        let consolidation = ConsolidationConfig {
            overlap_ratio_threshold: parsed(
                &lookup,
                "FITCLIP_OVERLAP_RATIO_THRESHOLD",
                cc.overlap_ratio_threshold,
            ),
            min_start_gap_s: parsed(&lookup, "FITCLIP_MIN_START_GAP", cc.min_start_gap_s),
            lone_interval_coverage_floor: parsed(
                &lookup,
                "FITCLIP_LONE_INTERVAL_COVERAGE_FLOOR",
                cc.lone_interval_coverage_floor,
            ),
        };

        let cl = defaults.clip_limits;
        let clip_limits = ClipLimits {
            min_clip_duration_s: parsed(&lookup, "FITCLIP_MIN_CLIP_DURATION", cl.min_clip_duration_s),
            max_clip_duration_s: parsed(&lookup, "FITCLIP_MAX_CLIP_DURATION", cl.max_clip_duration_s),
            min_confidence: parsed(&lookup, "FITCLIP_MIN_CONFIDENCE", cl.min_confidence),
        };

        let mut encoding = defaults.encoding;
        encoding.crf = parsed(&lookup, "FITCLIP_CRF", encoding.crf);
        if let Some(preset) = lookup("FITCLIP_PRESET") {
            encoding.preset = preset;
        }

        Self {
            work_dir,
            clips_dir,
            job_timeout: Duration::from_secs(parsed(
                &lookup,
                "FITCLIP_JOB_TIMEOUT",
                defaults.job_timeout.as_secs(),
            )),
            clip_timeout: Duration::from_secs(parsed(
                &lookup,
                "FITCLIP_CLIP_TIMEOUT",
                defaults.clip_timeout.as_secs(),
            )),
            artifact_mode: parsed(&lookup, "FITCLIP_ARTIFACTS", defaults.artifact_mode),
            keep_keyframes: parsed(&lookup, "FITCLIP_KEEP_KEYFRAMES", defaults.keep_keyframes),
            keyframes,
            consolidation,
            clip_limits,
            encoding,
        }
    }

    /// Reject combinations no pipeline stage can honour.
    pub fn validate(&self) -> WorkerResult<()> {
        let kf = &self.keyframes;
        if !(kf.min_fps > 0.0 && kf.max_fps >= kf.min_fps) {
            return Err(WorkerError::config_error(format!(
                "Invalid fps bounds: min {} max {}",
                kf.min_fps, kf.max_fps
            )));
        }
        if kf.max_frame_width < 2 {
            return Err(WorkerError::config_error("max_frame_width must be at least 2"));
        }

        let threshold = self.consolidation.overlap_ratio_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(WorkerError::config_error(format!(
                "overlap_ratio_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.consolidation.min_start_gap_s < 0.0 {
            return Err(WorkerError::config_error("min_start_gap_s must not be negative"));
        }

        let limits = &self.clip_limits;
        if limits.min_clip_duration_s > limits.max_clip_duration_s {
            return Err(WorkerError::config_error(format!(
                "min clip duration {} exceeds max {}",
                limits.min_clip_duration_s, limits.max_clip_duration_s
            )));
        }

        if self.job_timeout.is_zero() {
            return Err(WorkerError::config_error("job_timeout must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> WorkerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/fitclip"));
        assert_eq!(config.clips_dir, PathBuf::from("/tmp/fitclip/clips"));
        assert_eq!(config.keyframes.min_fps, 1.0);
        assert_eq!(config.keyframes.max_fps, 8.0);
        assert_eq!(config.consolidation.overlap_ratio_threshold, 0.5);
        assert_eq!(config.consolidation.min_start_gap_s, 3.0);
        assert_eq!(config.consolidation.lone_interval_coverage_floor, 0.8);
        assert_eq!(config.clip_limits.min_clip_duration_s, 5.0);
        assert_eq!(config.clip_limits.max_clip_duration_s, 60.0);
        assert_eq!(config.clip_limits.min_confidence, 0.3);
        assert_eq!(config.artifact_mode, ArtifactMode::Disk);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("FITCLIP_WORK_DIR", "/data/jobs"),
            ("FITCLIP_CUT_THRESHOLD", "40"),
            ("FITCLIP_SELECTION_POLICY", "keep_similar"),
            ("FITCLIP_MIN_START_GAP", "5.5"),
            ("FITCLIP_MAX_CLIP_DURATION", "90"),
            ("FITCLIP_ARTIFACTS", "memory"),
            ("FITCLIP_JOB_TIMEOUT", "120"),
            ("FITCLIP_PRESET", "veryfast"),
        ]);

        assert_eq!(config.clips_dir, PathBuf::from("/data/jobs/clips"));
        assert_eq!(config.keyframes.cut_threshold, 40.0);
        assert_eq!(config.keyframes.selection_policy, SelectionPolicy::KeepSimilar);
        assert_eq!(config.consolidation.min_start_gap_s, 5.5);
        assert_eq!(config.clip_limits.max_clip_duration_s, 90.0);
        assert_eq!(config.artifact_mode, ArtifactMode::Memory);
        assert_eq!(config.job_timeout, Duration::from_secs(120));
        assert_eq!(config.encoding.preset, "veryfast");
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = config_from(&[
            ("FITCLIP_MIN_FPS", "fast"),
            ("FITCLIP_ARTIFACTS", "tape"),
            ("FITCLIP_SELECTION_POLICY", "random"),
        ]);
        assert_eq!(config.keyframes.min_fps, 1.0);
        assert_eq!(config.artifact_mode, ArtifactMode::Disk);
        assert_eq!(config.keyframes.selection_policy, SelectionPolicy::KeepDistinct);
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut config = WorkerConfig::default();
        config.keyframes.min_fps = 10.0;
        assert!(matches!(config.validate(), Err(WorkerError::ConfigError(_))));

        let mut config = WorkerConfig::default();
        config.clip_limits.min_clip_duration_s = 120.0;
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.consolidation.overlap_ratio_threshold = 0.0;
        assert!(config.validate().is_err());
    }
}
