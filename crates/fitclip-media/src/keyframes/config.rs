//! Configuration for keyframe extraction.
//!
//! The defaults reproduce the production tuning: a hard-cut threshold that
//! only fires on large sudden changes, 1/8 s sampling inside each shot and
//! a 1-8 frames/sec density window over the whole video.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a candidate's change score is compared with `similarity_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Keep frames that differ from their neighbours (`score >= threshold`);
    /// near-duplicates are dropped.
    #[default]
    KeepDistinct,
    /// Keep frames that resemble their neighbours (`score < threshold`).
    ///
    /// This is the comparison the legacy extractor shipped with.
    KeepSimilar,
}

impl SelectionPolicy {
    /// Whether a candidate with `score` survives under this policy.
    pub fn keeps(self, score: f64, threshold: f64) -> bool {
        match self {
            SelectionPolicy::KeepDistinct => score >= threshold,
            SelectionPolicy::KeepSimilar => score < threshold,
        }
    }
}

/// Configuration for [`KeyframeExtractor`](super::KeyframeExtractor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeConfig {
    /// Mean absolute luma difference between consecutive blurred frames
    /// above which a hard cut is emitted.
    pub cut_threshold: f64,

    /// Change score compared against by the selection policy.
    pub similarity_threshold: f64,

    /// Direction of the similarity comparison.
    pub selection_policy: SelectionPolicy,

    /// Minimum global keyframe density (frames/sec).
    pub min_fps: f64,

    /// Maximum global density, also the in-segment sampling rate.
    pub max_fps: f64,

    /// Candidates within this many seconds of the video end count as the end frame.
    pub boundary_epsilon_s: f64,

    /// Gaussian blur sigma applied before any pixel comparison.
    ///
    /// 2.6 approximates a 15x15 box of an OpenCV Gaussian kernel.
    pub blur_sigma: f32,

    /// Decoded frames wider than this are downscaled.
    pub max_frame_width: u32,

    /// Upper bound on decoded frames per extraction.
    pub max_decoded_frames: u64,

    /// Wall-clock bound on one extraction.
    #[serde(with = "duration_secs")]
    pub decode_timeout: Duration,
}

impl Default for KeyframeConfig {
    fn default() -> Self {
        Self {
            cut_threshold: 25.0,
            similarity_threshold: 4.5,
            selection_policy: SelectionPolicy::KeepDistinct,
            min_fps: 1.0,
            max_fps: 8.0,
            boundary_epsilon_s: 0.1,
            blur_sigma: 2.6,
            max_frame_width: 640,
            max_decoded_frames: 500_000,
            decode_timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl KeyframeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cut_threshold(mut self, threshold: f64) -> Self {
        self.cut_threshold = threshold;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_selection_policy(mut self, policy: SelectionPolicy) -> Self {
        self.selection_policy = policy;
        self
    }

    /// Set the density window. Values are clamped to stay positive and ordered.
    pub fn with_fps_bounds(mut self, min_fps: f64, max_fps: f64) -> Self {
        self.min_fps = min_fps.max(0.01);
        self.max_fps = max_fps.max(self.min_fps);
        self
    }

    pub fn with_blur_sigma(mut self, sigma: f32) -> Self {
        self.blur_sigma = sigma.max(0.0);
        self
    }

    pub fn with_max_frame_width(mut self, width: u32) -> Self {
        self.max_frame_width = width;
        self
    }

    pub fn with_max_decoded_frames(mut self, frames: u64) -> Self {
        self.max_decoded_frames = frames;
        self
    }

    pub fn with_decode_timeout(mut self, timeout: Duration) -> Self {
        self.decode_timeout = timeout;
        self
    }

    /// Spacing between candidate samples inside a segment (seconds).
    pub fn sample_interval_s(&self) -> f64 {
        1.0 / self.max_fps
    }

    /// Minimum spacing implied by the density floor (milliseconds).
    pub fn floor_gap_ms(&self) -> u64 {
        (1000.0 / self.min_fps).round() as u64
    }

    /// Minimum spacing implied by the density ceiling (milliseconds).
    pub fn ceiling_gap_ms(&self) -> u64 {
        (1000.0 / self.max_fps).round() as u64
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
