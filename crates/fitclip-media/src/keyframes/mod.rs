//! Keyframe extraction.
//!
//! Pipeline, in order:
//! 1. [`CutDetector`] finds hard cuts in one sequential decode.
//! 2. [`SegmentSampler`] seeks to 1/`max_fps` s samples inside each segment.
//! 3. [`KeyframeSelector`] keeps start/end/cut frames and scores the rest
//!    with the [`ChangeScorer`].
//! 4. [`RateNormalizer`] thins the survivors to the density window.
//! 5. [`backfill`] guarantees one frame per occupied second.
//!
//! [`KeyframeExtractor`] runs all stages on the blocking pool.

pub mod artifact;
pub mod backfill;
pub mod change_score;
pub mod config;
pub mod cut_detector;
pub mod extractor;
pub mod rate;
pub mod sampler;
pub mod selector;

use serde::Serialize;

pub use artifact::{ArtifactName, ArtifactRef, ArtifactStore};
pub use backfill::backfill;
pub use change_score::{blurred_luma, change_score, mean_abs_diff, ChangeScorer};
pub use config::{KeyframeConfig, SelectionPolicy};
pub use cut_detector::CutDetector;
pub use extractor::{ExtractionOutcome, ExtractionStats, KeyframeExtractor};
pub use rate::RateNormalizer;
pub use sampler::{sample_times, segments, Segment, SegmentSampler};
pub use selector::KeyframeSelector;

/// A sampled frame proposed for retention.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub segment_id: u32,
    /// Index of the frame in the source video
    pub frame_index: u64,
    pub timestamp_ms: u64,
    pub artifact: ArtifactRef,
}

/// A candidate that survived selection.
#[derive(Debug, Clone, Serialize)]
pub struct Keyframe {
    pub segment_id: u32,
    #[serde(rename = "source_frame_index")]
    pub frame_index: u64,
    pub timestamp_ms: u64,
    /// Change score at selection time, 0 for special frames
    pub change_score: f64,
    /// Video start, video end, or on a cut
    pub special: bool,
    pub artifact: ArtifactRef,
}

impl Keyframe {
    pub fn timestamp_s(&self) -> f64 {
        self.timestamp_ms as f64 / 1000.0
    }

    /// Integer second the frame falls in.
    pub fn second(&self) -> u64 {
        self.timestamp_ms / 1000
    }

    /// Diagnostic score embedded in the artifact name (truncated).
    pub fn diff_score(&self) -> u32 {
        if self.change_score.is_finite() && self.change_score > 0.0 {
            self.change_score as u32
        } else {
            0
        }
    }

    pub fn is_zero_score(&self) -> bool {
        self.diff_score() == 0
    }
}

/// Split of a keyframe list into survivors and frames to free.
#[derive(Debug, Default)]
pub struct Retained {
    pub kept: Vec<Keyframe>,
    pub released: Vec<Keyframe>,
}

impl Retained {
    pub fn all(kept: Vec<Keyframe>) -> Self {
        Self {
            kept,
            released: Vec::new(),
        }
    }

    /// Partition preserving order; `keep` is parallel to `keyframes`.
    pub fn partition(keyframes: Vec<Keyframe>, keep: &[bool]) -> Self {
        let mut out = Self::default();
        for (keyframe, keep) in keyframes.into_iter().zip(keep) {
            if *keep {
                out.kept.push(keyframe);
            } else {
                out.released.push(keyframe);
            }
        }
        out
    }
}
