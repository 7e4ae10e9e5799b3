//! Exercise interval models.
//!
//! `ExerciseInterval` is what the labeler proposes; `ConsolidatedInterval`
//! is the de-overlapped, minimally spaced result handed to clip cutting.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix appended to the name of a lone interval stretched to the full video.
pub const FULL_VIDEO_SUFFIX: &str = " (Full Video)";

/// Reasons an interval coming from outside the system is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntervalError {
    #[error("interval time is not a finite number: {0}")]
    NonFinite(f64),

    #[error("interval time is negative: {0}")]
    Negative(f64),

    #[error("interval name is empty")]
    EmptyName,
}

/// A proposed exercise occurrence produced by the labeler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExerciseInterval {
    /// Exercise name as reported by the labeler
    pub name: String,
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds
    pub end_time: f64,
    /// Labeler confidence (0.0-1.0)
    pub confidence: f64,
}

impl ExerciseInterval {
    /// Create a validated interval.
    ///
    /// Only the individual times are checked here. An end before the start
    /// is allowed through; clip cutting rejects it later.
    pub fn new(
        name: impl Into<String>,
        start_time: f64,
        end_time: f64,
        confidence: f64,
    ) -> Result<Self, IntervalError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(IntervalError::EmptyName);
        }
        for t in [start_time, end_time] {
            if !t.is_finite() {
                return Err(IntervalError::NonFinite(t));
            }
            if t < 0.0 {
                return Err(IntervalError::Negative(t));
            }
        }
        let confidence = if confidence.is_finite() { confidence } else { 0.0 };

        Ok(Self {
            name,
            start_time,
            end_time,
            confidence,
        })
    }

    /// Duration in seconds (negative if the labeler inverted the bounds).
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A final clip interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidatedInterval {
    /// Exercise name (suffixed when stretched to the whole video)
    pub name: String,
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds
    pub end_time: f64,
    /// Confidence carried over from the labeler
    pub confidence: f64,
    /// Whether this interval was stretched to cover the full video
    #[serde(default)]
    pub extended: bool,
}

impl ConsolidatedInterval {
    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

impl From<ExerciseInterval> for ConsolidatedInterval {
    fn from(interval: ExerciseInterval) -> Self {
        Self {
            name: interval.name,
            start_time: interval.start_time,
            end_time: interval.end_time,
            confidence: interval.confidence,
            extended: false,
        }
    }
}

/// Length of the intersection of two `[start, end]` ranges, never negative.
pub fn overlap_secs(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.1.min(b.1) - a.0.max(b.0)).max(0.0)
}

/// Overlap as a fraction of the first range's duration.
///
/// A range with non-positive duration has ratio 0.
pub fn overlap_ratio(of: (f64, f64), with: (f64, f64)) -> f64 {
    let duration = of.1 - of.0;
    if duration > 0.0 {
        overlap_secs(of, with) / duration
    } else {
        0.0
    }
}
