//! Scene cut markers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A hard scene boundary detected in the source video.
///
/// Cuts are never pruned once computed; the full ordered set drives
/// segmentation and the "always keep" rule of keyframe selection.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, JsonSchema)]
pub struct CutMark {
    /// Position of the cut in seconds from the start of the video.
    pub timestamp_s: f64,
}

impl CutMark {
    /// Create a cut at the given time.
    pub fn new(timestamp_s: f64) -> Self {
        Self { timestamp_s }
    }

    /// Cut position rounded to whole milliseconds.
    ///
    /// Candidates sampled at a cut carry exactly this value, so the
    /// selector can match them without float comparison.
    pub fn timestamp_ms(&self) -> u64 {
        (self.timestamp_s.max(0.0) * 1000.0).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ms_rounds() {
        assert_eq!(CutMark::new(2.5333333).timestamp_ms(), 2533);
        assert_eq!(CutMark::new(0.0995).timestamp_ms(), 100);
    }

    #[test]
    fn test_negative_clamped() {
        assert_eq!(CutMark::new(-1.0).timestamp_ms(), 0);
    }
}
