//! Transcript segments from the speech-to-text collaborator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Fraction of the video duration the transcript end may drift by and
/// still be treated as covering the video.
pub const TRANSCRIPT_DURATION_TOLERANCE: f64 = 0.1;

/// A timed piece of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Spoken text
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Whether a transcript plausibly narrates the whole video.
///
/// Music-only or silent videos tend to produce a few short segments that
/// end long before the video does; those are not worth forwarding.
pub fn transcript_covers_video(segments: &[TranscriptSegment], video_duration: f64) -> bool {
    let Some(last_end) = segments
        .iter()
        .map(|s| s.end)
        .filter(|e| e.is_finite())
        .reduce(f64::max)
    else {
        return false;
    };

    (last_end - video_duration).abs() <= video_duration * TRANSCRIPT_DURATION_TOLERANCE
}
