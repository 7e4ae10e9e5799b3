//! Clip task generation from consolidated intervals.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use fitclip_media::ClipRequest;
use fitclip_models::ConsolidatedInterval;

/// Bounds an interval must satisfy before it is handed to the encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipLimits {
    pub min_clip_duration_s: f64,
    pub max_clip_duration_s: f64,
    pub min_confidence: f64,
}

impl Default for ClipLimits {
    fn default() -> Self {
        Self {
            min_clip_duration_s: 5.0,
            max_clip_duration_s: 60.0,
            min_confidence: 0.3,
        }
    }
}

/// Why an interval produced no clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    InvalidRange,
    TooShort { duration_s: f64 },
    TooLong { duration_s: f64 },
    LowConfidence { confidence: f64 },
    EncodeFailed { message: String },
}

impl SkipReason {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::InvalidRange => "invalid_range",
            SkipReason::TooShort { .. } => "too_short",
            SkipReason::TooLong { .. } => "too_long",
            SkipReason::LowConfidence { .. } => "low_confidence",
            SkipReason::EncodeFailed { .. } => "encode_failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidRange => write!(f, "invalid range"),
            SkipReason::TooShort { duration_s } => write!(f, "too short ({:.1}s)", duration_s),
            SkipReason::TooLong { duration_s } => write!(f, "too long ({:.1}s)", duration_s),
            SkipReason::LowConfidence { confidence } => {
                write!(f, "low confidence ({:.2})", confidence)
            }
            SkipReason::EncodeFailed { message } => write!(f, "encode failed: {}", message),
        }
    }
}

/// An interval that was not turned into a clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedClip {
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl SkippedClip {
    pub fn new(interval: &ConsolidatedInterval, reason: SkipReason) -> Self {
        Self {
            name: interval.name.clone(),
            start_time: interval.start_time,
            end_time: interval.end_time,
            reason,
        }
    }
}

/// Validate one interval against the range rules and `limits`, in order.
pub fn plan_clip(
    interval: &ConsolidatedInterval,
    limits: &ClipLimits,
) -> Result<ClipRequest, SkipReason> {
    let request = ClipRequest::new(
        interval.name.clone(),
        interval.start_time,
        interval.end_time,
        interval.confidence,
    )
    .map_err(|_| SkipReason::InvalidRange)?;

    let duration_s = request.duration_s();
    if duration_s < limits.min_clip_duration_s {
        return Err(SkipReason::TooShort { duration_s });
    }
    if duration_s > limits.max_clip_duration_s {
        return Err(SkipReason::TooLong { duration_s });
    }
    if request.confidence < limits.min_confidence {
        return Err(SkipReason::LowConfidence {
            confidence: request.confidence,
        });
    }

    Ok(request)
}

/// Split intervals into encodable requests and rejections.
pub fn generate_clip_tasks(
    intervals: &[ConsolidatedInterval],
    limits: &ClipLimits,
) -> (Vec<ClipRequest>, Vec<SkippedClip>) {
    let mut requests = Vec::with_capacity(intervals.len());
    let mut skipped = Vec::new();

    for interval in intervals {
        match plan_clip(interval, limits) {
            Ok(request) => requests.push(request),
            Err(reason) => {
                debug!(
                    exercise = %interval.name,
                    start = interval.start_time,
                    end = interval.end_time,
                    reason = %reason,
                    "Interval rejected before encoding"
                );
                skipped.push(SkippedClip::new(interval, reason));
            }
        }
    }

    (requests, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: f64, end: f64, confidence: f64) -> ConsolidatedInterval {
        ConsolidatedInterval {
            name: "Lunge".to_string(),
            start_time: start,
            end_time: end,
            confidence,
            extended: false,
        }
    }

    #[test]
    fn test_inverted_range_never_planned() {
        let result = plan_clip(&interval(10.0, 4.0, 0.9), &ClipLimits::default());
        assert_eq!(result, Err(SkipReason::InvalidRange));
    }

    #[test]
    fn test_limits_applied_in_order() {
        let limits = ClipLimits::default();

        // Short and low confidence: duration is checked first
        assert!(matches!(
            plan_clip(&interval(0.0, 3.0, 0.1), &limits),
            Err(SkipReason::TooShort { .. })
        ));
        assert!(matches!(
            plan_clip(&interval(0.0, 90.0, 0.1), &limits),
            Err(SkipReason::TooLong { .. })
        ));
        assert!(matches!(
            plan_clip(&interval(0.0, 20.0, 0.1), &limits),
            Err(SkipReason::LowConfidence { .. })
        ));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let limits = ClipLimits::default();
        assert!(plan_clip(&interval(0.0, 5.0, 0.3), &limits).is_ok());
        assert!(plan_clip(&interval(10.0, 70.0, 0.3), &limits).is_ok());
    }

    #[test]
    fn test_generate_clip_tasks_partitions() {
        let intervals = vec![
            interval(0.0, 20.0, 0.9),
            interval(25.0, 21.0, 0.9),
            interval(30.0, 32.0, 0.9),
        ];
        let (requests, skipped) = generate_clip_tasks(&intervals, &ClipLimits::default());

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].start_s, 0.0);
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].reason.label(), "invalid_range");
        assert_eq!(skipped[1].reason.label(), "too_short");
    }

    #[test]
    fn test_skipped_serializes_flat() {
        let skipped = SkippedClip::new(
            &interval(0.0, 2.0, 0.9),
            SkipReason::TooShort { duration_s: 2.0 },
        );
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["reason"], "too_short");
        assert_eq!(json["duration_s"], 2.0);
        assert_eq!(json["name"], "Lunge");
    }
}
