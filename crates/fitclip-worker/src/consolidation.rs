//! Segment consolidation.
//!
//! Turns the labeler's proposed exercise intervals into the final,
//! non-overlapping and minimally spaced set of clip intervals:
//!
//! 1. Overlap resolution. Two intervals overlap significantly when the
//!    shared time exceeds `overlap_ratio_threshold` of either one's
//!    duration. Intervals are ranked by confidence, then duration, then
//!    earliest start, and accepted greedily, so each overlapping cluster
//!    keeps its best-ranked member.
//! 2. Lone-interval extension. A single survivor covering less than
//!    `lone_interval_coverage_floor` of the video is stretched to
//!    `[0, duration]` and its name suffixed.
//! 3. Minimum-gap filter. In start order, an interval is accepted only if
//!    its start is more than `min_start_gap_s` from every accepted start.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

use fitclip_models::interval::FULL_VIDEO_SUFFIX;
use fitclip_models::{overlap_ratio, ConsolidatedInterval, ExerciseInterval};

/// Tunables for [`SegmentConsolidator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Overlap fraction (of either interval) above which two intervals collide.
    pub overlap_ratio_threshold: f64,
    /// Starts must be more than this many seconds apart.
    pub min_start_gap_s: f64,
    /// A lone interval covering less than this fraction of the video is extended.
    pub lone_interval_coverage_floor: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            overlap_ratio_threshold: 0.5,
            min_start_gap_s: 3.0,
            lone_interval_coverage_floor: 0.8,
        }
    }
}

/// Whether two intervals share more than `threshold` of either duration.
pub fn significantly_overlapping(
    a: &ConsolidatedInterval,
    b: &ConsolidatedInterval,
    threshold: f64,
) -> bool {
    let a_range = (a.start_time, a.end_time);
    let b_range = (b.start_time, b.end_time);
    overlap_ratio(a_range, b_range) > threshold || overlap_ratio(b_range, a_range) > threshold
}

/// Ranking for overlap resolution: best first.
fn rank(a: &ConsolidatedInterval, b: &ConsolidatedInterval) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.duration().total_cmp(&a.duration()))
        .then_with(|| a.start_time.total_cmp(&b.start_time))
}

fn by_start(a: &ConsolidatedInterval, b: &ConsolidatedInterval) -> Ordering {
    a.start_time.total_cmp(&b.start_time)
}

#[derive(Debug, Clone, Default)]
pub struct SegmentConsolidator {
    config: ConsolidationConfig,
}

impl SegmentConsolidator {
    pub fn new(config: ConsolidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Consolidate proposed intervals for a video of `video_duration` seconds.
    ///
    /// The input is left untouched; the result is sorted by start time.
    pub fn consolidate(
        &self,
        intervals: &[ExerciseInterval],
        video_duration: f64,
    ) -> Vec<ConsolidatedInterval> {
        let working: Vec<ConsolidatedInterval> =
            intervals.iter().cloned().map(ConsolidatedInterval::from).collect();

        let resolved = self.resolve_overlaps(working);
        let extended = self.extend_lone_interval(resolved, video_duration);
        let spaced = self.enforce_min_gap(extended);

        info!(
            proposed = intervals.len(),
            consolidated = spaced.len(),
            "Consolidated exercise intervals"
        );
        spaced
    }

    /// Step 1: keep one interval per significantly overlapping cluster.
    pub fn resolve_overlaps(
        &self,
        mut intervals: Vec<ConsolidatedInterval>,
    ) -> Vec<ConsolidatedInterval> {
        intervals.sort_by(rank);

        let mut accepted: Vec<ConsolidatedInterval> = Vec::with_capacity(intervals.len());
        for candidate in intervals {
            let collides = accepted.iter().find(|kept| {
                significantly_overlapping(kept, &candidate, self.config.overlap_ratio_threshold)
            });
            match collides {
                Some(kept) => debug!(
                    dropped = %candidate.name,
                    kept = %kept.name,
                    "Dropping overlapping interval"
                ),
                None => accepted.push(candidate),
            }
        }

        accepted.sort_by(by_start);
        accepted
    }

    /// Step 2: stretch a lone under-covering interval to the whole video.
    pub fn extend_lone_interval(
        &self,
        mut intervals: Vec<ConsolidatedInterval>,
        video_duration: f64,
    ) -> Vec<ConsolidatedInterval> {
        if intervals.len() != 1 {
            return intervals;
        }

        let coverage = if video_duration > 0.0 {
            intervals[0].duration() / video_duration
        } else {
            0.0
        };

        if coverage < self.config.lone_interval_coverage_floor {
            let lone = &mut intervals[0];
            info!(
                exercise = %lone.name,
                coverage = format!("{:.1}%", coverage * 100.0),
                "Extending lone interval to full video"
            );
            lone.start_time = 0.0;
            lone.end_time = video_duration;
            lone.name.push_str(FULL_VIDEO_SUFFIX);
            lone.extended = true;
        }

        intervals
    }

    /// Step 3: drop intervals starting too close to an accepted one.
    pub fn enforce_min_gap(
        &self,
        mut intervals: Vec<ConsolidatedInterval>,
    ) -> Vec<ConsolidatedInterval> {
        intervals.sort_by(by_start);

        let mut accepted: Vec<ConsolidatedInterval> = Vec::with_capacity(intervals.len());
        for candidate in intervals {
            let too_close = accepted.iter().any(|kept| {
                (candidate.start_time - kept.start_time).abs() <= self.config.min_start_gap_s
            });
            if too_close {
                debug!(
                    dropped = %candidate.name,
                    start = candidate.start_time,
                    "Dropping interval that starts too close to another"
                );
            } else {
                accepted.push(candidate);
            }
        }
        accepted
    }
}
