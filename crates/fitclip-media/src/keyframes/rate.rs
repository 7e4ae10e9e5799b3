//! Global keyframe density bounds.

use tracing::debug;

use super::{Keyframe, Retained};

/// Enforces the frames-per-second window over the selected keyframes.
#[derive(Debug, Clone, Copy)]
pub struct RateNormalizer {
    min_fps: f64,
    floor_gap_ms: u64,
    ceiling_gap_ms: u64,
}

impl RateNormalizer {
    pub fn new(min_fps: f64, max_fps: f64) -> Self {
        Self {
            min_fps,
            floor_gap_ms: (1000.0 / min_fps).round() as u64,
            ceiling_gap_ms: (1000.0 / max_fps).round() as u64,
        }
    }

    /// Smallest keyframe count that satisfies the density floor.
    pub fn min_frames_needed(&self, duration_s: f64) -> usize {
        let floor = (duration_s.max(0.0) * self.min_fps).floor() as usize;
        (floor + 1).max(2)
    }

    /// Thin the keyframes; `keyframes` must be sorted by timestamp.
    ///
    /// First and last are always kept. An interior frame is dropped when it
    /// falls less than the floor gap, or less than the ceiling gap, after
    /// the last kept frame. When thinning would leave fewer than
    /// [`min_frames_needed`](Self::min_frames_needed) frames, or the input
    /// is already that small, the input is returned untouched. Artifacts are
    /// not freed here; dropped frames are handed back in `released`.
    pub fn normalize(&self, keyframes: Vec<Keyframe>, duration_s: f64) -> Retained {
        let needed = self.min_frames_needed(duration_s);
        if keyframes.len() <= needed {
            return Retained::all(keyframes);
        }

        let last = keyframes.len() - 1;
        let mut keep = vec![false; keyframes.len()];
        keep[0] = true;
        keep[last] = true;

        let mut last_kept_ms = keyframes[0].timestamp_ms;
        for i in 1..last {
            let gap = keyframes[i].timestamp_ms.saturating_sub(last_kept_ms);
            if gap < self.floor_gap_ms || gap < self.ceiling_gap_ms {
                continue;
            }
            keep[i] = true;
            last_kept_ms = keyframes[i].timestamp_ms;
        }

        let kept_count = keep.iter().filter(|k| **k).count();
        if kept_count < needed {
            debug!(
                kept = kept_count,
                needed, "Normalization would break density floor, keeping input"
            );
            return Retained::all(keyframes);
        }

        Retained::partition(keyframes, &keep)
    }
}
