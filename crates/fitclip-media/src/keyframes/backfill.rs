//! Sparse-second backfill.
//!
//! Works per one-second bucket of the timeline. A bucket holding any
//! scored frame keeps only its scored frames; a bucket holding only
//! zero-score frames keeps its earliest one. Applying the pass to its own
//! output changes nothing.

use super::{Keyframe, Retained};

/// Apply the backfill rule to keyframes sorted by timestamp.
pub fn backfill(keyframes: Vec<Keyframe>) -> Retained {
    let mut keep = vec![false; keyframes.len()];

    let mut start = 0;
    while start < keyframes.len() {
        let second = keyframes[start].second();
        let mut end = start;
        while end < keyframes.len() && keyframes[end].second() == second {
            end += 1;
        }

        let bucket = &keyframes[start..end];
        if bucket.iter().any(|k| !k.is_zero_score()) {
            for (offset, keyframe) in bucket.iter().enumerate() {
                keep[start + offset] = !keyframe.is_zero_score();
            }
        } else {
            keep[start] = true;
        }

        start = end;
    }

    Retained::partition(keyframes, &keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframes::artifact::ArtifactRef;
    use image::DynamicImage;
    use std::sync::Arc;

    fn keyframe(ts_ms: u64, score: f64) -> Keyframe {
        Keyframe {
            segment_id: 1,
            frame_index: ts_ms / 125,
            timestamp_ms: ts_ms,
            change_score: score,
            special: score == 0.0,
            artifact: ArtifactRef::Memory(Arc::new(DynamicImage::new_luma8(1, 1))),
        }
    }

    fn times(frames: &[Keyframe]) -> Vec<u64> {
        frames.iter().map(|k| k.timestamp_ms).collect()
    }

    fn sample() -> Vec<Keyframe> {
        vec![
            keyframe(0, 0.0),
            keyframe(500, 9.0),
            keyframe(1_250, 0.0),
            keyframe(1_750, 0.0),
            keyframe(2_000, 0.7),
            keyframe(2_500, 12.0),
            keyframe(3_000, 0.0),
        ]
    }

    #[test]
    fn test_scored_frames_displace_zero_score() {
        let out = backfill(sample());
        // Second 0 keeps the scored frame; 0.7 truncates to a zero score
        assert_eq!(times(&out.kept), vec![500, 1_250, 2_500, 3_000]);
        assert_eq!(times(&out.released), vec![0, 1_750, 2_000]);
    }

    #[test]
    fn test_every_occupied_second_keeps_a_frame() {
        let input = sample();
        let seconds: std::collections::BTreeSet<u64> = input.iter().map(|k| k.second()).collect();
        let out = backfill(input);
        let kept: std::collections::BTreeSet<u64> = out.kept.iter().map(|k| k.second()).collect();
        assert_eq!(seconds, kept);
    }

    #[test]
    fn test_idempotent() {
        let once = backfill(sample()).kept;
        let first = times(&once);
        let twice = backfill(once);
        assert_eq!(times(&twice.kept), first);
        assert!(twice.released.is_empty());
    }

    #[test]
    fn test_start_and_end_only() {
        let out = backfill(vec![keyframe(0, 0.0), keyframe(30_000, 0.0)]);
        assert_eq!(times(&out.kept), vec![0, 30_000]);
    }

    #[test]
    fn test_empty() {
        let out = backfill(Vec::new());
        assert!(out.kept.is_empty() && out.released.is_empty());
    }
}
