//! Per-segment candidate sampling.

use fitclip_models::CutMark;
use tracing::{debug, warn};

use super::artifact::{ArtifactName, ArtifactStore};
use super::Candidate;
use crate::error::MediaResult;
use crate::frames::{DecodeBudget, FrameSource};

/// Interval between two consecutive cut boundaries.
///
/// Segments are half-open `[start_s, end_s)`: a boundary belongs to the
/// segment it opens. The final segment also owns the video end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// 1-based segment number
    pub id: u32,
    pub start_s: f64,
    pub end_s: f64,
    pub is_last: bool,
}

/// Split `[0, duration]` at every cut.
pub fn segments(cuts: &[CutMark], duration_s: f64) -> Vec<Segment> {
    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(0.0);
    bounds.extend(cuts.iter().map(|c| c.timestamp_s));
    bounds.push(duration_s);

    let count = bounds.len() - 1;
    bounds
        .windows(2)
        .enumerate()
        .map(|(i, pair)| Segment {
            id: i as u32 + 1,
            start_s: pair[0],
            end_s: pair[1],
            is_last: i + 1 == count,
        })
        .collect()
}

fn to_ms(seconds: f64) -> u64 {
    (seconds * 1000.0).round().max(0.0) as u64
}

/// Sample times for one segment.
///
/// `start + k * interval` for every sample strictly before the segment end,
/// plus the end itself for the last segment. Degenerate segments
/// (`end <= start`) produce nothing.
pub fn sample_times(segment: &Segment, interval_s: f64) -> Vec<f64> {
    if !(segment.end_s > segment.start_s) || interval_s <= 0.0 {
        return Vec::new();
    }

    let end_ms = to_ms(segment.end_s);
    let mut times = Vec::new();
    let mut k = 0u64;
    loop {
        let t = segment.start_s + k as f64 * interval_s;
        if t >= segment.end_s || to_ms(t) >= end_ms {
            break;
        }
        times.push(t);
        k += 1;
    }

    if segment.is_last {
        times.push(segment.end_s);
    }
    times
}

/// Emits candidates at a fixed rate inside every segment.
pub struct SegmentSampler<'a> {
    interval_s: f64,
    store: &'a ArtifactStore,
}

impl<'a> SegmentSampler<'a> {
    pub fn new(interval_s: f64, store: &'a ArtifactStore) -> Self {
        Self { interval_s, store }
    }

    /// Seek to each sample's source frame and store it as a candidate.
    ///
    /// On error every artifact written so far is released.
    pub fn sample(
        &self,
        source: &mut dyn FrameSource,
        budget: &mut DecodeBudget,
        cuts: &[CutMark],
    ) -> MediaResult<Vec<Candidate>> {
        let mut candidates = Vec::new();
        match self.sample_into(source, budget, cuts, &mut candidates) {
            Ok(()) => Ok(candidates),
            Err(e) => {
                for candidate in &candidates {
                    self.store.release(&candidate.artifact);
                }
                Err(e)
            }
        }
    }

    fn sample_into(
        &self,
        source: &mut dyn FrameSource,
        budget: &mut DecodeBudget,
        cuts: &[CutMark],
        candidates: &mut Vec<Candidate>,
    ) -> MediaResult<()> {
        let metadata = source.metadata().clone();

        for segment in segments(cuts, metadata.duration_s) {
            let times = sample_times(&segment, self.interval_s);
            if times.is_empty() {
                debug!(segment = segment.id, "Empty segment, nothing to sample");
                continue;
            }

            for t in times {
                let frame_index = metadata.frame_index_at(t);
                let Some(frame) = source.seek_frame(frame_index)? else {
                    warn!(segment = segment.id, frame_index, "Sample frame past end of stream");
                    continue;
                };
                budget.charge()?;

                let timestamp_ms = to_ms(t);
                let name = ArtifactName::new(segment.id, frame_index, timestamp_ms);
                let artifact = self.store.put(&name, frame.pixels)?;

                candidates.push(Candidate {
                    segment_id: segment.id,
                    frame_index,
                    timestamp_ms,
                    artifact,
                });
            }
        }

        debug!(candidates = candidates.len(), "Sampling complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use crate::frames::MemoryFrameSource;
    use image::{DynamicImage, GrayImage, Luma};
    use std::time::Duration;

    fn cut(t: f64) -> CutMark {
        CutMark::new(t)
    }

    fn source(frames: usize, fps: f64) -> MemoryFrameSource {
        let frames = (0..frames)
            .map(|i| DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([i as u8]))))
            .collect();
        MemoryFrameSource::new(frames, fps).unwrap()
    }

    #[test]
    fn test_segments_cover_video() {
        let segs = segments(&[cut(2.0), cut(5.5)], 10.0);
        assert_eq!(segs.len(), 3);
        assert_eq!((segs[0].id, segs[0].start_s, segs[0].end_s), (1, 0.0, 2.0));
        assert_eq!((segs[2].id, segs[2].start_s, segs[2].end_s), (3, 5.5, 10.0));
        assert!(segs[2].is_last && !segs[0].is_last);
        assert!(segs.windows(2).all(|w| w[0].end_s == w[1].start_s));
    }

    #[test]
    fn test_sample_times_spacing() {
        let seg = Segment {
            id: 1,
            start_s: 1.0,
            end_s: 2.0,
            is_last: false,
        };
        let times = sample_times(&seg, 0.125);
        assert_eq!(times.len(), 8);
        assert!(times
            .windows(2)
            .all(|w| ((w[1] - w[0]) - 0.125).abs() < 1e-9));
    }

    #[test]
    fn test_last_segment_includes_end() {
        let seg = Segment {
            id: 1,
            start_s: 0.0,
            end_s: 1.05,
            is_last: true,
        };
        let times = sample_times(&seg, 0.125);
        assert_eq!(times.first(), Some(&0.0));
        assert_eq!(times.last(), Some(&1.05));
        // Regular spacing everywhere but the final sample
        let regular = &times[..times.len() - 1];
        assert!(regular
            .windows(2)
            .all(|w| ((w[1] - w[0]) - 0.125).abs() < 1e-9));
    }

    #[test]
    fn test_degenerate_segment_produces_nothing() {
        let seg = Segment {
            id: 2,
            start_s: 3.0,
            end_s: 3.0,
            is_last: false,
        };
        assert!(sample_times(&seg, 0.125).is_empty());
    }

    #[test]
    fn test_sample_candidates_increasing_with_source_indices() {
        let mut src = source(40, 10.0);
        let store = ArtifactStore::memory();
        let mut budget = DecodeBudget::new(1_000, Duration::from_secs(60));

        let candidates = SegmentSampler::new(0.125, &store)
            .sample(&mut src, &mut budget, &[cut(1.5)])
            .unwrap();

        assert!(candidates
            .windows(2)
            .all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
        assert_eq!(candidates[0].timestamp_ms, 0);
        assert_eq!(candidates.last().unwrap().timestamp_ms, 4000);
        assert_eq!(candidates.last().unwrap().frame_index, 39);

        let at_cut = candidates.iter().find(|c| c.timestamp_ms == 1500).unwrap();
        assert_eq!(at_cut.segment_id, 2);
        assert_eq!(at_cut.frame_index, 15);
        assert!(candidates
            .iter()
            .filter(|c| c.segment_id == 1)
            .all(|c| c.timestamp_ms < 1500));
    }

    #[test]
    fn test_cut_sample_uses_first_frame_of_new_shot() {
        // Dark to bright at frame 29; 29 / 25 * 25 rounds below 29
        let frames = (0..75)
            .map(|i| {
                let value = if i < 29 { 10 } else { 240 };
                DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([value])))
            })
            .collect();
        let mut src = MemoryFrameSource::new(frames, 25.0).unwrap();
        let cut_at = src.metadata().timestamp_of(29);
        let store = ArtifactStore::memory();
        let mut budget = DecodeBudget::new(1_000, Duration::from_secs(60));

        let candidates = SegmentSampler::new(0.125, &store)
            .sample(&mut src, &mut budget, &[cut(cut_at)])
            .unwrap();

        let at_cut = candidates
            .iter()
            .find(|c| c.timestamp_ms == 1160)
            .unwrap();
        assert_eq!(at_cut.segment_id, 2);
        assert_eq!(at_cut.frame_index, 29);
        assert_eq!(at_cut.artifact.load_luma().unwrap().get_pixel(0, 0)[0], 240);
        assert!(candidates
            .iter()
            .filter(|c| c.segment_id == 2)
            .all(|c| c.frame_index >= 29));
    }

    #[test]
    fn test_cut_at_zero_leaves_empty_first_segment() {
        let mut src = source(10, 10.0);
        let store = ArtifactStore::memory();
        let mut budget = DecodeBudget::new(1_000, Duration::from_secs(60));

        let candidates = SegmentSampler::new(0.125, &store)
            .sample(&mut src, &mut budget, &[cut(0.0)])
            .unwrap();
        assert!(candidates.iter().all(|c| c.segment_id == 2));
    }

    #[test]
    fn test_sampling_budget_releases_artifacts() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::disk(dir.path()).unwrap();
        let mut src = source(40, 10.0);
        let mut budget = DecodeBudget::new(3, Duration::from_secs(60));

        let result = SegmentSampler::new(0.125, &store).sample(&mut src, &mut budget, &[]);
        assert!(matches!(result, Err(MediaError::FrameBudgetExceeded(3))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
