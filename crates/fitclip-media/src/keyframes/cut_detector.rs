//! Hard-cut detection over a full sequential decode.

use fitclip_models::CutMark;
use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, info};

use super::change_score::{blurred_luma, mean_abs_diff};
use crate::error::{MediaError, MediaResult};
use crate::frames::{DecodeBudget, Frame, FrameSource};

/// Frames blurred in parallel per batch.
const BATCH_SIZE: usize = 64;

/// Detects hard scene cuts from consecutive-frame luma divergence.
#[derive(Debug, Clone, Copy)]
pub struct CutDetector {
    threshold: f64,
    blur_sigma: f32,
}

impl CutDetector {
    pub fn new(threshold: f64, blur_sigma: f32) -> Self {
        Self {
            threshold,
            blur_sigma,
        }
    }

    /// Decode every frame once and return the cut timestamps.
    ///
    /// A cut is emitted at frame `i` when the blurred difference to frame
    /// `i - 1` exceeds the threshold; frame 0 never emits. The result is
    /// strictly increasing and within `[0, duration)`.
    pub fn detect(
        &self,
        source: &mut dyn FrameSource,
        budget: &mut DecodeBudget,
    ) -> MediaResult<Vec<CutMark>> {
        let metadata = source.metadata().clone();
        source.rewind()?;

        let mut cuts: Vec<CutMark> = Vec::new();
        let mut previous: Option<GrayImage> = None;
        let mut decoded = 0u64;

        loop {
            let mut batch: Vec<Frame> = Vec::with_capacity(BATCH_SIZE);
            while batch.len() < BATCH_SIZE {
                match source.next_frame()? {
                    Some(frame) => {
                        budget.charge()?;
                        batch.push(frame);
                    }
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            decoded += batch.len() as u64;

            let blurred: Vec<GrayImage> = batch
                .par_iter()
                .map(|frame| blurred_luma(&frame.pixels, self.blur_sigma))
                .collect();

            for (frame, current) in batch.iter().zip(blurred) {
                if let Some(prev) = previous.as_ref() {
                    let diff = mean_abs_diff(&current, prev).ok_or_else(|| {
                        MediaError::decode_failed(format!(
                            "frame {} changed size mid-stream",
                            frame.index
                        ))
                    })?;

                    if diff > self.threshold {
                        let timestamp_s = metadata.timestamp_of(frame.index);
                        let in_range = timestamp_s >= 0.0 && timestamp_s < metadata.duration_s;
                        let increasing = cuts.last().map_or(true, |c| timestamp_s > c.timestamp_s);
                        if in_range && increasing {
                            debug!(frame = frame.index, diff, timestamp_s, "Cut detected");
                            cuts.push(CutMark::new(timestamp_s));
                        }
                    }
                }
                previous = Some(current);
            }
        }

        if decoded == 0 && metadata.duration_s > 0.0 {
            return Err(MediaError::decode_failed("no frames could be decoded"));
        }

        info!(frames = decoded, cuts = cuts.len(), "Cut detection complete");
        Ok(cuts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::MemoryFrameSource;
    use image::{DynamicImage, Luma};
    use std::time::Duration;

    fn gray(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([value])))
    }

    fn budget() -> DecodeBudget {
        DecodeBudget::new(10_000, Duration::from_secs(60))
    }

    #[test]
    fn test_detects_hard_cuts() {
        // 10 fps: scene changes at frames 20 and 35
        let frames = (0..50)
            .map(|i| match i {
                0..=19 => gray(10),
                20..=34 => gray(200),
                _ => gray(60),
            })
            .collect();
        let mut source = MemoryFrameSource::new(frames, 10.0).unwrap();

        let cuts = CutDetector::new(25.0, 0.0).detect(&mut source, &mut budget()).unwrap();
        let times: Vec<f64> = cuts.iter().map(|c| c.timestamp_s).collect();
        assert_eq!(times, vec![2.0, 3.5]);
    }

    #[test]
    fn test_gradual_change_is_not_a_cut() {
        let frames = (0..100).map(|i| gray((i * 2) as u8)).collect();
        let mut source = MemoryFrameSource::new(frames, 25.0).unwrap();

        let cuts = CutDetector::new(25.0, 2.6).detect(&mut source, &mut budget()).unwrap();
        assert!(cuts.is_empty());
    }

    #[test]
    fn test_first_frame_never_cuts() {
        let mut source = MemoryFrameSource::new(vec![gray(255), gray(255)], 1.0).unwrap();
        let cuts = CutDetector::new(0.0, 0.0).detect(&mut source, &mut budget()).unwrap();
        assert!(cuts.is_empty());
    }

    #[test]
    fn test_cuts_strictly_increasing_within_duration() {
        // Alternating frames cut on every frame after the first
        let frames = (0..30).map(|i| gray(if i % 2 == 0 { 0 } else { 255 })).collect();
        let mut source = MemoryFrameSource::new(frames, 10.0).unwrap();
        let duration = source.metadata().duration_s;

        let cuts = CutDetector::new(25.0, 0.0).detect(&mut source, &mut budget()).unwrap();
        assert_eq!(cuts.len(), 29);
        assert!(cuts.windows(2).all(|w| w[0].timestamp_s < w[1].timestamp_s));
        assert!(cuts.iter().all(|c| c.timestamp_s >= 0.0 && c.timestamp_s < duration));
    }

    #[test]
    fn test_budget_aborts_detection() {
        let frames = (0..20).map(|_| gray(0)).collect();
        let mut source = MemoryFrameSource::new(frames, 10.0).unwrap();
        let mut budget = DecodeBudget::new(5, Duration::from_secs(60));

        let result = CutDetector::new(25.0, 0.0).detect(&mut source, &mut budget);
        assert!(matches!(result, Err(MediaError::FrameBudgetExceeded(5))));
    }
}
