//! Pixel divergence between frames.
//!
//! All comparisons run on blurred 8-bit luma so sensor noise and
//! compression artefacts do not register as motion.

use image::{imageops, DynamicImage, GrayImage};
use rayon::prelude::*;
use tracing::warn;

use super::Candidate;

/// Candidates loaded per scoring window; bounds peak memory.
const SCORE_CHUNK: usize = 256;

/// Grayscale and blur a frame for comparison.
pub fn blurred_luma(image: &DynamicImage, sigma: f32) -> GrayImage {
    blur_luma(image.to_luma8(), sigma)
}

fn blur_luma(luma: GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        imageops::blur(&luma, sigma)
    } else {
        luma
    }
}

/// Mean absolute per-pixel difference, `None` when sizes differ.
pub fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> Option<f64> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let pixels = a.as_raw().len();
    if pixels == 0 {
        return Some(0.0);
    }
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();
    Some(total as f64 / pixels as f64)
}

/// Average divergence of `current` from both neighbours.
///
/// A missing neighbour, or one of a different size, carries no
/// information and yields 0.
pub fn change_score(
    previous: Option<&GrayImage>,
    current: &GrayImage,
    next: Option<&GrayImage>,
) -> f64 {
    let (Some(previous), Some(next)) = (previous, next) else {
        return 0.0;
    };
    match (
        mean_abs_diff(current, previous),
        mean_abs_diff(current, next),
    ) {
        (Some(a), Some(b)) => (a + b) / 2.0,
        _ => 0.0,
    }
}

/// Scores candidates against their temporal neighbours.
#[derive(Debug, Clone, Copy)]
pub struct ChangeScorer {
    blur_sigma: f32,
}

impl ChangeScorer {
    pub fn new(blur_sigma: f32) -> Self {
        Self { blur_sigma }
    }

    /// Score every candidate flagged in `wanted`.
    ///
    /// `candidates` must be in timestamp order. The first and last candidate
    /// have no neighbours and, like unwanted entries, get `None`. Artifacts
    /// are loaded once per window and scored in parallel; the output order
    /// matches the input regardless of scheduling.
    pub fn score_all(&self, candidates: &[Candidate], wanted: &[bool]) -> Vec<Option<f64>> {
        let n = candidates.len();
        let mut scores = vec![None; n];
        if n < 3 {
            return scores;
        }

        let mut start = 1;
        while start < n - 1 {
            let end = (start + SCORE_CHUNK).min(n - 1);

            if wanted[start..end].iter().any(|w| *w) {
                // Window covers one neighbour on each side
                let frames: Vec<Option<GrayImage>> = candidates[start - 1..=end]
                    .par_iter()
                    .map(|c| self.load(c))
                    .collect();

                let window: Vec<Option<f64>> = (start..end)
                    .into_par_iter()
                    .map(|i| {
                        if !wanted[i] {
                            return None;
                        }
                        let local = i - (start - 1);
                        let score = match frames[local].as_ref() {
                            Some(current) => change_score(
                                frames[local - 1].as_ref(),
                                current,
                                frames[local + 1].as_ref(),
                            ),
                            None => 0.0,
                        };
                        Some(score)
                    })
                    .collect();

                scores[start..end].copy_from_slice(&window);
            }

            start = end;
        }

        scores
    }

    fn load(&self, candidate: &Candidate) -> Option<GrayImage> {
        match candidate.artifact.load_luma() {
            Ok(luma) => Some(blur_luma(luma, self.blur_sigma)),
            Err(e) => {
                warn!(
                    timestamp_ms = candidate.timestamp_ms,
                    error = %e,
                    "Candidate frame unavailable, scoring neighbours as 0"
                );
                None
            }
        }
    }
}
