//! Keyframe extraction orchestration.

use fitclip_models::CutMark;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::artifact::ArtifactStore;
use super::backfill::backfill;
use super::config::KeyframeConfig;
use super::cut_detector::CutDetector;
use super::rate::RateNormalizer;
use super::sampler::SegmentSampler;
use super::selector::KeyframeSelector;
use super::Keyframe;
use crate::error::{MediaError, MediaResult};
use crate::frames::{DecodeBudget, FfmpegFrameSource, FrameSource};
use crate::probe::{probe_video, VideoMetadata};

/// Per-stage counts for one extraction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionStats {
    pub frames_decoded: u64,
    pub cuts: usize,
    pub candidates: usize,
    pub selected: usize,
    pub normalized: usize,
    pub keyframes: usize,
    pub elapsed_ms: u64,
}

/// Result of a successful extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub metadata: VideoMetadata,
    pub cuts: Vec<CutMark>,
    /// Keyframes in strictly increasing timestamp order
    pub keyframes: Vec<Keyframe>,
    pub stats: ExtractionStats,
}

/// Runs the keyframe pipeline for one video.
#[derive(Clone)]
pub struct KeyframeExtractor {
    config: KeyframeConfig,
    store: ArtifactStore,
    cancel: Arc<AtomicBool>,
}

impl KeyframeExtractor {
    pub fn new(config: KeyframeConfig, store: ArtifactStore) -> Self {
        Self {
            config,
            store,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort extraction when `cancel` is set.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &KeyframeConfig {
        &self.config
    }

    /// Probe and decode a video file through FFmpeg.
    pub async fn extract(&self, video_path: impl AsRef<Path>) -> MediaResult<ExtractionOutcome> {
        let video_path = video_path.as_ref();
        let metadata = probe_video(video_path).await?;
        info!(
            video = %video_path.display(),
            duration_s = metadata.duration_s,
            fps = metadata.fps,
            frames = metadata.frame_count,
            "Probed video"
        );

        let source = FfmpegFrameSource::open(video_path, metadata, self.config.max_frame_width)?;
        self.extract_from(source).await
    }

    /// Run the pipeline over any frame source on the blocking pool.
    pub async fn extract_from<S>(&self, source: S) -> MediaResult<ExtractionOutcome>
    where
        S: FrameSource + 'static,
    {
        let extractor = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut source = source;
            extractor.run(&mut source)
        })
        .await
        .map_err(|e| MediaError::internal(format!("Extraction task failed: {}", e)))?
    }

    /// Blocking pipeline body.
    pub fn run(&self, source: &mut dyn FrameSource) -> MediaResult<ExtractionOutcome> {
        let started = Instant::now();
        let metadata = source.metadata().clone();
        metadata.validate()?;

        let mut budget = DecodeBudget::new(self.config.max_decoded_frames, self.config.decode_timeout)
            .with_cancel(self.cancel.clone());

        let cuts = CutDetector::new(self.config.cut_threshold, self.config.blur_sigma)
            .detect(source, &mut budget)?;

        let candidates = SegmentSampler::new(self.config.sample_interval_s(), &self.store)
            .sample(source, &mut budget, &cuts)?;
        let candidate_count = candidates.len();
        metrics::counter!("fitclip_frames_sampled_total").increment(candidate_count as u64);

        let mut stats = ExtractionStats {
            frames_decoded: budget.decoded(),
            cuts: cuts.len(),
            candidates: candidate_count,
            ..Default::default()
        };

        if candidates.is_empty() {
            warn!(duration_s = metadata.duration_s, "No candidates sampled");
            stats.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(ExtractionOutcome {
                metadata,
                cuts,
                keyframes: Vec::new(),
                stats,
            });
        }

        let selected = KeyframeSelector::new(&self.config, &self.store).select(
            candidates,
            &cuts,
            metadata.duration_s,
        );
        stats.selected = selected.len();

        let normalized = RateNormalizer::new(self.config.min_fps, self.config.max_fps)
            .normalize(selected, metadata.duration_s);
        stats.normalized = normalized.kept.len();

        let filled = backfill(normalized.kept);

        for keyframe in normalized.released.iter().chain(filled.released.iter()) {
            self.store.release(&keyframe.artifact);
        }

        let keyframes = filled.kept;
        stats.keyframes = keyframes.len();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        metrics::counter!("fitclip_keyframes_retained_total").increment(keyframes.len() as u64);

        info!(
            cuts = stats.cuts,
            candidates = stats.candidates,
            selected = stats.selected,
            normalized = stats.normalized,
            keyframes = stats.keyframes,
            elapsed_ms = stats.elapsed_ms,
            "Keyframe extraction complete"
        );

        Ok(ExtractionOutcome {
            metadata,
            cuts,
            keyframes,
            stats,
        })
    }
}
