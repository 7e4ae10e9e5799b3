//! Per-video workout processing.
//!
//! Extraction → labeling → consolidation → clip cutting, under one job
//! timeout. Stage-local problems (a labeler outage, a bad interval, a
//! failed encode) degrade the result; an undecodable video fails the job.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Instrument;

use fitclip_media::{
    ArtifactStore, ClipEncoder, ClipOutput, ExtractionOutcome, ExtractionStats, FrameSource,
    KeyframeExtractor, Keyframe, VideoMetadata,
};
use fitclip_models::{ConsolidatedInterval, JobId, TranscriptSegment};

use crate::clip_pipeline::{ClipPipeline, SkippedClip};
use crate::config::{ArtifactMode, WorkerConfig};
use crate::consolidation::SegmentConsolidator;
use crate::error::{WorkerError, WorkerResult};
use crate::labeler::{validate_intervals, ExerciseLabeler, KeywordFallbackLabeler, LabelerRequest};
use crate::logging::JobLogger;

/// Everything one job produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub job_id: JobId,
    pub video: PathBuf,
    pub metadata: VideoMetadata,
    pub cuts: usize,
    pub keyframes: Vec<Keyframe>,
    /// Labeler whose answer was used; `None` when nothing was labeled
    pub labeler: Option<String>,
    pub intervals: Vec<ConsolidatedInterval>,
    pub clips: Vec<ClipOutput>,
    pub skipped: Vec<SkippedClip>,
    pub stats: ExtractionStats,
    pub processed_at: DateTime<Utc>,
}

/// Runs the full pipeline for one video at a time.
#[derive(Clone)]
pub struct WorkoutProcessor {
    config: WorkerConfig,
    labeler: Arc<dyn ExerciseLabeler>,
    fallback: KeywordFallbackLabeler,
    consolidator: SegmentConsolidator,
    clips: ClipPipeline,
}

impl WorkoutProcessor {
    pub fn new(
        config: WorkerConfig,
        labeler: Arc<dyn ExerciseLabeler>,
        encoder: Arc<dyn ClipEncoder>,
    ) -> Self {
        let consolidator = SegmentConsolidator::new(config.consolidation.clone());
        let clips = ClipPipeline::new(encoder, config.clip_limits.clone(), config.clips_dir.clone());
        Self {
            config,
            labeler,
            fallback: KeywordFallbackLabeler::new(),
            consolidator,
            clips,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process a video file, decoding it through FFmpeg.
    pub async fn process(
        &self,
        video: &Path,
        transcript: &[TranscriptSegment],
    ) -> WorkerResult<ProcessingOutcome> {
        let job_id = JobId::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let (extractor, store) = self.extractor(&job_id, cancel.clone())?;

        let run = async {
            let extraction = extractor.extract(video).await?;
            self.label_and_cut(&job_id, video, extraction, &store, transcript)
                .await
        };
        let result = self.with_timeout(&job_id, cancel, run).await;
        self.cleanup(&job_id).await;
        result
    }

    /// Process frames from an already opened source; `video` is what
    /// clips are cut from.
    pub async fn process_source<S>(
        &self,
        video: &Path,
        source: S,
        transcript: &[TranscriptSegment],
    ) -> WorkerResult<ProcessingOutcome>
    where
        S: FrameSource + 'static,
    {
        let job_id = JobId::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let (extractor, store) = self.extractor(&job_id, cancel.clone())?;

        let run = async {
            let extraction = extractor.extract_from(source).await?;
            self.label_and_cut(&job_id, video, extraction, &store, transcript)
                .await
        };
        let result = self.with_timeout(&job_id, cancel, run).await;
        self.cleanup(&job_id).await;
        result
    }

    fn frames_dir(&self, job_id: &JobId) -> PathBuf {
        self.config.work_dir.join(job_id.short()).join("frames")
    }

    fn extractor(
        &self,
        job_id: &JobId,
        cancel: Arc<AtomicBool>,
    ) -> WorkerResult<(KeyframeExtractor, ArtifactStore)> {
        let store = match self.config.artifact_mode {
            ArtifactMode::Disk => ArtifactStore::disk(self.frames_dir(job_id))?,
            ArtifactMode::Memory => ArtifactStore::memory(),
        };
        let extractor = KeyframeExtractor::new(self.config.keyframes.clone(), store.clone())
            .with_cancel(cancel);
        Ok((extractor, store))
    }

    async fn with_timeout<F>(
        &self,
        job_id: &JobId,
        cancel: Arc<AtomicBool>,
        run: F,
    ) -> WorkerResult<ProcessingOutcome>
    where
        F: Future<Output = WorkerResult<ProcessingOutcome>>,
    {
        let logger = JobLogger::new(job_id, "workout_processing");
        logger.log_start("Processing workout video");

        let run = run.instrument(logger.create_span());
        match tokio::time::timeout(self.config.job_timeout, run).await {
            Ok(Ok(outcome)) => {
                logger.log_completion(&format!(
                    "{} keyframes, {} intervals, {} clips, {} skipped",
                    outcome.keyframes.len(),
                    outcome.intervals.len(),
                    outcome.clips.len(),
                    outcome.skipped.len()
                ));
                Ok(outcome)
            }
            Ok(Err(e)) => {
                logger.log_error(&e.to_string());
                Err(e)
            }
            Err(_) => {
                // Stops the blocking decode at its next frame
                cancel.store(true, Ordering::Relaxed);
                let secs = self.config.job_timeout.as_secs();
                logger.log_error(&format!("Timed out after {}s", secs));
                Err(WorkerError::Timeout(secs))
            }
        }
    }

    async fn label_and_cut(
        &self,
        job_id: &JobId,
        video: &Path,
        extraction: ExtractionOutcome,
        store: &ArtifactStore,
        transcript: &[TranscriptSegment],
    ) -> WorkerResult<ProcessingOutcome> {
        let logger = JobLogger::new(job_id, "labeling");
        let ExtractionOutcome {
            metadata,
            cuts,
            keyframes,
            stats,
        } = extraction;

        let mut outcome = ProcessingOutcome {
            job_id: job_id.clone(),
            video: video.to_path_buf(),
            cuts: cuts.len(),
            metadata,
            keyframes,
            labeler: None,
            intervals: Vec::new(),
            clips: Vec::new(),
            skipped: Vec::new(),
            stats,
            processed_at: Utc::now(),
        };

        if outcome.keyframes.is_empty() {
            logger.log_warning("No keyframes extracted, nothing to label");
            return Ok(outcome);
        }

        let duration = outcome.metadata.duration_s;
        let request = LabelerRequest::build(&outcome.keyframes, duration, transcript);
        logger.log_progress(&format!(
            "Labeling {} keyframes with {}",
            request.keyframes.len(),
            self.labeler.name()
        ));

        let (raw, labeler_name) = match self.labeler.label(&request).await {
            Ok(raw) => (raw, self.labeler.name().to_string()),
            Err(e) => {
                logger.log_warning(&format!(
                    "Labeler {} failed ({}), falling back to transcript keywords",
                    self.labeler.name(),
                    e
                ));
                let raw = self.fallback.label(&request).await?;
                (raw, self.fallback.name().to_string())
            }
        };
        outcome.labeler = Some(labeler_name);

        // Frames are only needed by the labeler
        if !self.config.keep_keyframes {
            for keyframe in &outcome.keyframes {
                store.release(&keyframe.artifact);
            }
        }

        let proposed = validate_intervals(raw);
        outcome.intervals = self.consolidator.consolidate(&proposed, duration);

        let cut_logger = logger.for_operation("clip_cutting");
        let results = self
            .clips
            .process_clips(&cut_logger, video, &outcome.intervals)
            .await?;
        outcome.clips = results.clips;
        outcome.skipped = results.skipped;

        Ok(outcome)
    }

    /// Remove the job's frame directory unless keyframes are kept.
    async fn cleanup(&self, job_id: &JobId) {
        if self.config.artifact_mode != ArtifactMode::Disk || self.config.keep_keyframes {
            return;
        }
        let job_dir = self.config.work_dir.join(job_id.short());
        if let Err(e) = tokio::fs::remove_dir_all(&job_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %job_dir.display(), error = %e, "Failed to remove job directory");
            }
        }
    }
}
