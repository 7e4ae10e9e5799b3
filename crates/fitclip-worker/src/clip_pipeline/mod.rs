use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fitclip_media::{ClipEncoder, ClipOutput};
use fitclip_models::ConsolidatedInterval;

use crate::error::WorkerResult;
use crate::logging::JobLogger;

pub mod clip;
pub mod tasks;

pub use clip::process_single_clip;
pub use tasks::{generate_clip_tasks, plan_clip, ClipLimits, SkipReason, SkippedClip};

/// Clips written and intervals skipped for one job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClipProcessingResults {
    pub clips: Vec<ClipOutput>,
    pub skipped: Vec<SkippedClip>,
}

/// Turns consolidated intervals into clip files.
#[derive(Clone)]
pub struct ClipPipeline {
    encoder: Arc<dyn ClipEncoder>,
    limits: ClipLimits,
    clips_dir: PathBuf,
}

impl ClipPipeline {
    pub fn new(encoder: Arc<dyn ClipEncoder>, limits: ClipLimits, clips_dir: impl Into<PathBuf>) -> Self {
        Self {
            encoder,
            limits,
            clips_dir: clips_dir.into(),
        }
    }

    pub fn clips_dir(&self) -> &Path {
        &self.clips_dir
    }

    /// Cut every acceptable interval out of `source`, one at a time.
    ///
    /// Rejected intervals and failed encodes are reported in `skipped`;
    /// only failing to create the output directory is an error.
    pub async fn process_clips(
        &self,
        logger: &JobLogger,
        source: &Path,
        intervals: &[ConsolidatedInterval],
    ) -> WorkerResult<ClipProcessingResults> {
        let (requests, mut skipped) = generate_clip_tasks(intervals, &self.limits);

        logger.log_progress(&format!(
            "Cutting {} clips from {} intervals ({} rejected)",
            requests.len(),
            intervals.len(),
            skipped.len()
        ));

        let mut clips = Vec::with_capacity(requests.len());
        if !requests.is_empty() {
            tokio::fs::create_dir_all(&self.clips_dir).await?;
        }

        for request in &requests {
            match process_single_clip(self.encoder.as_ref(), source, &self.clips_dir, request).await {
                Ok(output) => clips.push(output),
                Err(reason) => skipped.push(SkippedClip {
                    name: request.name.clone(),
                    start_time: request.start_s,
                    end_time: request.end_s,
                    reason,
                }),
            }
        }

        metrics::counter!("fitclip_clips_produced_total").increment(clips.len() as u64);
        for skip in &skipped {
            metrics::counter!("fitclip_clips_skipped_total", "reason" => skip.reason.label())
                .increment(1);
        }

        if !skipped.is_empty() {
            logger.log_warning(&format!("{} intervals produced no clip", skipped.len()));
        }

        Ok(ClipProcessingResults { clips, skipped })
    }
}
