//! Workout video processing worker.
//!
//! This crate provides:
//! - Configuration from `FITCLIP_*` environment variables
//! - The labeler boundary: request building, response parsing and validation
//! - Segment consolidation of labeled exercise intervals
//! - Clip cutting with per-clip failure containment
//! - The per-video processor tying the stages together

pub mod clip_pipeline;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod labeler;
pub mod logging;
pub mod processor;
pub mod transcript;

pub use clip_pipeline::{ClipLimits, ClipPipeline, ClipProcessingResults, SkipReason, SkippedClip};
pub use config::{ArtifactMode, WorkerConfig};
pub use consolidation::{ConsolidationConfig, SegmentConsolidator};
pub use error::{WorkerError, WorkerResult};
pub use labeler::{
    parse_labeler_response, validate_intervals, ExerciseLabeler, JsonFileLabeler,
    KeywordFallbackLabeler, LabelerRequest, RawExerciseInterval,
};
pub use logging::JobLogger;
pub use processor::{ProcessingOutcome, WorkoutProcessor};
pub use transcript::load_transcript;
