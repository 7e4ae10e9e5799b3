//! Shared data models for the FitClip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Scene cuts detected in a source video
//! - Exercise intervals proposed by the labeler and their consolidated form
//! - Transcript segments
//! - Clip encoding configuration
//! - Job identifiers

pub mod cut;
pub mod encoding;
pub mod interval;
pub mod job;
pub mod transcript;

// Re-export common types
pub use cut::CutMark;
pub use encoding::EncodingConfig;
pub use interval::{
    overlap_ratio, overlap_secs, ConsolidatedInterval, ExerciseInterval, IntervalError,
};
pub use job::JobId;
pub use transcript::{transcript_covers_video, TranscriptSegment};
