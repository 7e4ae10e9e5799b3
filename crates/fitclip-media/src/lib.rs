//! Frame analysis and FFmpeg plumbing for workout videos.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with progress, timeout and cancellation
//! - FFprobe metadata (duration, frame rate, frame count)
//! - Frame sources over FFmpeg rawvideo or in-memory images
//! - The keyframe pipeline: cut detection, segment sampling, change scoring,
//!   selection, rate normalization and sparse-second backfill
//! - Exercise clip cutting

pub mod clip;
pub mod command;
pub mod error;
pub mod frames;
pub mod keyframes;
pub mod probe;
pub mod progress;

pub use clip::{slug, ClipEncoder, ClipOutput, ClipRequest, FfmpegClipEncoder};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{DecodeBudget, FfmpegFrameSource, Frame, FrameSource, MemoryFrameSource};
pub use keyframes::{
    ArtifactRef, ArtifactStore, ExtractionOutcome, ExtractionStats, KeyframeConfig,
    KeyframeExtractor, Keyframe, SelectionPolicy,
};
pub use probe::{probe_video, VideoMetadata};
pub use progress::FfmpegProgress;
