//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Labeler failed: {0}")]
    LabelerFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Media error: {0}")]
    Media(#[from] fitclip_media::MediaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn labeler_failed(msg: impl Into<String>) -> Self {
        Self::LabelerFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the source video itself is unusable.
    ///
    /// Retrying the same video cannot succeed for these.
    pub fn is_permanent_failure(&self) -> bool {
        match self {
            WorkerError::Media(e) => matches!(
                e,
                fitclip_media::MediaError::DecodeFailed(_)
                    | fitclip_media::MediaError::InvalidVideo(_)
                    | fitclip_media::MediaError::FileNotFound(_)
                    | fitclip_media::MediaError::FrameBudgetExceeded(_)
            ),
            WorkerError::ConfigError(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitclip_media::MediaError;

    #[test]
    fn test_permanent_failures() {
        let err: WorkerError = MediaError::decode_failed("bad header").into();
        assert!(err.is_permanent_failure());
        assert!(!WorkerError::labeler_failed("rate limited").is_permanent_failure());
        assert!(!WorkerError::Timeout(60).is_permanent_failure());
    }
}
