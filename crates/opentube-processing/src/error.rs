use opentube_core::AppError;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("ffprobe failed: {0}")]
    Probe(String),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Invalid video dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Could not parse duration: {0}")]
    InvalidDuration(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited with {status}: {stderr_tail}")]
    EncoderFailed {
        status: ExitStatus,
        stderr_tail: String,
    },

    #[error("Frame extraction produced no image")]
    EmptySnapshot,

    #[error("Invalid tool path: {0}")]
    InvalidToolPath(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Canceled => AppError::Canceled,
            other => AppError::Processing(other.to_string()),
        }
    }
}
