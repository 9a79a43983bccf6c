//! Error types and handling
//!
//! Failure taxonomy shared by the segmentation engine. Only `EncoderStart`
//! ends a session; every other variant is isolated to the chunk it occurred in.

use crate::export::MuxError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoder rejected start for {path:?}: {message}")]
    EncoderStart { path: PathBuf, message: String },

    #[error("Encoder stop failed for chunk {chunk}: {message}")]
    EncoderStop { chunk: u32, message: String },

    #[error("File {path:?} not ready after {waited:?}")]
    FileNotReady { path: PathBuf, waited: Duration },

    #[error("Merge failed for chunk {chunk}: {source}")]
    Merge {
        chunk: u32,
        #[source]
        source: MuxError,
    },

    #[error("Rename {from:?} -> {to:?} failed: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Segmentation worker did not finish within {0:?}")]
    StopTimeout(Duration),

    #[error("Segmentation worker failed: {0}")]
    Worker(String),
}

impl SegmentError {
    /// Stable machine-readable code, used in emitted events
    pub fn code(&self) -> &'static str {
        match self {
            SegmentError::Io(_) => "IO_ERROR",
            SegmentError::Config(_) => "CONFIG_ERROR",
            SegmentError::EncoderStart { .. } => "ENCODER_START_FAILURE",
            SegmentError::EncoderStop { .. } => "ENCODER_STOP_FAILURE",
            SegmentError::FileNotReady { .. } => "FILE_NOT_READY_TIMEOUT",
            SegmentError::Merge { .. } => "MERGE_FAILURE",
            SegmentError::Rename { .. } => "RENAME_FAILURE",
            SegmentError::StopTimeout(_) => "STOP_TIMEOUT",
            SegmentError::Worker(_) => "WORKER_FAILURE",
        }
    }

    /// Whether this failure ends the whole session
    pub fn is_fatal(&self) -> bool {
        matches!(self, SegmentError::EncoderStart { .. })
    }
}

/// Result type alias using SegmentError
pub type SegmentResult<T> = Result<T, SegmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_encoder_start_is_fatal() {
        let start = SegmentError::EncoderStart {
            path: PathBuf::from("Videos/temp_vdo.mp4"),
            message: "device busy".to_string(),
        };
        let stop = SegmentError::EncoderStop {
            chunk: 2,
            message: "already stopped".to_string(),
        };
        assert!(start.is_fatal());
        assert!(!stop.is_fatal());
        assert_eq!(start.code(), "ENCODER_START_FAILURE");
        assert_eq!(stop.code(), "ENCODER_STOP_FAILURE");
    }

    #[test]
    fn merge_error_keeps_source() {
        let err = SegmentError::Merge {
            chunk: 3,
            source: MuxError::Ffmpeg("exit status 1".to_string()),
        };
        assert!(err.to_string().contains("chunk 3"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
