//! Capture trait definitions
//!
//! The hardware side of a session: a video encoder that writes one file at a
//! time, and an audio recorder that produces one bounded file per chunk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by capture drivers
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Encoder settings passed on every capture start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderSettings {
    /// Target bitrate in bits per second
    pub bitrate: u32,
    pub target_fps: u32,
}

/// Hardware video encoder writing to one target file at a time
///
/// `stop` must tolerate being called when nothing is running; the controller
/// treats stop failures as non-fatal.
#[async_trait]
pub trait CaptureDriver: Send {
    async fn start(&mut self, target: &Path, settings: &EncoderSettings) -> CaptureResult<()>;

    async fn stop(&mut self) -> CaptureResult<()>;
}

/// Bounded audio capture for one chunk
#[async_trait]
pub trait AudioSegmentRecorder: Send {
    async fn start(&mut self) -> CaptureResult<()>;

    /// Stop and return the path of the finished audio file
    async fn stop(&mut self) -> CaptureResult<PathBuf>;
}
