//! Chunk muxing
//!
//! Combines a chunk's separately captured video and audio into one
//! deliverable file.

pub mod ffmpeg;
pub mod types;

use async_trait::async_trait;
use std::path::PathBuf;

pub use ffmpeg::{build_merge_args, FfmpegMuxer};
pub use types::{MergeRequest, MuxError, MuxSettings};

/// Combines one video file and one audio file
///
/// On success both inputs are gone and the merged path is returned. On
/// failure the inputs are left where they were.
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn merge(&self, request: &MergeRequest) -> Result<PathBuf, MuxError>;
}
