//! Mux types and configuration
//!
//! Inputs, settings and errors for combining one video chunk with its audio.

use crate::config::SegmenterConfig;
use crate::utils::paths::VIDEOS_DIR;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// One chunk's video and audio, to be combined into a single file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub session_id: u32,
    pub chunk_index: u32,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    /// Category tag; unknown until the session stops, so usually `None`
    pub category: Option<String>,
}

/// How the merge tool is invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuxSettings {
    pub ffmpeg_path: PathBuf,
    /// Where merged files are written
    pub output_dir: PathBuf,
    pub extension: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub threads: u32,
    pub niceness: Option<i32>,
}

impl MuxSettings {
    pub fn from_config(config: &SegmenterConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            output_dir: config.base_dir.join(VIDEOS_DIR),
            extension: config.video_extension.clone(),
            audio_codec: config.audio_codec.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
            threads: config.merge_threads,
            niceness: config.merge_niceness,
        }
    }
}

/// Mux errors
#[derive(Error, Debug)]
pub enum MuxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Input not found: {0:?}")]
    MissingInput(PathBuf),
}
