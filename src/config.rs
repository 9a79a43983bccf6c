//! Segmenter configuration
//!
//! Every field has a default tuned for a small single-board capture device,
//! so a partial JSON file only needs to name what it overrides.

use crate::utils::{SegmentError, SegmentResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Capture device settings consumed by the ffmpeg-backed drivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureDeviceConfig {
    /// ffmpeg demuxer for the camera (`v4l2`, `avfoundation`, ...)
    pub video_input_format: String,
    pub video_input_device: String,
    /// Hardware encoders (`h264_v4l2m2m`) keep CPU load down on small boards
    pub video_codec: String,
    pub audio_input_format: String,
    pub audio_input_device: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    /// How long ffmpeg gets to exit after `q` before it is killed
    pub stop_timeout_ms: u64,
}

impl Default for CaptureDeviceConfig {
    fn default() -> Self {
        Self {
            video_input_format: "v4l2".to_string(),
            video_input_device: "/dev/video0".to_string(),
            video_codec: "libx264".to_string(),
            audio_input_format: "alsa".to_string(),
            audio_input_device: "default".to_string(),
            audio_sample_rate: 16_000,
            audio_channels: 1,
            stop_timeout_ms: 5_000,
        }
    }
}

/// Configuration for a segmentation controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmenterConfig {
    /// Directory holding `Videos/` and `Audios/`
    pub base_dir: PathBuf,

    /// Rollover once the growing video file reaches this size
    pub rollover_threshold_bytes: u64,

    /// Size poll interval
    pub monitor_interval_ms: u64,

    /// Pause after stopping the encoder before the file is inspected
    pub encoder_grace_ms: u64,

    /// Readiness wait for each audio+video chunk
    pub ready_wait_ms: u64,
    pub ready_step_ms: u64,

    /// Readiness wait for the closing video-only chunk
    pub final_ready_wait_ms: u64,
    pub final_ready_step_ms: u64,

    /// Upper bound on how long `stop` waits for the worker
    pub join_timeout_ms: u64,

    pub video_bitrate: u32,
    pub target_fps: u32,
    pub video_extension: String,
    pub audio_extension: String,

    pub ffmpeg_path: PathBuf,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub merge_threads: u32,

    /// Run the merge under `nice -n <value>` when set
    pub merge_niceness: Option<i32>,

    pub capture: CaptureDeviceConfig,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            rollover_threshold_bytes: 30 * 1024 * 1024,
            monitor_interval_ms: 2_000,
            encoder_grace_ms: 2_000,
            ready_wait_ms: 15_000,
            ready_step_ms: 300,
            final_ready_wait_ms: 10_000,
            final_ready_step_ms: 200,
            join_timeout_ms: 60_000,
            video_bitrate: 2_500_000,
            target_fps: 30,
            video_extension: "mp4".to_string(),
            audio_extension: "wav".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            merge_threads: 1,
            merge_niceness: None,
            capture: CaptureDeviceConfig::default(),
        }
    }
}

impl SegmenterConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn encoder_grace(&self) -> Duration {
        Duration::from_millis(self.encoder_grace_ms)
    }

    pub fn ready_wait(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.ready_wait_ms),
            Duration::from_millis(self.ready_step_ms),
        )
    }

    pub fn final_ready_wait(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.final_ready_wait_ms),
            Duration::from_millis(self.final_ready_step_ms),
        )
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Reject values that would make the polling loops spin or never roll over
    pub fn validate(&self) -> SegmentResult<()> {
        if self.rollover_threshold_bytes == 0 {
            return Err(SegmentError::Config(
                "rolloverThresholdBytes must be greater than zero".to_string(),
            ));
        }
        let intervals = [
            ("monitorIntervalMs", self.monitor_interval_ms),
            ("readyStepMs", self.ready_step_ms),
            ("finalReadyStepMs", self.final_ready_step_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(SegmentError::Config(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if self.video_extension.is_empty() || self.audio_extension.is_empty() {
            return Err(SegmentError::Config(
                "file extensions must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from disk, falling back to defaults when the file is absent
pub fn load_config(path: &Path) -> SegmentResult<SegmenterConfig> {
    if !path.exists() {
        tracing::info!("No segmenter config at {:?}, using defaults", path);
        return Ok(SegmenterConfig::default());
    }

    let contents = std::fs::read_to_string(path)?;
    let config: SegmenterConfig = serde_json::from_str(&contents)
        .map_err(|e| SegmentError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
    config.validate()?;

    tracing::info!("Loaded segmenter config from {:?}", path);
    Ok(config)
}

/// Save configuration to disk
pub fn save_config(path: &Path, config: &SegmenterConfig) -> SegmentResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| SegmentError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;

    tracing::info!("Saved segmenter config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let config = SegmenterConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: SegmenterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segcap.json");
        std::fs::write(
            &path,
            r#"{ "rolloverThresholdBytes": 1024, "capture": { "videoCodec": "h264_v4l2m2m" } }"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.rollover_threshold_bytes, 1024);
        assert_eq!(config.capture.video_codec, "h264_v4l2m2m");
        assert_eq!(config.capture.audio_sample_rate, 16_000);
        assert_eq!(config.monitor_interval_ms, 2_000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, SegmenterConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("segcap.json");
        let config = SegmenterConfig {
            merge_niceness: Some(10),
            ..SegmenterConfig::default()
        };
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_zero_step() {
        let config = SegmenterConfig {
            ready_step_ms: 0,
            ..SegmenterConfig::default()
        };
        assert!(matches!(config.validate(), Err(SegmentError::Config(_))));

        let config = SegmenterConfig {
            rollover_threshold_bytes: 0,
            ..SegmenterConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
