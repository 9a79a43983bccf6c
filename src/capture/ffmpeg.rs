//! ffmpeg-backed capture drivers
//!
//! Video and audio are captured by separate ffmpeg processes reading straight
//! from the device. Stopping writes `q` to ffmpeg's stdin so the container is
//! finalized; a process that ignores it is killed after the stop timeout.

use crate::capture::traits::{
    AudioSegmentRecorder, CaptureDriver, CaptureError, CaptureResult, EncoderSettings,
};
use crate::config::{CaptureDeviceConfig, SegmenterConfig};
use crate::utils::paths::{file_stamp, temp_segment_audio_name, AUDIOS_DIR};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// A device that cannot be opened makes ffmpeg exit within this window
const STARTUP_PROBE: Duration = Duration::from_millis(300);

const STDERR_HINT_LIMIT: usize = 32;

/// Build the argument list for one video chunk
pub fn capture_args(
    device: &CaptureDeviceConfig,
    target: &Path,
    settings: &EncoderSettings,
) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        device.video_input_format.clone(),
        "-framerate".to_string(),
        settings.target_fps.to_string(),
        "-i".to_string(),
        device.video_input_device.clone(),
        "-c:v".to_string(),
        device.video_codec.clone(),
        "-b:v".to_string(),
        settings.bitrate.to_string(),
        "-r".to_string(),
        settings.target_fps.to_string(),
        "-an".to_string(),
        target.to_string_lossy().to_string(),
    ]
}

/// Build the argument list for one audio chunk
pub fn audio_capture_args(device: &CaptureDeviceConfig, target: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        device.audio_input_format.clone(),
        "-ac".to_string(),
        device.audio_channels.to_string(),
        "-ar".to_string(),
        device.audio_sample_rate.to_string(),
        "-i".to_string(),
        device.audio_input_device.clone(),
        target.to_string_lossy().to_string(),
    ]
}

/// A running ffmpeg capture process
struct FfmpegProcess {
    child: Child,
    stderr_hints: Arc<Mutex<Vec<String>>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl FfmpegProcess {
    async fn spawn(ffmpeg: &Path, args: &[String]) -> CaptureResult<Self> {
        tracing::info!("Starting ffmpeg capture: {:?}", args);

        let mut child = Command::new(ffmpeg)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Device(format!("Failed to start ffmpeg: {}", e)))?;

        let stderr_hints: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let hints = Arc::clone(&stderr_hints);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            let trimmed = line.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            tracing::debug!("ffmpeg: {}", trimmed);
                            let mut guard = hints.lock();
                            if guard.len() < STDERR_HINT_LIMIT {
                                guard.push(trimmed.to_string());
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!("Failed to read ffmpeg stderr: {}", e);
                            break;
                        }
                    }
                }
            })
        });

        let mut process = Self {
            child,
            stderr_hints,
            stderr_task,
        };

        tokio::time::sleep(STARTUP_PROBE).await;
        if let Some(status) = process.child.try_wait()? {
            let hints = process.collect_hints().await;
            return Err(CaptureError::Device(format!(
                "ffmpeg exited during startup with {}: {}",
                status, hints
            )));
        }

        Ok(process)
    }

    async fn collect_hints(&mut self) -> String {
        if let Some(task) = self.stderr_task.take() {
            let _ = task.await;
        }
        self.stderr_hints.lock().join("; ")
    }

    async fn stop(mut self, timeout: Duration) -> CaptureResult<ExitStatus> {
        if let Some(mut stdin) = self.child.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").await {
                tracing::debug!("Could not send quit to ffmpeg: {}", e);
            }
            let _ = stdin.flush().await;
        }

        let status = match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                tracing::warn!("ffmpeg did not exit within {:?}, killing it", timeout);
                self.child.kill().await?;
                self.child.wait().await?
            }
        };

        let hints = self.collect_hints().await;
        if !status.success() {
            tracing::warn!("ffmpeg exited with {}: {}", status, hints);
        }

        Ok(status)
    }
}

/// Video capture driver that records one chunk per ffmpeg process
pub struct FfmpegCaptureDriver {
    ffmpeg: PathBuf,
    device: CaptureDeviceConfig,
    process: Option<FfmpegProcess>,
}

impl FfmpegCaptureDriver {
    pub fn new(ffmpeg: PathBuf, device: CaptureDeviceConfig) -> Self {
        Self {
            ffmpeg,
            device,
            process: None,
        }
    }

    pub fn from_config(config: &SegmenterConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.capture.clone())
    }
}

#[async_trait]
impl CaptureDriver for FfmpegCaptureDriver {
    async fn start(&mut self, target: &Path, settings: &EncoderSettings) -> CaptureResult<()> {
        if self.process.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let args = capture_args(&self.device, target, settings);
        self.process = Some(FfmpegProcess::spawn(&self.ffmpeg, &args).await?);

        tracing::info!(
            "Video capture started: {:?} @ {}bps, {}fps",
            target,
            settings.bitrate,
            settings.target_fps
        );
        Ok(())
    }

    async fn stop(&mut self) -> CaptureResult<()> {
        let process = self.process.take().ok_or(CaptureError::NotRecording)?;
        let timeout = Duration::from_millis(self.device.stop_timeout_ms);
        process.stop(timeout).await?;
        tracing::info!("Video capture stopped");
        Ok(())
    }
}

/// Audio recorder writing `Audios/temp_seg_audio.<ext>` for each chunk
///
/// On stop the file is renamed to `audio_seg_<start>_to_<end>.<ext>`; if the
/// rename fails the temp path is returned instead.
pub struct FfmpegAudioRecorder {
    ffmpeg: PathBuf,
    device: CaptureDeviceConfig,
    audios_dir: PathBuf,
    extension: String,
    process: Option<FfmpegProcess>,
    started_at: Option<DateTime<Local>>,
}

impl FfmpegAudioRecorder {
    pub fn new(
        ffmpeg: PathBuf,
        device: CaptureDeviceConfig,
        audios_dir: PathBuf,
        extension: String,
    ) -> Self {
        Self {
            ffmpeg,
            device,
            audios_dir,
            extension,
            process: None,
            started_at: None,
        }
    }

    pub fn from_config(config: &SegmenterConfig) -> Self {
        Self::new(
            config.ffmpeg_path.clone(),
            config.capture.clone(),
            config.base_dir.join(AUDIOS_DIR),
            config.audio_extension.clone(),
        )
    }

    fn temp_path(&self) -> PathBuf {
        self.audios_dir.join(temp_segment_audio_name(&self.extension))
    }
}

#[async_trait]
impl AudioSegmentRecorder for FfmpegAudioRecorder {
    async fn start(&mut self) -> CaptureResult<()> {
        if self.process.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        std::fs::create_dir_all(&self.audios_dir)?;
        let target = self.temp_path();
        let args = audio_capture_args(&self.device, &target);
        self.process = Some(FfmpegProcess::spawn(&self.ffmpeg, &args).await?);
        self.started_at = Some(Local::now());

        tracing::info!("Segment audio capture started: {:?}", target);
        Ok(())
    }

    async fn stop(&mut self) -> CaptureResult<PathBuf> {
        let process = self.process.take().ok_or(CaptureError::NotRecording)?;
        process
            .stop(Duration::from_millis(self.device.stop_timeout_ms))
            .await?;

        let start = self.started_at.take().unwrap_or_else(Local::now);
        let end = Local::now();
        let temp = self.temp_path();
        let final_path = self.audios_dir.join(format!(
            "audio_seg_{}_to_{}.{}",
            file_stamp(&start),
            file_stamp(&end),
            self.extension
        ));

        match std::fs::rename(&temp, &final_path) {
            Ok(()) => Ok(final_path),
            Err(e) => {
                tracing::warn!("Error renaming segment audio {:?}: {}", temp, e);
                Ok(temp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_args_carry_encoder_settings() {
        let device = CaptureDeviceConfig::default();
        let settings = EncoderSettings {
            bitrate: 2_500_000,
            target_fps: 20,
        };
        let args = capture_args(&device, Path::new("Videos/temp_vdo_x_1.mp4"), &settings);

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-b:v") + 1], "2500000");
        assert_eq!(args[pos("-framerate") + 1], "20");
        assert_eq!(args[pos("-i") + 1], "/dev/video0");
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "Videos/temp_vdo_x_1.mp4");
    }

    #[test]
    fn test_audio_args_are_mono_16k() {
        let device = CaptureDeviceConfig::default();
        let args = audio_capture_args(&device, Path::new("Audios/temp_seg_audio.wav"));
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-ac") + 1], "1");
        assert_eq!(args[pos("-ar") + 1], "16000");
        assert_eq!(args[pos("-f") + 1], "alsa");
    }

    #[tokio::test]
    async fn test_stop_without_start_is_reported() {
        let mut driver = FfmpegCaptureDriver::from_config(&SegmenterConfig::default());
        assert!(matches!(driver.stop().await, Err(CaptureError::NotRecording)));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_start() {
        let mut driver = FfmpegCaptureDriver::new(
            PathBuf::from("/nonexistent/ffmpeg-binary"),
            CaptureDeviceConfig::default(),
        );
        let settings = EncoderSettings {
            bitrate: 1_000_000,
            target_fps: 30,
        };
        let result = driver.start(Path::new("out.mp4"), &settings).await;
        assert!(matches!(result, Err(CaptureError::Device(_))));
    }

    #[test]
    fn test_audio_temp_path_uses_reusable_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = SegmenterConfig {
            base_dir: dir.path().to_path_buf(),
            ..SegmenterConfig::default()
        };
        let recorder = FfmpegAudioRecorder::from_config(&config);
        assert_eq!(
            recorder.temp_path(),
            dir.path().join("Audios").join("temp_seg_audio.wav")
        );
    }
}
