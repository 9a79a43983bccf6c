//! FFmpeg muxer
//!
//! Copies the video stream untouched and re-encodes audio at a fixed bitrate,
//! so merging a chunk costs little more than the audio encode.

use crate::export::types::{MergeRequest, MuxError, MuxSettings};
use crate::export::Muxer;
use crate::utils::paths::merged_name;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Build the ffmpeg argument list for one merge
pub fn build_merge_args(
    request: &MergeRequest,
    output: &Path,
    settings: &MuxSettings,
) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        request.video.to_string_lossy().to_string(),
        "-i".to_string(),
        request.audio.to_string_lossy().to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        settings.audio_codec.clone(),
        "-b:a".to_string(),
        settings.audio_bitrate.clone(),
        "-threads".to_string(),
        settings.threads.to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// Muxer backed by the ffmpeg command-line tool
pub struct FfmpegMuxer {
    settings: MuxSettings,
}

impl FfmpegMuxer {
    pub fn new(settings: MuxSettings) -> Self {
        Self { settings }
    }

    fn output_path(&self, request: &MergeRequest) -> PathBuf {
        self.settings.output_dir.join(merged_name(
            request.session_id,
            request.chunk_index,
            &request.start,
            &request.end,
            request.category.as_deref(),
            &self.settings.extension,
        ))
    }

    fn command(&self, args: &[String]) -> Command {
        match self.settings.niceness {
            Some(niceness) => {
                let mut command = Command::new("nice");
                command
                    .arg("-n")
                    .arg(niceness.to_string())
                    .arg(&self.settings.ffmpeg_path)
                    .args(args);
                command
            }
            None => {
                let mut command = Command::new(&self.settings.ffmpeg_path);
                command.args(args);
                command
            }
        }
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn merge(&self, request: &MergeRequest) -> Result<PathBuf, MuxError> {
        for input in [&request.video, &request.audio] {
            if !input.exists() {
                return Err(MuxError::MissingInput(input.clone()));
            }
        }

        std::fs::create_dir_all(&self.settings.output_dir)?;
        let output = self.output_path(request);
        let args = build_merge_args(request, &output, &self.settings);

        tracing::info!("Starting FFmpeg merge for chunk {}: {:?}", request.chunk_index, args);

        let result = self
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| MuxError::Ffmpeg(format!("Failed to start FFmpeg: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(MuxError::Ffmpeg(format!(
                "FFmpeg exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        for input in [&request.video, &request.audio] {
            if let Err(e) = std::fs::remove_file(input) {
                tracing::warn!("Failed to remove merged input {:?}: {}", input, e);
            }
        }

        tracing::info!("Merged chunk {} into {:?}", request.chunk_index, output);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use tempfile::tempdir;

    fn request(dir: &Path) -> MergeRequest {
        let video = dir.join("temp_vdo_16oct2026_100000_1.mp4");
        let audio = dir.join("temp_seg_audio.wav");
        std::fs::write(&video, b"video").unwrap();
        std::fs::write(&audio, b"audio").unwrap();
        let now = Local::now();
        MergeRequest {
            video,
            audio,
            session_id: 1,
            chunk_index: 1,
            start: now,
            end: now,
            category: None,
        }
    }

    fn settings(dir: &Path, ffmpeg: &str) -> MuxSettings {
        MuxSettings {
            ffmpeg_path: PathBuf::from(ffmpeg),
            output_dir: dir.join("Videos"),
            extension: "mp4".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            threads: 1,
            niceness: None,
        }
    }

    #[test]
    fn test_merge_args_copy_video_reencode_audio() {
        let dir = tempdir().unwrap();
        let req = request(dir.path());
        let args = build_merge_args(&req, Path::new("out.mp4"), &settings(dir.path(), "ffmpeg"));
        let joined = args.join(" ");
        assert!(joined.contains("-c:v copy"));
        assert!(joined.contains("-c:a aac -b:a 128k"));
        assert!(joined.contains("-threads 1"));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[tokio::test]
    async fn test_missing_input_is_rejected() {
        let dir = tempdir().unwrap();
        let req = request(dir.path());
        std::fs::remove_file(&req.audio).unwrap();
        let muxer = FfmpegMuxer::new(settings(dir.path(), "ffmpeg"));
        assert!(matches!(
            muxer.merge(&req).await,
            Err(MuxError::MissingInput(_))
        ));
        assert!(req.video.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_tool_preserves_inputs() {
        let dir = tempdir().unwrap();
        let req = request(dir.path());
        let muxer = FfmpegMuxer::new(settings(dir.path(), "false"));
        assert!(matches!(muxer.merge(&req).await, Err(MuxError::Ffmpeg(_))));
        assert!(req.video.exists());
        assert!(req.audio.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_tool_removes_inputs() {
        let dir = tempdir().unwrap();
        let req = request(dir.path());
        let muxer = FfmpegMuxer::new(settings(dir.path(), "true"));
        let merged = muxer.merge(&req).await.unwrap();
        assert!(!req.video.exists());
        assert!(!req.audio.exists());
        assert!(merged
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("merged_1_1_"));
    }
}
