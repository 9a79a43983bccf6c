//! Session worker
//!
//! One task per active session. The worker owns the capture drivers and the
//! ledger for the life of the session and hands all of them back to the
//! controller when it exits.
//!
//! Stop is cooperative: the cancellation token is observed at the next poll
//! tick, and the worker always finishes the chunk in flight (stop the
//! encoders, wait for the file, merge or demote, record it) before it returns.
//! A started chunk is never abandoned.

use super::coordinator::SegmentEvent;
use super::ledger::{SegmentKind, SegmentLedger};
use super::monitor::{recover_latest, wait_until_ready, MonitorSignal, SegmentMonitor};
use super::state::{RecordingMode, RecordingSession};
use crate::capture::{AudioSegmentRecorder, CaptureDriver, EncoderSettings};
use crate::config::SegmenterConfig;
use crate::export::{MergeRequest, Muxer};
use crate::utils::paths::{clock_stamp, temp_video_name};
use crate::utils::{MediaDirs, SegmentError, SegmentResult};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

/// Slack applied to the recovery scan floor for coarse filesystem mtimes
const RECOVERY_MTIME_SLACK: Duration = Duration::from_secs(1);

/// What the worker hands back when it exits
pub struct WorkerOutcome {
    pub ledger: SegmentLedger,
    pub capture: Box<dyn CaptureDriver>,
    pub audio: Option<Box<dyn AudioSegmentRecorder>>,
}

/// Drives the segmentation loop for one session
pub struct SessionWorker {
    session: RecordingSession,
    config: SegmenterConfig,
    dirs: MediaDirs,
    monitor: SegmentMonitor,
    capture: Box<dyn CaptureDriver>,
    audio: Option<Box<dyn AudioSegmentRecorder>>,
    muxer: Arc<dyn Muxer>,
    cancel: CancellationToken,
    events: broadcast::Sender<SegmentEvent>,
    ledger: SegmentLedger,
}

impl SessionWorker {
    pub fn new(
        session: RecordingSession,
        config: SegmenterConfig,
        capture: Box<dyn CaptureDriver>,
        audio: Option<Box<dyn AudioSegmentRecorder>>,
        muxer: Arc<dyn Muxer>,
        cancel: CancellationToken,
        events: broadcast::Sender<SegmentEvent>,
    ) -> Self {
        let dirs = MediaDirs::new(&config.base_dir);
        let monitor = SegmentMonitor::new(session.rollover_threshold_bytes, config.monitor_interval());
        let ledger = SegmentLedger::new(session.session_id, session.started_at);
        Self {
            session,
            config,
            dirs,
            monitor,
            capture,
            audio,
            muxer,
            cancel,
            events,
            ledger,
        }
    }

    /// Run until stopped or until an encoder refuses to start
    ///
    /// `ready` resolves once the first chunk is recording, or with the
    /// start failure if it never does.
    pub async fn run(mut self, ready: oneshot::Sender<SegmentResult<()>>) -> WorkerOutcome {
        tracing::info!(
            session = self.session.session_id,
            mode = ?self.session.mode,
            threshold = self.session.rollover_threshold_bytes,
            "Segmentation worker started"
        );

        let mut ready = Some(ready);
        match self.session.mode {
            RecordingMode::VideoOnly => self.run_video_only(&mut ready).await,
            RecordingMode::AudioVideo => self.run_audio_video(&mut ready).await,
        }

        tracing::info!(
            session = self.session.session_id,
            chunks = self.ledger.len(),
            lost = self.ledger.lost_count(),
            "Segmentation worker finished"
        );

        WorkerOutcome {
            ledger: self.ledger,
            capture: self.capture,
            audio: self.audio,
        }
    }

    fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            bitrate: self.config.video_bitrate,
            target_fps: self.config.target_fps,
        }
    }

    fn next_target(&self, chunk: u32) -> PathBuf {
        self.dirs.videos.join(temp_video_name(
            &Local::now(),
            chunk,
            &self.config.video_extension,
        ))
    }

    async fn run_video_only(&mut self, ready: &mut Option<oneshot::Sender<SegmentResult<()>>>) {
        let settings = self.encoder_settings();
        let mut chunk = 1u32;

        loop {
            let target = self.next_target(chunk);
            if let Err(e) = self.capture.start(&target, &settings).await {
                self.abort(
                    SegmentError::EncoderStart {
                        path: target,
                        message: e.to_string(),
                    },
                    ready.take(),
                );
                return;
            }
            signal_ready(ready);
            tracing::info!(session = self.session.session_id, chunk, path = %target.display(), "Chunk started");

            match self.monitor.watch(&target, &self.cancel).await {
                MonitorSignal::Rollover(_) => {
                    self.stop_capture(chunk).await;
                    let end = Local::now();
                    self.close_chunk(chunk, target, SegmentKind::RawVideoOnly, end);
                }
                MonitorSignal::Stopped => {
                    self.stop_capture(chunk).await;
                    let end = Local::now();
                    let (timeout, step) = self.config.final_ready_wait();
                    match wait_until_ready(&target, timeout, step).await {
                        Some(_) => self.close_chunk(chunk, target, SegmentKind::RawVideoOnly, end),
                        None => self.lose_chunk(chunk, target, end, timeout),
                    }
                    return;
                }
            }

            chunk += 1;
            if self.cancel.is_cancelled() {
                return;
            }
        }
    }

    async fn run_audio_video(&mut self, ready: &mut Option<oneshot::Sender<SegmentResult<()>>>) {
        let settings = self.encoder_settings();
        let mut chunk = 1u32;

        loop {
            let target = self.next_target(chunk);
            let scan_floor = SystemTime::now()
                .checked_sub(RECOVERY_MTIME_SLACK)
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let capture = &mut self.capture;
            let audio = self.audio.as_deref_mut();
            let audio_start = async move {
                match audio {
                    Some(recorder) => Some(recorder.start().await),
                    None => None,
                }
            };
            let (video_started, audio_started) =
                tokio::join!(capture.start(&target, &settings), audio_start);

            let audio_active = match audio_started {
                Some(Ok(())) => true,
                Some(Err(e)) => {
                    if video_started.is_ok() {
                        tracing::warn!(
                            session = self.session.session_id,
                            chunk,
                            "Audio capture failed to start, chunk will be video only: {}",
                            e
                        );
                        self.emit_error("AUDIO_START_FAILURE", e.to_string());
                    }
                    false
                }
                None => false,
            };

            if let Err(e) = video_started {
                if audio_active {
                    if let Some(recorder) = self.audio.as_mut() {
                        match recorder.stop().await {
                            Ok(path) => discard_file(&path),
                            Err(e) => tracing::warn!("Audio stop after failed video start: {}", e),
                        }
                    }
                }
                self.abort(
                    SegmentError::EncoderStart {
                        path: target,
                        message: e.to_string(),
                    },
                    ready.take(),
                );
                return;
            }
            signal_ready(ready);
            tracing::info!(
                session = self.session.session_id,
                chunk,
                path = %target.display(),
                audio = audio_active,
                "Chunk started"
            );

            let signal = self.monitor.watch(&target, &self.cancel).await;

            // Video first, then audio
            self.stop_capture(chunk).await;
            let end = Local::now();
            let audio_path = if audio_active {
                self.stop_audio(chunk).await
            } else {
                None
            };

            tokio::time::sleep(self.config.encoder_grace()).await;

            let video = self.await_video(chunk, &target, scan_floor).await;
            match video {
                None => {
                    let (timeout, _) = self.config.ready_wait();
                    if let Some(audio) = audio_path {
                        tracing::warn!(chunk, "Keeping orphaned audio {:?}", audio);
                    }
                    self.lose_chunk(chunk, target, end, timeout);
                }
                Some(video) => match audio_path {
                    Some(audio) => self.merge_chunk(chunk, video, audio, end).await,
                    None => self.close_chunk(chunk, video, SegmentKind::RawVideoOnly, end),
                },
            }

            chunk += 1;
            if signal == MonitorSignal::Stopped || self.cancel.is_cancelled() {
                return;
            }
        }
    }

    /// Readiness wait, then directory-scan recovery
    async fn await_video(&mut self, chunk: u32, target: &Path, scan_floor: SystemTime) -> Option<PathBuf> {
        let (timeout, step) = self.config.ready_wait();
        if wait_until_ready(target, timeout, step).await.is_some() {
            return Some(target.to_path_buf());
        }

        let err = SegmentError::FileNotReady {
            path: target.to_path_buf(),
            waited: timeout,
        };
        tracing::warn!(session = self.session.session_id, chunk, code = err.code(), "{}, scanning for a recoverable file", err);

        let ledger = &self.ledger;
        let recovered = recover_latest(
            &self.dirs.videos,
            &self.config.video_extension,
            scan_floor,
            |p| p == target || ledger.claims(p),
        );
        if let Some(path) = &recovered {
            tracing::info!(session = self.session.session_id, chunk, path = %path.display(), "Recovered chunk file");
        }
        recovered
    }

    async fn merge_chunk(&mut self, chunk: u32, video: PathBuf, audio: PathBuf, end: DateTime<Local>) {
        let request = MergeRequest {
            video: video.clone(),
            audio,
            session_id: self.session.session_id,
            chunk_index: chunk,
            start: self.ledger.cursor(),
            end,
            category: None,
        };

        match self.muxer.merge(&request).await {
            Ok(merged) => self.close_chunk(chunk, merged, SegmentKind::Merged, end),
            Err(source) => {
                let err = SegmentError::Merge { chunk, source };
                tracing::warn!(
                    session = self.session.session_id,
                    chunk,
                    path = %video.display(),
                    code = err.code(),
                    "{}, keeping raw video",
                    err
                );
                self.emit_error(err.code(), err.to_string());
                self.close_chunk(chunk, video, SegmentKind::RawVideoOnly, end);
            }
        }
    }

    async fn stop_capture(&mut self, chunk: u32) {
        if let Err(e) = self.capture.stop().await {
            let err = SegmentError::EncoderStop {
                chunk,
                message: e.to_string(),
            };
            tracing::warn!(session = self.session.session_id, chunk, code = err.code(), "{}", err);
            self.emit_error(err.code(), err.to_string());
        }
    }

    async fn stop_audio(&mut self, chunk: u32) -> Option<PathBuf> {
        let recorder = self.audio.as_mut()?;
        match recorder.stop().await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(
                    session = self.session.session_id,
                    chunk,
                    "Audio capture failed to stop, chunk will be video only: {}",
                    e
                );
                self.emit_error("AUDIO_STOP_FAILURE", e.to_string());
                None
            }
        }
    }

    fn close_chunk(&mut self, chunk: u32, path: PathBuf, kind: SegmentKind, end: DateTime<Local>) {
        let segment = self.ledger.record(chunk, path, kind, end);
        tracing::info!(
            session = self.session.session_id,
            chunk,
            kind = ?kind,
            path = %segment.path.display(),
            "Chunk closed ({} to {})",
            clock_stamp(&segment.start),
            clock_stamp(&segment.end)
        );
        let _ = self.events.send(SegmentEvent::ChunkClosed {
            session_id: self.session.session_id,
            chunk_index: chunk,
            kind,
            path: segment.path.clone(),
        });
    }

    fn lose_chunk(&mut self, chunk: u32, path: PathBuf, end: DateTime<Local>, waited: Duration) {
        let segment = self.ledger.record(chunk, path, SegmentKind::Lost, end);
        tracing::error!(
            session = self.session.session_id,
            chunk,
            path = %segment.path.display(),
            waited = ?waited,
            "Chunk lost, no usable file ({} to {})",
            clock_stamp(&segment.start),
            clock_stamp(&segment.end)
        );
        let _ = self.events.send(SegmentEvent::ChunkLost {
            session_id: self.session.session_id,
            chunk_index: chunk,
            path: segment.path.clone(),
        });
    }

    fn abort(&self, err: SegmentError, ready: Option<oneshot::Sender<SegmentResult<()>>>) {
        tracing::error!(session = self.session.session_id, code = err.code(), "Session aborted: {}", err);
        self.emit_error(err.code(), err.to_string());
        if let Some(tx) = ready {
            let _ = tx.send(Err(err));
        }
    }

    fn emit_error(&self, code: &str, message: String) {
        let _ = self.events.send(SegmentEvent::Error {
            code: code.to_string(),
            message,
        });
    }
}

fn signal_ready(ready: &mut Option<oneshot::Sender<SegmentResult<()>>>) {
    if let Some(tx) = ready.take() {
        let _ = tx.send(Ok(()));
    }
}

fn discard_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!("Could not remove {:?}: {}", path, e);
    }
}
