//! Segmentation controller
//!
//! Owns the session lifecycle: spawns one worker per session, stops it
//! cooperatively and finalizes the ledger it hands back.

use super::ledger::{FinalizedSegment, SegmentKind};
use super::state::{RecordingMode, RecordingSession, SessionState};
use super::worker::{SessionWorker, WorkerOutcome};
use crate::capture::{AudioSegmentRecorder, CaptureDriver, FfmpegAudioRecorder, FfmpegCaptureDriver};
use crate::config::SegmenterConfig;
use crate::export::{FfmpegMuxer, MuxSettings, Muxer};
use crate::utils::{MediaDirs, SegmentError, SegmentResult};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Events emitted during a session
#[derive(Debug, Clone)]
pub enum SegmentEvent {
    /// First chunk is recording
    Started { session_id: u32, mode: RecordingMode },
    /// A chunk was closed and recorded
    ChunkClosed {
        session_id: u32,
        chunk_index: u32,
        kind: SegmentKind,
        path: PathBuf,
    },
    /// A chunk produced no usable file
    ChunkLost {
        session_id: u32,
        chunk_index: u32,
        path: PathBuf,
    },
    /// Non-fatal or fatal failure
    Error { code: String, message: String },
    /// Session finalized
    Stopped {
        session_id: u32,
        delivered: usize,
        lost: usize,
    },
}

struct ActiveSession {
    session: RecordingSession,
    cancel: CancellationToken,
    handle: JoinHandle<WorkerOutcome>,
}

/// Splits a continuous recording into size-bounded chunks
pub struct SegmentationController {
    config: SegmenterConfig,
    dirs: MediaDirs,

    /// Current state, readable without `&mut`
    state: Arc<RwLock<SessionState>>,

    /// Drivers are lent to the worker for the duration of a session
    capture: Option<Box<dyn CaptureDriver>>,
    audio: Option<Box<dyn AudioSegmentRecorder>>,
    muxer: Arc<dyn Muxer>,

    active: Option<ActiveSession>,

    /// Id of the next (or current) session
    session_counter: u32,

    event_tx: broadcast::Sender<SegmentEvent>,
}

impl SegmentationController {
    /// Create a controller around the given drivers
    ///
    /// Without an audio recorder every session runs video-only.
    pub fn new(
        config: SegmenterConfig,
        capture: Box<dyn CaptureDriver>,
        audio: Option<Box<dyn AudioSegmentRecorder>>,
        muxer: Arc<dyn Muxer>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let dirs = MediaDirs::new(&config.base_dir);
        Self {
            config,
            dirs,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            capture: Some(capture),
            audio,
            muxer,
            active: None,
            session_counter: 1,
            event_tx,
        }
    }

    /// Controller backed by the ffmpeg drivers and muxer
    pub fn with_ffmpeg(config: SegmenterConfig) -> Self {
        let capture = Box::new(FfmpegCaptureDriver::from_config(&config));
        let audio = Box::new(FfmpegAudioRecorder::from_config(&config));
        let muxer = Arc::new(FfmpegMuxer::new(MuxSettings::from_config(&config)));
        Self::new(config, capture, Some(audio), muxer)
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn session_id(&self) -> u32 {
        self.session_counter
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SegmentEvent> {
        self.event_tx.subscribe()
    }

    /// Start a session
    ///
    /// Ignored unless idle. Returns once the first chunk is recording; an
    /// encoder that refuses to start fails the call and leaves the
    /// controller idle.
    pub async fn start(&mut self, with_audio: bool) -> SegmentResult<()> {
        let current = *self.state.read();
        if current != SessionState::Idle {
            tracing::info!("Start ignored, controller is {:?}", current);
            return Ok(());
        }

        self.config.validate()?;
        self.dirs.ensure()?;

        let mode = if with_audio && self.audio.is_some() {
            RecordingMode::AudioVideo
        } else {
            if with_audio {
                tracing::warn!("No audio recorder configured, recording video only");
            }
            RecordingMode::VideoOnly
        };

        let capture = self
            .capture
            .take()
            .ok_or_else(|| SegmentError::Worker("capture driver unavailable".to_string()))?;
        let audio = if mode.with_audio() {
            self.audio.take()
        } else {
            None
        };

        let session = RecordingSession::new(
            self.session_counter,
            mode,
            self.config.rollover_threshold_bytes,
        );
        let cancel = CancellationToken::new();
        let worker = SessionWorker::new(
            session.clone(),
            self.config.clone(),
            capture,
            audio,
            self.muxer.clone(),
            cancel.clone(),
            self.event_tx.clone(),
        );

        tracing::info!(
            session = session.session_id,
            mode = ?mode,
            base_dir = %self.config.base_dir.display(),
            "Starting segmented recording"
        );

        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(worker.run(ready_tx));

        let failure = match ready_rx.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => Some(SegmentError::Worker(
                "worker exited before the first chunk started".to_string(),
            )),
        };

        if let Some(err) = failure {
            match handle.await {
                Ok(outcome) => self.reclaim(outcome),
                Err(e) => tracing::error!("Segmentation worker panicked: {}", e),
            }
            return Err(err);
        }

        *self.state.write() = SessionState::Recording(mode);
        self.active = Some(ActiveSession {
            session: session.clone(),
            cancel,
            handle,
        });
        let _ = self.event_tx.send(SegmentEvent::Started {
            session_id: session.session_id,
            mode,
        });

        tracing::info!(session = session.session_id, "Recording started");
        Ok(())
    }

    /// Stop the session and finalize its chunks
    ///
    /// Waits for the worker to close the chunk in flight, renames every
    /// delivered chunk with `category` and returns them in order. Lost chunks
    /// are logged and left out. With no session running this returns an
    /// empty list.
    ///
    /// If the worker does not finish within the join timeout the session
    /// stays `Finalizing` and `StopTimeout` is returned; calling `stop` again
    /// resumes the wait.
    pub async fn stop(&mut self, category: &str) -> SegmentResult<Vec<FinalizedSegment>> {
        let Some(active) = self.active.take() else {
            tracing::debug!("Stop requested with no active session");
            return Ok(Vec::new());
        };

        *self.state.write() = SessionState::Finalizing;
        active.cancel.cancel();

        let ActiveSession {
            session,
            cancel,
            mut handle,
        } = active;
        tracing::info!(session = session.session_id, "Stopping recording, finishing current chunk");

        let timeout = self.config.join_timeout();
        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let err = SegmentError::Worker(e.to_string());
                tracing::error!(session = session.session_id, "{}", err);
                let _ = self.event_tx.send(SegmentEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                self.session_counter += 1;
                *self.state.write() = SessionState::Idle;
                return Err(err);
            }
            Err(_) => {
                tracing::warn!(
                    session = session.session_id,
                    "Worker still busy after {:?}, session left finalizing",
                    timeout
                );
                self.active = Some(ActiveSession {
                    session,
                    cancel,
                    handle,
                });
                return Err(SegmentError::StopTimeout(timeout));
            }
        };

        let WorkerOutcome {
            ledger,
            capture,
            audio,
        } = outcome;
        self.capture = Some(capture);
        if audio.is_some() {
            self.audio = audio;
        }

        let lost = ledger.lost_count();
        let segments = ledger.finalize(
            session.mode,
            category,
            &self.dirs.videos,
            &self.config.video_extension,
        );

        let _ = self.event_tx.send(SegmentEvent::Stopped {
            session_id: session.session_id,
            delivered: segments.len(),
            lost,
        });
        tracing::info!(
            session = session.session_id,
            delivered = segments.len(),
            lost,
            "Recording stopped"
        );

        self.session_counter += 1;
        *self.state.write() = SessionState::Idle;
        Ok(segments)
    }

    fn reclaim(&mut self, outcome: WorkerOutcome) {
        self.capture = Some(outcome.capture);
        if outcome.audio.is_some() {
            self.audio = outcome.audio;
        }
    }
}

impl Drop for SegmentationController {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureResult, EncoderSettings};
    use crate::export::{MergeRequest, MuxError};
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::tempdir;

    struct RefusingCapture;

    #[async_trait]
    impl CaptureDriver for RefusingCapture {
        async fn start(&mut self, _target: &Path, _settings: &EncoderSettings) -> CaptureResult<()> {
            Err(crate::capture::CaptureError::Device("no camera".to_string()))
        }

        async fn stop(&mut self) -> CaptureResult<()> {
            Ok(())
        }
    }

    struct NoMuxer;

    #[async_trait]
    impl Muxer for NoMuxer {
        async fn merge(&self, request: &MergeRequest) -> Result<PathBuf, MuxError> {
            Err(MuxError::MissingInput(request.video.clone()))
        }
    }

    fn controller(base: &Path) -> SegmentationController {
        let config = SegmenterConfig {
            base_dir: base.to_path_buf(),
            ..SegmenterConfig::default()
        };
        SegmentationController::new(config, Box::new(RefusingCapture), None, Arc::new(NoMuxer))
    }

    #[tokio::test]
    async fn test_stop_without_start_is_empty() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());
        assert!(ctl.stop("general").await.unwrap().is_empty());
        assert_eq!(ctl.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_encoder_start_failure_leaves_idle() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());
        let mut events = ctl.subscribe();

        let err = ctl.start(false).await.unwrap_err();
        assert_eq!(err.code(), "ENCODER_START_FAILURE");
        assert_eq!(ctl.state(), SessionState::Idle);
        assert!(matches!(events.recv().await.unwrap(), SegmentEvent::Error { .. }));

        // driver was handed back, so a retry reaches the encoder again
        assert!(ctl.start(false).await.is_err());
        assert!(dir.path().join("Videos").is_dir());
    }
}
