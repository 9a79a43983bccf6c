//! Recording state management
//!
//! Defines the session state machine and the per-session parameters.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// What a session captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingMode {
    VideoOnly,
    AudioVideo,
}

impl RecordingMode {
    pub fn with_audio(self) -> bool {
        matches!(self, RecordingMode::AudioVideo)
    }
}

/// Current state of the segmentation controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "mode")]
pub enum SessionState {
    /// No session in progress
    Idle,
    /// A worker is producing chunks
    Recording(RecordingMode),
    /// Stop requested; waiting for the in-flight chunk to be accounted for
    Finalizing,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Parameters of one user-initiated recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub session_id: u32,
    pub mode: RecordingMode,
    pub rollover_threshold_bytes: u64,
    pub started_at: DateTime<Local>,
}

impl RecordingSession {
    /// Create a new session starting now
    pub fn new(session_id: u32, mode: RecordingMode, rollover_threshold_bytes: u64) -> Self {
        Self {
            session_id,
            mode,
            rollover_threshold_bytes,
            started_at: Local::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&SessionState::Recording(RecordingMode::AudioVideo)).unwrap();
        assert_eq!(json, r#"{"state":"recording","mode":"audioVideo"}"#);
        let idle = serde_json::to_string(&SessionState::Idle).unwrap();
        assert_eq!(idle, r#"{"state":"idle"}"#);
    }

    #[test]
    fn test_mode_audio_flag() {
        assert!(RecordingMode::AudioVideo.with_audio());
        assert!(!RecordingMode::VideoOnly.with_audio());
        assert_eq!(SessionState::default(), SessionState::Idle);
    }
}
