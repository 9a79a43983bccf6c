//! Capture drivers
//!
//! Traits at the hardware boundary plus the ffmpeg-backed implementations
//! used by the `segcap` binary.

pub mod ffmpeg;
pub mod traits;

pub use ffmpeg::{FfmpegAudioRecorder, FfmpegCaptureDriver};
pub use traits::{AudioSegmentRecorder, CaptureDriver, CaptureError, CaptureResult, EncoderSettings};
