//! Segmented recording
//!
//! - `SegmentationController` owns the session lifecycle
//! - `SessionWorker` runs the per-chunk loop on its own task
//! - `SegmentMonitor` watches the growing file for rollover
//! - `SegmentLedger` records closed chunks and renames them at stop

pub mod coordinator;
pub mod ledger;
pub mod monitor;
pub mod state;
pub mod worker;

pub use coordinator::{SegmentEvent, SegmentationController};
pub use ledger::{FinalizedSegment, Segment, SegmentKind, SegmentLedger};
pub use monitor::{MonitorSignal, SegmentMonitor};
pub use state::{RecordingMode, RecordingSession, SessionState};
