//! segcap - size-bounded segmented audio/video capture.
//!
//! Splits one continuous camera recording into chunks that roll over at a
//! size threshold, optionally captures per-chunk audio and merges it in, and
//! hands back an ordered ledger of delivery-ready files.

pub mod capture;
pub mod config;
pub mod export;
pub mod recorder;
pub mod utils;

pub use config::SegmenterConfig;
pub use recorder::{FinalizedSegment, SegmentEvent, SegmentationController, SessionState};
pub use utils::{SegmentError, SegmentResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segcap=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
