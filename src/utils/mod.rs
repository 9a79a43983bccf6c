//! Shared utilities: error taxonomy and media file naming

pub mod error;
pub mod paths;

pub use error::{SegmentError, SegmentResult};
pub use paths::MediaDirs;
