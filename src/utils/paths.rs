//! Media directory layout and file naming
//!
//! Temp names are what the encoders write to while a chunk is in flight;
//! delivery names are what the ledger renames them to at session stop.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub const VIDEOS_DIR: &str = "Videos";
pub const AUDIOS_DIR: &str = "Audios";

/// Prefix shared by every in-flight video chunk
pub const TEMP_VIDEO_PREFIX: &str = "temp_vdo_";

/// Per-chunk audio reuses one name; only one chunk's audio is in flight
pub const TEMP_SEGMENT_AUDIO_STEM: &str = "temp_seg_audio";

/// `Videos/` and `Audios/` under a base directory
#[derive(Debug, Clone)]
pub struct MediaDirs {
    pub videos: PathBuf,
    pub audios: PathBuf,
}

impl MediaDirs {
    pub fn new(base: &Path) -> Self {
        Self {
            videos: base.join(VIDEOS_DIR),
            audios: base.join(AUDIOS_DIR),
        }
    }

    /// Create both directories if missing
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.videos)?;
        std::fs::create_dir_all(&self.audios)?;
        Ok(())
    }
}

/// Timestamp as embedded in file names, e.g. `16oct2026_101500`
pub fn file_stamp(ts: &DateTime<Local>) -> String {
    ts.format("%d%b%Y_%H%M%S").to_string().to_lowercase()
}

/// Wall-clock form handed to the upload collaborator
pub fn clock_stamp(ts: &DateTime<Local>) -> String {
    ts.format("%H:%M:%S").to_string()
}

/// `temp_vdo_<date>_<time>_<chunk>.<ext>`
///
/// The chunk index keeps names distinct when two rollovers land in the same second.
pub fn temp_video_name(now: &DateTime<Local>, chunk: u32, ext: &str) -> String {
    format!("{}{}_{}.{}", TEMP_VIDEO_PREFIX, file_stamp(now), chunk, ext)
}

pub fn temp_segment_audio_name(ext: &str) -> String {
    format!("{}.{}", TEMP_SEGMENT_AUDIO_STEM, ext)
}

/// Whether a directory entry looks like one of our in-flight video chunks
pub fn is_temp_video_name(name: &str, ext: &str) -> bool {
    name.starts_with(TEMP_VIDEO_PREFIX)
        && Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Output name the muxer writes before finalization
pub fn merged_name(
    session_id: u32,
    chunk: u32,
    start: &DateTime<Local>,
    end: &DateTime<Local>,
    category: Option<&str>,
    ext: &str,
) -> String {
    match category {
        Some(category) => format!(
            "merged_{}_{}_{}_to_{}_{}.{}",
            session_id,
            chunk,
            file_stamp(start),
            file_stamp(end),
            category,
            ext
        ),
        None => format!(
            "merged_{}_{}_{}_to_{}.{}",
            session_id,
            chunk,
            file_stamp(start),
            file_stamp(end),
            ext
        ),
    }
}

/// `<prefix>_<session>_<index>_<start>_to_<end>_<category>.<ext>`
pub fn delivery_name(
    prefix: &str,
    session_id: u32,
    index: usize,
    start: &DateTime<Local>,
    end: &DateTime<Local>,
    category: &str,
    ext: &str,
) -> String {
    format!(
        "{}_{}_{}_{}_to_{}_{}.{}",
        prefix,
        session_id,
        index,
        file_stamp(start),
        file_stamp(end),
        category,
        ext
    )
}

/// Category tags come from a UI dropdown ("Loose furniture"); keep them filename-safe
pub fn sanitize_category(category: &str) -> String {
    let cleaned: String = category
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "general".to_string()
    } else {
        cleaned
    }
}
