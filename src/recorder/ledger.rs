//! Segment ledger
//!
//! Ordered record of the chunks produced by one session. The ledger owns the
//! chunk boundaries: each recorded segment starts where the previous one
//! ended, so coverage is contiguous by construction.

use super::state::RecordingMode;
use crate::utils::paths::{clock_stamp, delivery_name, sanitize_category};
use crate::utils::SegmentError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a chunk was accounted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentKind {
    /// Video and audio combined
    Merged,
    /// Video only: a video-only session, or a failed merge
    RawVideoOnly,
    /// No usable file appeared
    Lost,
}

impl SegmentKind {
    /// Lost chunks are never delivered
    pub fn is_delivered(self) -> bool {
        !matches!(self, SegmentKind::Lost)
    }
}

/// Delivery filename prefix for every chunk of a session
///
/// Follows the session mode, so a demoted chunk of an audio+video session
/// still carries `merged`.
pub fn delivery_prefix(mode: RecordingMode) -> &'static str {
    match mode {
        RecordingMode::AudioVideo => "merged",
        RecordingMode::VideoOnly => "vdo",
    }
}

/// One closed chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub chunk_index: u32,
    /// Temp path until finalized; for lost chunks, the path that never appeared
    pub path: PathBuf,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub kind: SegmentKind,
}

/// A delivered chunk as handed to the upload collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedSegment {
    pub path: PathBuf,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub kind: SegmentKind,
}

impl FinalizedSegment {
    pub fn start_clock(&self) -> String {
        clock_stamp(&self.start)
    }

    pub fn end_clock(&self) -> String {
        clock_stamp(&self.end)
    }
}

/// Chunks of the current session, in the order they were closed
#[derive(Debug)]
pub struct SegmentLedger {
    session_id: u32,
    cursor: DateTime<Local>,
    segments: Vec<Segment>,
}

impl SegmentLedger {
    pub fn new(session_id: u32, started_at: DateTime<Local>) -> Self {
        Self {
            session_id,
            cursor: started_at,
            segments: Vec::new(),
        }
    }

    /// Start timestamp of the next chunk
    pub fn cursor(&self) -> DateTime<Local> {
        self.cursor
    }

    /// Close the current chunk at `end`
    ///
    /// An `end` earlier than the cursor (wall clock stepped back) is clamped so
    /// segments never overlap.
    pub fn record(
        &mut self,
        chunk_index: u32,
        path: PathBuf,
        kind: SegmentKind,
        end: DateTime<Local>,
    ) -> &Segment {
        let start = self.cursor;
        let end = end.max(start);
        self.cursor = end;
        self.segments.push(Segment {
            chunk_index,
            path,
            start,
            end,
            kind,
        });
        &self.segments[self.segments.len() - 1]
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether a file already belongs to a closed chunk of this session
    pub fn claims(&self, path: &Path) -> bool {
        self.segments
            .iter()
            .any(|s| s.kind != SegmentKind::Lost && s.path == path)
    }

    pub fn lost_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Lost)
            .count()
    }

    /// Rename every delivered chunk to its delivery filename
    ///
    /// Indices are 1-based over delivered chunks. A failed rename keeps the
    /// temp path as the delivery path.
    pub fn finalize(
        self,
        mode: RecordingMode,
        category: &str,
        videos_dir: &Path,
        default_ext: &str,
    ) -> Vec<FinalizedSegment> {
        let category = sanitize_category(category);
        let session_id = self.session_id;
        let prefix = delivery_prefix(mode);
        let mut finalized = Vec::new();

        for segment in self.segments {
            if !segment.kind.is_delivered() {
                tracing::warn!(
                    session = session_id,
                    chunk = segment.chunk_index,
                    "Chunk {:?} ({} to {}) was lost, not delivered",
                    segment.path,
                    clock_stamp(&segment.start),
                    clock_stamp(&segment.end)
                );
                continue;
            }

            let index = finalized.len() + 1;
            let ext = segment
                .path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or(default_ext)
                .to_string();
            let target = videos_dir.join(delivery_name(
                prefix,
                session_id,
                index,
                &segment.start,
                &segment.end,
                &category,
                &ext,
            ));

            let path = match rename_segment(&segment.path, &target) {
                Ok(()) => {
                    tracing::debug!("Renamed {:?} to {:?}", segment.path, target);
                    target
                }
                Err(err) => {
                    tracing::warn!(
                        session = session_id,
                        chunk = segment.chunk_index,
                        code = err.code(),
                        "{}",
                        err
                    );
                    segment.path
                }
            };

            finalized.push(FinalizedSegment {
                path,
                start: segment.start,
                end: segment.end,
                kind: segment.kind,
            });
        }

        finalized
    }
}

fn rename_segment(from: &Path, to: &Path) -> Result<(), SegmentError> {
    if !from.exists() {
        return Err(SegmentError::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "source file does not exist"),
        });
    }
    std::fs::rename(from, to).map_err(|source| SegmentError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_record_is_contiguous() {
        let mut ledger = SegmentLedger::new(1, t0());
        assert!(ledger.is_empty());
        ledger.record(1, PathBuf::from("a.mp4"), SegmentKind::RawVideoOnly, t0() + Duration::seconds(30));
        ledger.record(2, PathBuf::from("b.mp4"), SegmentKind::Lost, t0() + Duration::seconds(60));
        ledger.record(3, PathBuf::from("c.mp4"), SegmentKind::Merged, t0() + Duration::seconds(90));

        let segs = ledger.segments();
        assert_eq!(segs[0].start, t0());
        for pair in segs.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(ledger.cursor(), t0() + Duration::seconds(90));
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.lost_count(), 1);
    }

    #[test]
    fn test_backwards_clock_is_clamped() {
        let mut ledger = SegmentLedger::new(1, t0());
        let seg = ledger.record(1, PathBuf::from("a.mp4"), SegmentKind::RawVideoOnly, t0() - Duration::seconds(5));
        assert_eq!(seg.start, seg.end);
    }

    #[test]
    fn test_claims_ignores_lost() {
        let mut ledger = SegmentLedger::new(1, t0());
        ledger.record(1, PathBuf::from("a.mp4"), SegmentKind::RawVideoOnly, t0());
        ledger.record(2, PathBuf::from("b.mp4"), SegmentKind::Lost, t0());
        assert!(ledger.claims(Path::new("a.mp4")));
        assert!(!ledger.claims(Path::new("b.mp4")));
    }

    #[test]
    fn test_finalize_prefix_follows_session_mode() {
        let dir = tempdir().unwrap();
        let videos = dir.path().join("Videos");
        std::fs::create_dir_all(&videos).unwrap();

        let raw = videos.join("temp_vdo_16oct2026_100000_1.mp4");
        let merged = videos.join("merged_2_3_x.mp4");
        std::fs::write(&raw, b"raw").unwrap();
        std::fs::write(&merged, b"merged").unwrap();

        let mut ledger = SegmentLedger::new(2, t0());
        ledger.record(1, raw.clone(), SegmentKind::RawVideoOnly, t0() + Duration::seconds(10));
        ledger.record(2, videos.join("temp_vdo_gone_2.mp4"), SegmentKind::Lost, t0() + Duration::seconds(20));
        ledger.record(3, merged.clone(), SegmentKind::Merged, t0() + Duration::seconds(30));

        let out = ledger.finalize(RecordingMode::AudioVideo, "Light fixtures", &videos, "mp4");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, SegmentKind::RawVideoOnly);

        // raw chunk of an audio+video session keeps the session prefix
        let first = out[0].path.file_name().unwrap().to_string_lossy().to_string();
        let second = out[1].path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(first, "merged_2_1_16oct2026_100000_to_16oct2026_100010_light_fixtures.mp4");
        assert_eq!(second, "merged_2_2_16oct2026_100020_to_16oct2026_100030_light_fixtures.mp4");
        assert!(out[0].path.exists());
        assert!(out[1].path.exists());
        assert!(!raw.exists());
        assert_eq!(out[0].start_clock(), "10:00:00");
        assert_eq!(out[1].end_clock(), "10:00:30");
    }

    #[test]
    fn test_finalize_keeps_path_when_source_missing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("temp_vdo_missing_1.mp4");
        let mut ledger = SegmentLedger::new(1, t0());
        ledger.record(1, missing.clone(), SegmentKind::RawVideoOnly, t0());

        let out = ledger.finalize(RecordingMode::VideoOnly, "general", dir.path(), "mp4");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, missing);
    }
}
