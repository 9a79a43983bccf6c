//! Segment monitor
//!
//! Sleep-based polling of the growing output file, plus the readiness wait and
//! directory-scan recovery used when a chunk is closed.

use crate::utils::paths::is_temp_video_name;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why `watch` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorSignal {
    /// File reached the threshold; carries the observed size
    Rollover(u64),
    /// Stop was requested
    Stopped,
}

/// Polls one file's size against the rollover threshold
#[derive(Debug, Clone, Copy)]
pub struct SegmentMonitor {
    threshold: u64,
    interval: Duration,
}

impl SegmentMonitor {
    pub fn new(threshold: u64, interval: Duration) -> Self {
        Self {
            threshold,
            interval,
        }
    }

    /// Size of `path` if it exists and has reached the threshold
    pub async fn threshold_crossed(&self, path: &Path) -> Option<u64> {
        let size = file_size(path).await?;
        (size >= self.threshold).then_some(size)
    }

    /// Block until the threshold is crossed or `cancel` fires
    ///
    /// Checks once immediately, then once per interval. Cancellation wins over
    /// a rollover observed on the same tick only if it fired first.
    pub async fn watch(&self, path: &Path, cancel: &CancellationToken) -> MonitorSignal {
        loop {
            if cancel.is_cancelled() {
                return MonitorSignal::Stopped;
            }

            if let Some(size) = self.threshold_crossed(path).await {
                tracing::info!(
                    path = %path.display(),
                    size,
                    threshold = self.threshold,
                    "Rollover threshold reached"
                );
                return MonitorSignal::Rollover(size);
            }

            tracing::debug!(path = %path.display(), "Below threshold");

            tokio::select! {
                _ = cancel.cancelled() => return MonitorSignal::Stopped,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

/// Wait for `path` to exist and be non-empty
///
/// Returns the size once ready, or `None` when `timeout` runs out.
pub async fn wait_until_ready(path: &Path, timeout: Duration, step: Duration) -> Option<u64> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(size) = file_size(path).await.filter(|s| *s > 0) {
            return Some(size);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(step).await;
    }
}

/// Newest non-empty temp video in `dir`, modified no earlier than `since`
///
/// Heuristic for encoders that ignore the requested filename. Files for which
/// `exclude` returns true (already claimed by an earlier chunk) are skipped.
pub fn recover_latest<F>(dir: &Path, ext: &str, since: SystemTime, exclude: F) -> Option<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Recovery scan of {:?} failed: {}", dir, e);
            return None;
        }
    };

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_temp_video_name(name, ext) {
            continue;
        }

        let path = entry.path();
        if exclude(&path) {
            continue;
        }

        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() || meta.len() == 0 {
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        if modified < since {
            continue;
        }

        if best.as_ref().map_or(true, |(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }

    best.map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn write_with_mtime(path: &Path, bytes: &[u8], mtime: SystemTime) {
        std::fs::write(path, bytes).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    #[tokio::test]
    async fn test_threshold_crossed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        let monitor = SegmentMonitor::new(10, Duration::from_millis(5));

        assert_eq!(monitor.threshold_crossed(&path).await, None);
        std::fs::write(&path, [0u8; 9]).unwrap();
        assert_eq!(monitor.threshold_crossed(&path).await, None);
        std::fs::write(&path, [0u8; 10]).unwrap();
        assert_eq!(monitor.threshold_crossed(&path).await, Some(10));
    }

    #[tokio::test]
    async fn test_watch_observes_cancel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        let monitor = SegmentMonitor::new(10, Duration::from_millis(5));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        assert_eq!(monitor.watch(&path, &cancel).await, MonitorSignal::Stopped);
    }

    #[tokio::test]
    async fn test_watch_reports_rollover() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        let monitor = SegmentMonitor::new(10, Duration::from_millis(5));
        let cancel = CancellationToken::new();

        let writer_path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            std::fs::write(writer_path, [1u8; 15]).unwrap();
        });

        assert_eq!(
            monitor.watch(&path, &cancel).await,
            MonitorSignal::Rollover(15)
        );
    }

    #[tokio::test]
    async fn test_wait_until_ready_times_out_on_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"").unwrap();

        let ready = wait_until_ready(&path, Duration::from_millis(30), Duration::from_millis(5)).await;
        assert_eq!(ready, None);

        std::fs::write(&path, b"data").unwrap();
        let ready = wait_until_ready(&path, Duration::from_millis(30), Duration::from_millis(5)).await;
        assert_eq!(ready, Some(4));
    }

    #[test]
    fn test_recover_latest_picks_newest_unclaimed() {
        let dir = tempdir().unwrap();
        let base = SystemTime::now() - Duration::from_secs(100);

        let old = dir.path().join("temp_vdo_16oct2026_100000_1.mp4");
        let newer = dir.path().join("temp_vdo_16oct2026_100100_2.mp4");
        let newest_claimed = dir.path().join("temp_vdo_16oct2026_100200_3.mp4");
        let empty = dir.path().join("temp_vdo_16oct2026_100300_4.mp4");
        let other = dir.path().join("merged_1_1_x.mp4");

        write_with_mtime(&old, b"x", base + Duration::from_secs(10));
        write_with_mtime(&newer, b"x", base + Duration::from_secs(20));
        write_with_mtime(&newest_claimed, b"x", base + Duration::from_secs(30));
        write_with_mtime(&empty, b"", base + Duration::from_secs(40));
        write_with_mtime(&other, b"x", base + Duration::from_secs(50));

        let claimed = newest_claimed.clone();
        let found = recover_latest(dir.path(), "mp4", base, |p| p == claimed);
        assert_eq!(found, Some(newer));
    }

    #[test]
    fn test_recover_latest_ignores_stale_files() {
        let dir = tempdir().unwrap();
        let now = SystemTime::now();
        let stale = dir.path().join("temp_vdo_15oct2026_100000_1.mp4");
        write_with_mtime(&stale, b"x", now - Duration::from_secs(3600));

        let found = recover_latest(dir.path(), "mp4", now - Duration::from_secs(60), |_| false);
        assert_eq!(found, None);
    }
}
