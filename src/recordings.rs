use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::metrics::RECORDINGS_REMOVED;

const RECORDING_EXTENSION: &str = "wav";

// Submitted recordings on disk, named by their cache key
pub struct RecordingArchive {
    dir: PathBuf,
}

impl RecordingArchive {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!("Keeping recordings in {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, cache_key: &str) -> PathBuf {
        self.dir.join(format!("{cache_key}.{RECORDING_EXTENSION}"))
    }

    /// Write a recording once; returns false when it was already kept.
    pub async fn store(&self, cache_key: &str, audio: &[u8]) -> Result<bool> {
        let path = self.path_for(cache_key);
        if tokio::fs::try_exists(&path).await? {
            return Ok(false);
        }
        tokio::fs::write(&path, audio).await?;
        debug!(path = %path.display(), bytes = audio.len(), "recording stored");
        Ok(true)
    }

    /// Delete recordings whose modification time is at least `max_age` ago.
    /// Cached scorer responses are not touched.
    pub async fn remove_older_than(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORDING_EXTENSION) {
                continue;
            }

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read recording age, skipping");
                    continue;
                }
            };
            // files stamped in the future count as brand new
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "removed old recording");
                    RECORDINGS_REMOVED.inc();
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove recording"),
            }
        }

        Ok(removed)
    }
}

// Retention task - deletes old recordings every `check_interval`
pub async fn retention_sweeper(
    archive: Arc<RecordingArchive>,
    retention: Duration,
    check_interval: Duration,
) {
    let mut interval = interval(check_interval);

    info!(
        "Retention sweeper started (retention: {:?}, interval: {:?})",
        retention, check_interval
    );

    loop {
        interval.tick().await;

        match archive.remove_older_than(retention).await {
            Ok(0) => debug!("retention sweep found nothing to remove"),
            Ok(count) => info!("Cleaned up {} old recordings", count),
            Err(e) => warn!(error = %e, "retention sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn store_is_idempotent() {
        let dir = tempdir().unwrap();
        let archive = RecordingArchive::open(dir.path().join("audio")).await.unwrap();

        assert!(archive.store("abc", b"RIFF").await.unwrap());
        assert!(!archive.store("abc", b"other").await.unwrap());

        let kept = tokio::fs::read(archive.path_for("abc")).await.unwrap();
        assert_eq!(kept, b"RIFF");
    }

    #[tokio::test]
    async fn young_recordings_survive_a_sweep() {
        let dir = tempdir().unwrap();
        let archive = RecordingArchive::open(dir.path()).await.unwrap();
        archive.store("abc", b"RIFF").await.unwrap();

        let removed = archive
            .remove_older_than(Duration::from_secs(15 * 86_400))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(archive.path_for("abc").exists());
    }

    #[tokio::test]
    async fn expired_recordings_are_removed_other_files_kept() {
        let dir = tempdir().unwrap();
        let archive = RecordingArchive::open(dir.path()).await.unwrap();
        archive.store("abc", b"RIFF").await.unwrap();
        archive.store("def", b"RIFF").await.unwrap();
        tokio::fs::write(dir.path().join("results.db"), b"sqlite")
            .await
            .unwrap();

        let removed = archive.remove_older_than(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 2);
        assert!(!archive.path_for("abc").exists());
        assert!(dir.path().join("results.db").exists());
    }
}
