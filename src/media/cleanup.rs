use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Result of one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupStats {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Deletes regular files in `dir` not modified within `max_age`.
///
/// Subdirectories are left alone. Files that cannot be removed are counted
/// and logged, the sweep continues.
pub async fn clean_old_files(dir: &Path, max_age: Duration) -> std::io::Result<CleanupStats> {
    let mut stats = CleanupStats::default();
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Nothing to clean, directory missing");
            return Ok(stats);
        }
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        stats.scanned += 1;

        let modified = metadata.modified().unwrap_or(SystemTime::now());
        if modified >= cutoff {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed stale file");
                stats.removed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove stale file");
                stats.failed += 1;
            }
        }
    }

    info!(
        dir = %dir.display(),
        scanned = stats.scanned,
        removed = stats.removed,
        failed = stats.failed,
        "Stale file sweep finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_removes_only_old_files() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.mp4");
        let fresh = dir.path().join("fresh.mp4");
        std::fs::write(&old, b"old").unwrap();
        std::fs::write(&fresh, b"fresh").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let two_days_ago = SystemTime::now() - Duration::from_secs(2 * 86_400);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(two_days_ago)
            .unwrap();

        let stats = clean_old_files(dir.path(), Duration::from_secs(86_400))
            .await
            .unwrap();

        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_sweep() {
        let dir = TempDir::new().unwrap();
        let stats = clean_old_files(&dir.path().join("absent"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(stats, CleanupStats::default());
    }
}
