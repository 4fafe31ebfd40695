//! Bounded retention of rotated backups

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rollwrite_core::{ResolvedConfig, COMPRESS_TMP_SUFFIX};
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Fixed-capacity FIFO of backup paths. Admitting into a full queue evicts
/// and deletes the oldest backups first.
#[derive(Debug)]
pub struct Retention {
    capacity: usize,
    queue: Mutex<VecDeque<PathBuf>>,
}

impl Retention {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Retention for a writer, preloaded with backups already on disk.
    ///
    /// Only backups named by the default rule are recognised; their time
    /// tags decide the order. Anything beyond capacity is pruned right away.
    pub fn seeded(config: &ResolvedConfig) -> Self {
        let retention = Self::new(config.max_backups);
        if config.file_formatter.is_some() {
            return retention;
        }

        let existing = existing_backups(config);
        if !existing.is_empty() {
            info!(
                "Found {} existing backups of {}",
                existing.len(),
                config.file_path.display()
            );
        }
        for path in existing {
            retention.admit(path);
        }
        retention
    }

    /// Track a new backup, deleting the oldest ones to stay within capacity.
    /// Returns the evicted paths. Deletion failures are logged and the
    /// eviction still counts.
    pub fn admit(&self, path: PathBuf) -> Vec<PathBuf> {
        if self.capacity == 0 {
            return Vec::new();
        }

        let evicted: Vec<PathBuf> = {
            let mut queue = self.queue.lock();
            // Same name twice means the rename replaced the earlier backup
            if queue.contains(&path) {
                return Vec::new();
            }
            let excess = (queue.len() + 1).saturating_sub(self.capacity);
            let evicted = queue.drain(..excess).collect();
            queue.push_back(path);
            evicted
        };

        for old in &evicted {
            match fs::remove_file(old) {
                Ok(()) => debug!("Removed old backup {}", old.display()),
                Err(e) => warn!("Failed to remove old backup {}: {}", old.display(), e),
            }
        }
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Retained backups, oldest first
    pub fn backups(&self) -> Vec<PathBuf> {
        self.queue.lock().iter().cloned().collect()
    }
}

/// Parse a backup time tag with the configured format. Date-only formats
/// are accepted and sort at midnight.
fn parse_tag(tag: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(tag, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(tag, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Backups of the active file found next to it, oldest first
fn existing_backups(config: &ResolvedConfig) -> Vec<PathBuf> {
    let Some(dir) = config.file_path.parent() else {
        return Vec::new();
    };
    let prefix = config.backup_prefix();
    let Some(prefix) = prefix.to_str() else {
        return Vec::new();
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to scan {} for backups: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let tmp_suffix = format!(".{}", COMPRESS_TMP_SUFFIX);
    let mut found: Vec<(NaiveDateTime, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if name.ends_with(&tmp_suffix) {
                return None;
            }
            let tag = name.strip_prefix(prefix)?;
            let at = parse_tag(tag, &config.time_tag_format)?;
            Some((at, entry.path()))
        })
        .collect();

    found.sort();
    found.into_iter().map(|(_, path)| path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollwrite_core::Config;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_admit_within_capacity() {
        let dir = TempDir::new().unwrap();
        let retention = Retention::new(3);

        for i in 0..3 {
            let path = dir.path().join(format!("app.log.{}", i));
            touch(&path);
            assert!(retention.admit(path).is_empty());
        }
        assert_eq!(retention.len(), 3);
    }

    #[test]
    fn test_admit_evicts_oldest() {
        let dir = TempDir::new().unwrap();
        let retention = Retention::new(2);
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| dir.path().join(format!("app.log.{}", i)))
            .collect();

        for path in &paths {
            touch(path);
            retention.admit(path.clone());
        }

        assert_eq!(retention.backups(), vec![paths[3].clone(), paths[4].clone()]);
        assert!(!paths[0].exists());
        assert!(!paths[1].exists());
        assert!(!paths[2].exists());
        assert!(paths[3].exists());
        assert!(paths[4].exists());
    }

    #[test]
    fn test_admit_missing_file_still_evicts() {
        let dir = TempDir::new().unwrap();
        let retention = Retention::new(1);

        retention.admit(dir.path().join("gone.1"));
        let evicted = retention.admit(dir.path().join("gone.2"));

        assert_eq!(evicted, vec![dir.path().join("gone.1")]);
        assert_eq!(retention.len(), 1);
    }

    #[test]
    fn test_admit_duplicate_ignored() {
        let retention = Retention::new(2);
        retention.admit(PathBuf::from("/tmp/app.log.1"));
        retention.admit(PathBuf::from("/tmp/app.log.1"));
        assert_eq!(retention.len(), 1);
    }

    #[test]
    fn test_zero_capacity_tracks_nothing() {
        let retention = Retention::new(0);
        assert!(retention.admit(PathBuf::from("/tmp/app.log.1")).is_empty());
        assert!(retention.is_empty());
    }

    #[test]
    fn test_parse_tag() {
        assert!(parse_tag("202403091405", "%Y%m%d%H%M").is_some());
        assert!(parse_tag("20240309", "%Y%m%d").is_some());
        assert!(parse_tag("gz.202403091405", "%Y%m%d%H%M").is_none());
        assert!(parse_tag("202403091405.tmp", "%Y%m%d%H%M").is_none());
    }

    #[test]
    fn test_seeded_prunes_existing() {
        let dir = TempDir::new().unwrap();
        let active = dir.path().join("app.log");
        let names = [
            "app.log.202403091403",
            "app.log.202403091401",
            "app.log.202403091402",
            "app.log.202403091404",
        ];
        for name in names {
            touch(&dir.path().join(name));
        }
        // Not ours
        touch(&dir.path().join("app.log.notes"));
        touch(&dir.path().join("other.log.202403091400"));
        touch(&dir.path().join("app.log.202403091405.tmp"));

        let config = Config::new(&active).with_max_backups(2).resolve().unwrap();
        let retention = Retention::seeded(&config);

        assert_eq!(
            retention.backups(),
            vec![
                dir.path().join("app.log.202403091403"),
                dir.path().join("app.log.202403091404"),
            ]
        );
        assert!(!dir.path().join("app.log.202403091401").exists());
        assert!(!dir.path().join("app.log.202403091402").exists());
        assert!(dir.path().join("app.log.notes").exists());
        assert!(dir.path().join("other.log.202403091400").exists());
    }

    #[test]
    fn test_seeded_compressed_names() {
        let dir = TempDir::new().unwrap();
        let active = dir.path().join("app.log");
        touch(&dir.path().join("app.log.gz.202403091401"));
        touch(&dir.path().join("app.log.202403091402"));

        let config = Config::new(&active)
            .with_compress()
            .with_max_backups(5)
            .resolve()
            .unwrap();
        let retention = Retention::seeded(&config);

        assert_eq!(
            retention.backups(),
            vec![dir.path().join("app.log.gz.202403091401")]
        );
    }
}
