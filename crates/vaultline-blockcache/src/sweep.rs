//! Size-bounded eviction of cache files
//!
//! The sweep keeps the most recently modified files whose running total stays
//! within budget and deletes everything older. The budget check happens
//! before a file's size is added, so the newest file is always kept even if
//! it alone exceeds the budget.

use crate::CACHED_SUFFIX;
use std::{
    fs,
    io::{self, ErrorKind},
    path::Path,
    time::SystemTime,
};
use tracing::{trace, warn};

/// A cache file as seen by the sweeper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirectoryEntry {
    /// File name inside the cache directory
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

/// Result of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Total size of the files kept
    pub retained_bytes: u64,
    /// Number of files deleted
    pub evicted: u64,
}

/// List the cache-suffixed files in `directory`.
///
/// Returns `Ok(None)` if the directory does not exist.
pub fn list_cache_entries(directory: &Path) -> io::Result<Option<Vec<CacheDirectoryEntry>>> {
    let read_dir = match fs::read_dir(directory) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(CACHED_SUFFIX) {
            continue;
        }

        // The file may vanish between listing and stat (concurrent sweep or
        // replacement); skip it.
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if !metadata.is_file() {
            continue;
        }

        entries.push(CacheDirectoryEntry {
            name,
            size: metadata.len(),
            modified: metadata.modified()?,
        });
    }

    Ok(Some(entries))
}

/// Sort `entries` newest first and split them into the kept prefix and the
/// evicted remainder.
pub fn plan_eviction(
    mut entries: Vec<CacheDirectoryEntry>,
    max_size_bytes: u64,
) -> (u64, Vec<CacheDirectoryEntry>) {
    entries.sort_by(|a, b| b.modified.cmp(&a.modified));

    let mut retained: u64 = 0;
    let mut evicted = Vec::new();
    for entry in entries {
        if retained > max_size_bytes {
            evicted.push(entry);
        } else {
            retained = retained.saturating_add(entry.size);
        }
    }

    (retained, evicted)
}

/// Enforce `max_size_bytes` on `directory`. A budget of 0 disables eviction.
pub fn sweep_directory(directory: &Path, max_size_bytes: u64) -> io::Result<SweepOutcome> {
    if max_size_bytes == 0 {
        return Ok(SweepOutcome::default());
    }

    let Some(entries) = list_cache_entries(directory)? else {
        return Ok(SweepOutcome::default());
    };

    let (retained_bytes, victims) = plan_eviction(entries, max_size_bytes);

    let mut evicted = 0;
    for victim in victims {
        let path = directory.join(&victim.name);
        trace!(file = %path.display(), size = victim.size, "evicting cache file");
        match fs::remove_file(&path) {
            Ok(()) => evicted += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(file = %path.display(), error = %e, "unable to remove cache file"),
        }
    }

    Ok(SweepOutcome {
        retained_bytes,
        evicted,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::{
        fs::File,
        path::PathBuf,
        time::{Duration, UNIX_EPOCH},
    };
    use tempfile::TempDir;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn write_aged(dir: &Path, name: &str, size: usize, age_rank: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![0u8; size]).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(at(age_rank))
            .unwrap();
        path
    }

    fn remaining(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn keeps_newest_prefix_within_budget() {
        let dir = TempDir::new().expect("temp dir");
        write_aged(dir.path(), "a.cached", 40, 4); // newest
        write_aged(dir.path(), "b.cached", 40, 3);
        write_aged(dir.path(), "c.cached", 40, 2);
        write_aged(dir.path(), "d.cached", 40, 1); // oldest

        // a: 0 <= 100 keep (40); b: 40 <= 100 keep (80); c: 80 <= 100 keep
        // (120); d: 120 > 100 delete.
        let outcome = sweep_directory(dir.path(), 100).unwrap();
        assert_eq!(outcome.retained_bytes, 120);
        assert_eq!(outcome.evicted, 1);
        assert_eq!(remaining(dir.path()), vec!["a.cached", "b.cached", "c.cached"]);
    }

    #[test]
    fn single_oversized_newest_file_is_kept() {
        let dir = TempDir::new().expect("temp dir");
        write_aged(dir.path(), "big.cached", 500, 2);
        write_aged(dir.path(), "small.cached", 1, 1);

        let outcome = sweep_directory(dir.path(), 100).unwrap();
        assert_eq!(outcome.retained_bytes, 500);
        assert_eq!(remaining(dir.path()), vec!["big.cached"]);
    }

    #[test]
    fn zero_budget_never_removes() {
        let dir = TempDir::new().expect("temp dir");
        write_aged(dir.path(), "a.cached", 1000, 2);
        write_aged(dir.path(), "b.cached", 1000, 1);

        assert_eq!(
            sweep_directory(dir.path(), 0).unwrap(),
            SweepOutcome::default()
        );
        assert_eq!(remaining(dir.path()), vec!["a.cached", "b.cached"]);
    }

    #[test]
    fn foreign_files_are_ignored() {
        let dir = TempDir::new().expect("temp dir");
        write_aged(dir.path(), "new.cached", 10, 3);
        write_aged(dir.path(), "notes.txt", 10_000, 2);
        write_aged(dir.path(), "old.cached", 10, 1);

        let outcome = sweep_directory(dir.path(), 5).unwrap();
        assert_eq!(outcome.retained_bytes, 10);
        assert_eq!(remaining(dir.path()), vec!["new.cached", "notes.txt"]);
    }

    #[test]
    fn missing_directory_is_not_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("absent");
        assert_eq!(
            sweep_directory(&missing, 100).unwrap(),
            SweepOutcome::default()
        );
    }

    #[test]
    fn plan_matches_budget_boundary() {
        let entries = (0..5)
            .map(|i| CacheDirectoryEntry {
                name: format!("{i}.cached"),
                size: 10,
                modified: at(i),
            })
            .collect();

        // Newest first: 4,3,2,1,0. Running total 0,10,20 <= 20 keeps three.
        let (retained, evicted) = plan_eviction(entries, 20);
        assert_eq!(retained, 30);
        let names: Vec<_> = evicted.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["1.cached", "0.cached"]);
    }
}
