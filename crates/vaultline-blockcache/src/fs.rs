//! Atomic cache file writes
//!
//! A cache file is never written in place. Contents go to a uniquely named
//! temporary file next to the destination, which is then renamed over it, so
//! concurrent readers only ever see the previous or the new complete file.

use crate::CACHED_SUFFIX;
use std::{
    fs::{self, OpenOptions},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::trace;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

/// Write `contents` to `destination` through a temporary file in `directory`.
///
/// If `directory` does not exist it is created (owner-only) and the write is
/// retried once. A failed rename removes the temporary file.
pub fn write_file_atomic(directory: &Path, destination: &Path, contents: &[u8]) -> io::Result<()> {
    let temp = temp_file_path(directory);

    match write_new_file(&temp, contents) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            create_cache_dir(directory)?;
            write_new_file(&temp, contents)?;
        }
        Err(e) => return Err(e),
    }

    if let Err(e) = fs::rename(&temp, destination) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    trace!(file = %destination.display(), bytes = contents.len(), "wrote cache file");
    Ok(())
}

/// `tmp-<nanos>.<random>.cached` inside `directory`
fn temp_file_path(directory: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let salt: u64 = rand::random();
    directory.join(format!("tmp-{nanos}.{salt}{CACHED_SUFFIX}"))
}

fn write_new_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path)?;
    if let Err(e) = file.write_all(contents).and_then(|()| file.flush()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

fn create_cache_dir(directory: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(directory)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_missing_directory() {
        let root = TempDir::new().expect("temp dir");
        let dir = root.path().join("nested").join("cache");
        let dest = dir.join("blk.cached");

        write_file_atomic(&dir, &dest, b"contents").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"contents");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir_mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            let file_mode = fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
            assert_eq!(dir_mode, 0o700);
            assert_eq!(file_mode, 0o600);
        }
    }

    #[test]
    fn replaces_existing_file_and_leaves_no_temp() {
        let root = TempDir::new().expect("temp dir");
        let dest = root.path().join("blk.cached");

        write_file_atomic(root.path(), &dest, b"old").unwrap();
        write_file_atomic(root.path(), &dest, b"new contents").unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new contents");
        let names: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("blk.cached")]);
    }

    #[test]
    fn failed_rename_cleans_up_temp() {
        let root = TempDir::new().expect("temp dir");
        // Renaming a file onto a non-empty directory fails on every platform.
        let dest = root.path().join("occupied");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("inner"), b"x").unwrap();

        assert!(write_file_atomic(root.path(), &dest, b"data").is_err());

        let leftovers = fs::read_dir(root.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("tmp-")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn temp_names_carry_cache_suffix() {
        let path = temp_file_path(Path::new("/cache"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tmp-"));
        assert!(name.ends_with(CACHED_SUFFIX));
    }
}
