//! Crash-safe file replacement.
//!
//! Content is written to a temporary file in the target's own directory and
//! then renamed over the target, so the target is always either the previous
//! content or the complete new content.

use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::errors::WriteError;

/// Atomically replace `path` with `contents`, creating parent directories as
/// needed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| WriteError::NoParent(path.to_path_buf()))?;

    std::fs::create_dir_all(parent).map_err(|source| WriteError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    // The temp file must live on the same filesystem as the target for the
    // rename to be atomic.
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|source| WriteError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|source| WriteError::Io {
            path: tmp.path().to_path_buf(),
            source,
        })?;

    tmp.persist(path).map_err(|e| WriteError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    debug!(path = %path.display(), bytes = contents.len(), "file replaced atomically");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("out.csv");

        write_atomic(&path, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn test_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "committed").unwrap();

        // A directory cannot be replaced by a file rename.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("child"), "x").unwrap();
        assert!(write_atomic(&blocked, b"data").is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "committed");
    }
}
