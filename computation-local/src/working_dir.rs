//! Scoped working directories
//!
//! A [`WorkingDirectory`] is created on construction and removed by
//! [`close`](WorkingDirectory::close) or, failing that, on drop. Directories
//! opened in debug mode are kept for inspection instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name prefix of the directory shared by all batches of an engine
pub const COMMON_DIR_PREFIX: &str = "itools_common_";

#[derive(Debug)]
pub struct WorkingDirectory {
    path: PathBuf,
    debug: bool,
    closed: bool,
}

impl WorkingDirectory {
    /// Create a uniquely named directory `<base>/<prefix><suffix>`
    pub fn scoped(base: &Path, prefix: &str, debug: bool) -> io::Result<Self> {
        fs::create_dir_all(base)?;
        let path = base.join(format!("{}{}", prefix, Uuid::new_v4().simple()));
        fs::create_dir(&path)?;
        debug!("Created working directory {}", path.display());
        Ok(Self {
            path,
            debug,
            closed: false,
        })
    }

    /// Create the engine-wide common directory under `base`
    pub fn common(base: &Path) -> io::Result<Self> {
        Self::scoped(base, COMMON_DIR_PREFIX, false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the directory; later calls do nothing
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.debug {
            info!("Working directory {} kept for debugging", self.path.display());
            return Ok(());
        }

        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!("Removed working directory {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to remove working directory {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_directory_is_removed_on_close() {
        let base = tempfile::tempdir().unwrap();
        let mut dir = WorkingDirectory::scoped(base.path(), "batch_", false).unwrap();
        let path = dir.path().to_path_buf();

        assert!(path.is_dir());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("batch_"));
        fs::write(path.join("input.txt"), b"data").unwrap();

        dir.close().unwrap();
        assert!(dir.is_closed());
        assert!(!path.exists());

        // idempotent
        dir.close().unwrap();
    }

    #[test]
    fn test_scoped_directories_are_unique() {
        let base = tempfile::tempdir().unwrap();
        let first = WorkingDirectory::scoped(base.path(), "batch_", false).unwrap();
        let second = WorkingDirectory::scoped(base.path(), "batch_", false).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_debug_directory_is_kept() {
        let base = tempfile::tempdir().unwrap();
        let mut dir = WorkingDirectory::scoped(base.path(), "debug_", true).unwrap();
        let path = dir.path().to_path_buf();

        dir.close().unwrap();
        assert!(dir.is_closed());
        assert!(path.is_dir());
    }

    #[test]
    fn test_drop_releases_directory() {
        let base = tempfile::tempdir().unwrap();
        let path = {
            let dir = WorkingDirectory::scoped(base.path(), "batch_", false).unwrap();
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_common_directory_prefix_and_missing_base() {
        let base = tempfile::tempdir().unwrap();
        let nested = base.path().join("not").join("yet");
        let common = WorkingDirectory::common(&nested).unwrap();
        assert!(common.path().starts_with(&nested));
        assert!(common
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(COMMON_DIR_PREFIX));
    }
}
