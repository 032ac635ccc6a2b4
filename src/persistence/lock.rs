//! Advisory data directory lock
//!
//! One process at a time may own a data directory. The lock is an exclusive
//! `flock`-style lock on `{data_dir}/.lock`, held until the guard is dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{ErrorContext, LedgerError, Result};

pub const LOCK_FILENAME: &str = ".lock";

/// Holds the exclusive lock on a data directory
#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    /// Take the lock without blocking. Fails with `IoFailure` if another
    /// handle already owns it.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILENAME);
        let context = || ErrorContext::new("persistence", "lock");

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LedgerError::io(e, context()))?;

        file.try_lock_exclusive().map_err(|e| {
            LedgerError::io_message(
                format!(
                    "data directory {} is locked by another process: {}",
                    dir.display(),
                    e
                ),
                context(),
            )
        })?;

        tracing::debug!(path = %path.display(), "acquired data directory lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release data directory lock");
        }
    }
}
