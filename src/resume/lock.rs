//! Output directory lock
//!
//! Two harvest runs sharing one output directory would interleave sink writes
//! and checkpoint saves. `RunLock` holds an exclusive advisory lock for the
//! lifetime of a run.

use super::state::ResumeError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock file name inside the output directory
pub const RUN_LOCK_FILE: &str = ".harvest.lock";

/// Exclusive lock over an output directory, released on drop
pub struct RunLock {
    _lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Try to lock `output_dir` without blocking
    ///
    /// Fails immediately with [`ResumeError::LockError`] if another run holds it.
    pub fn try_acquire(output_dir: &Path) -> Result<Self, ResumeError> {
        std::fs::create_dir_all(output_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let path = output_dir.join(RUN_LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        let guard = lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "{} is in use by another run: {e}",
                output_dir.display()
            ))
        })?;
        // The OS lock lives as long as the file handle; closing it on drop releases it.
        std::mem::forget(guard);

        debug!(path = %path.display(), "Acquired run lock");
        Ok(Self { _lock: lock, path })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
