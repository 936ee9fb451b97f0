//! Checkpoint persistence
//!
//! The checkpoint is a single JSON object, `{"last_page": n, "total_records": m}`,
//! overwritten atomically after every successful sink flush.

use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Maximum allowed checkpoint file size (1 MiB); anything larger is not ours
pub const MAX_STATE_FILE_SIZE: u64 = 1024 * 1024;

/// Durable progress of a harvest run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Last page whose records are durably in the sink (0 = none)
    pub last_page: u64,
    /// Number of records durably in the sink
    pub total_records: u64,
}

impl CheckpointState {
    /// Create a checkpoint state
    pub fn new(last_page: u64, total_records: u64) -> Self {
        Self {
            last_page,
            total_records,
        }
    }

    /// Whether this is the zero value, i.e. nothing has been committed yet
    pub fn is_fresh(&self) -> bool {
        self.last_page == 0 && self.total_records == 0
    }

    /// First page the next run should fetch
    pub fn resume_page(&self) -> u64 {
        self.last_page + 1
    }

    /// Whether `self` could legally be saved over `previous`
    pub fn follows(&self, previous: &CheckpointState) -> bool {
        self.last_page >= previous.last_page && self.total_records >= previous.total_records
    }
}

/// Durable single-record checkpoint store
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Create a store backed by the given file
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn open_lock_file(&self) -> Result<std::fs::File, ResumeError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ResumeError::IoError(e.to_string()))?;
            }
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))
    }

    /// Whether a checkpoint file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the checkpoint, or the zero value if none exists
    ///
    /// A file that exists but cannot be read or parsed is reported as
    /// [`ResumeError::Corrupt`]; it is never treated as a fresh start.
    pub fn load(&self) -> Result<CheckpointState, ResumeError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No checkpoint found, starting fresh");
            return Ok(CheckpointState::default());
        }

        let lock = RwLock::new(self.open_lock_file()?);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let state = self.read_unlocked()?.unwrap_or_default();
        info!(
            last_page = state.last_page,
            total_records = state.total_records,
            "Checkpoint loaded"
        );
        Ok(state)
    }

    /// Read the file without taking the lock; callers must hold it
    fn read_unlocked(&self) -> Result<Option<CheckpointState>, ResumeError> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ResumeError::Corrupt(format!("cannot stat checkpoint: {e}"))),
        };
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::Corrupt(format!(
                "checkpoint is {} bytes (max {MAX_STATE_FILE_SIZE})",
                metadata.len()
            )));
        }

        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| ResumeError::Corrupt(format!("cannot read checkpoint: {e}")))?;

        serde_json::from_str(&contents).map(Some).map_err(|e| {
            warn!(error = %e, path = %self.path.display(), "Malformed checkpoint");
            ResumeError::Corrupt(e.to_string())
        })
    }

    /// Atomically overwrite the checkpoint
    ///
    /// Writes to a temp file in the same directory, fsyncs it, renames it over
    /// the target and fsyncs the directory. A state that would move progress
    /// backwards is rejected with [`ResumeError::Regression`].
    pub fn save(&self, state: &CheckpointState) -> Result<(), ResumeError> {
        let json = serde_json::to_string(state)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let mut lock = RwLock::new(self.open_lock_file()?);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        if let Some(previous) = self.read_unlocked()? {
            if !state.follows(&previous) {
                return Err(ResumeError::Regression {
                    previous,
                    attempted: *state,
                });
            }
        }

        let parent_dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist checkpoint: {e}")))?;

        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        debug!(
            last_page = state.last_page,
            total_records = state.total_records,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Remove the checkpoint; a missing file is not an error
    pub fn clear(&self) -> Result<(), ResumeError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Checkpoint cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ResumeError::IoError(format!("Failed to remove checkpoint: {e}"))),
        }
        let _ = std::fs::remove_file(self.lock_path());
        Ok(())
    }
}

/// Errors related to checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Checkpoint exists but is unreadable or malformed
    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),

    /// Attempt to move the checkpoint backwards
    #[error("checkpoint regression: {attempted:?} would replace {previous:?}")]
    Regression {
        /// State currently on disk
        previous: CheckpointState,
        /// State that was rejected
        attempted: CheckpointState,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
