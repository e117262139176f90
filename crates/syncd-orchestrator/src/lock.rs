use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::OrchestratorError;

/// Holds an exclusive OS lock on the install directory's lock file for the
/// lifetime of the process. Dropped (and released) on shutdown.
pub struct InstanceLock {
    path: PathBuf,
    _file: File,
}

impl InstanceLock {
    /// Creates the lock file if absent and acquires an exclusive, non-blocking
    /// lock. `OrchestratorError::AlreadyRunning` if another process holds it
    /// (exit code 1 per the external-interfaces spec).
    pub fn acquire(path: &Path) -> Result<Self, OrchestratorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).write(true).open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| OrchestratorError::AlreadyRunning(path.display().to_string()))?;
        Ok(InstanceLock { path: path.to_path_buf(), _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self._file.unlock();
    }
}
