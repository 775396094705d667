//! RAII guard around the process working directory
//!
//! The working directory is process-wide state. Whoever holds a
//! [`WorkingDirGuard`] owns it until the guard is restored or dropped, so
//! concurrent guards in one process must be serialized by the caller.

use cairn_core::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Changes into a directory and changes back when dropped
#[derive(Debug)]
pub struct WorkingDirGuard {
    original: PathBuf,
    restored: bool,
}

impl WorkingDirGuard {
    /// Remember the current directory, then enter `dir`
    pub fn enter(dir: &Path) -> Result<Self> {
        let original = env::current_dir()
            .map_err(|e| Error::file_system(".", "read current directory", e))?;
        env::set_current_dir(dir)
            .map_err(|e| Error::file_system(dir, "enter working directory", e))?;
        tracing::trace!(from = %original.display(), to = %dir.display(), "entered directory");
        Ok(Self {
            original,
            restored: false,
        })
    }

    /// Directory that will be restored
    pub fn original(&self) -> &Path {
        &self.original
    }

    /// Restore explicitly so a failure can be reported
    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        env::set_current_dir(&self.original)
            .map_err(|e| Error::file_system(&self.original, "restore working directory", e))
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = env::set_current_dir(&self.original) {
            tracing::error!(
                directory = %self.original.display(),
                error = %e,
                "failed to restore working directory"
            );
        }
    }
}
