//! Cross-process execution lock keyed by a lock-file path
//!
//! The lock is an advisory `flock` on `<fingerprint>.lock`. The operating
//! system drops the lock when the holding process exits, so a crashed
//! holder never blocks later callers forever; [`LockConfig::timeout`] adds
//! an upper bound on how long a live holder may be waited for.
//!
//! The lock file is removed on release. Because a waiter may have opened
//! the file before it was unlinked, every acquisition re-checks that the
//! locked file is still the one at `path` and starts over if not.

use cairn_core::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How acquisition waits for a held lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Give up after this long. `None` waits as long as the holder lives.
    pub timeout: Option<Duration>,
    /// First retry delay when polling under a timeout
    pub poll_interval: Duration,
    /// Upper bound of the exponential backoff
    pub max_backoff: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Guard holding the execution lock; released on drop
#[derive(Debug)]
pub struct ExecutionLock {
    file: File,
    path: PathBuf,
}

impl ExecutionLock {
    /// Block until the lock at `path` is held by this guard
    pub fn acquire(path: &Path, config: &LockConfig) -> Result<Self> {
        let deadline = config.timeout.map(|t| (Instant::now() + t, t));
        let mut contended = false;

        loop {
            let file = open_lock_file(path)?;

            match deadline {
                None => {
                    if let Err(e) = file.try_lock_exclusive() {
                        if e.kind() != io::ErrorKind::WouldBlock {
                            return Err(Error::lock(path, "acquire exclusive lock", Some(e)));
                        }
                        tracing::debug!(lock = %path.display(), "waiting for lock holder");
                        file.lock_exclusive()
                            .map_err(|e| Error::lock(path, "acquire exclusive lock", Some(e)))?;
                    }
                }
                Some((until, timeout)) => {
                    poll_lock(&file, path, config, until, timeout, &mut contended)?;
                }
            }

            if is_current(&file, path)? {
                tracing::trace!(lock = %path.display(), "lock acquired");
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            // Previous holder unlinked the file while we waited on it
            let _ = FileExt::unlock(&file);
        }
    }

    /// Take the lock only if nobody holds it
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) if is_current(&file, path)? => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::lock(path, "acquire exclusive lock", Some(e))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ExecutionLock {
    fn drop(&mut self) {
        // Unlink while still holding the lock so no new opener sees a free stale file
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(lock = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::file_system(parent, "create lock directory", e))?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| Error::lock(path, "open lock file", Some(e)))
}

fn poll_lock(
    file: &File,
    path: &Path,
    config: &LockConfig,
    until: Instant,
    timeout: Duration,
    contended: &mut bool,
) -> Result<()> {
    let mut backoff = config.poll_interval.max(Duration::from_millis(1));
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= until {
                    return Err(Error::timeout(
                        format!("acquire lock '{}'", path.display()),
                        timeout,
                    ));
                }
                if !*contended {
                    tracing::debug!(lock = %path.display(), ?timeout, "waiting for lock holder");
                    *contended = true;
                }

                // Exponential backoff with up to 25% jitter
                let jitter_ms = (backoff.as_millis() as u64 / 4).max(1);
                let sleep = backoff + Duration::from_millis(fastrand::u64(0..jitter_ms));
                let remaining = until.saturating_duration_since(Instant::now());
                std::thread::sleep(sleep.min(remaining));
                backoff = (backoff * 2).min(config.max_backoff);
            }
            Err(e) => return Err(Error::lock(path, "acquire exclusive lock", Some(e))),
        }
    }
}

#[cfg(unix)]
fn is_current(file: &File, path: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file
        .metadata()
        .map_err(|e| Error::lock(path, "stat locked file", Some(e)))?;
    match fs::metadata(path) {
        Ok(on_disk) => Ok(on_disk.ino() == held.ino() && on_disk.dev() == held.dev()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::lock(path, "stat lock path", Some(e))),
    }
}

#[cfg(not(unix))]
fn is_current(_file: &File, path: &Path) -> Result<bool> {
    Ok(path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc.lock");

        let first = ExecutionLock::acquire(&path, &LockConfig::default()).unwrap();
        assert!(ExecutionLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(!path.exists());

        let again = ExecutionLock::try_acquire(&path).unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn test_timeout_while_held() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("held.lock");
        let _held = ExecutionLock::acquire(&path, &LockConfig::default()).unwrap();

        let config = LockConfig {
            timeout: Some(Duration::from_millis(50)),
            ..LockConfig::default()
        };
        let err = ExecutionLock::acquire(&path, &config).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn test_threads_never_overlap() {
        let temp_dir = TempDir::new().unwrap();
        let path = Arc::new(temp_dir.path().join("shared.lock"));
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = Arc::clone(&path);
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..5 {
                        let _guard = ExecutionLock::acquire(&path, &LockConfig::default()).unwrap();
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
