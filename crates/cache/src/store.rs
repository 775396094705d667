//! On-disk cache of task results
//!
//! Layout under a cache root:
//!
//! ```text
//! <root>/<checksum>/_result.json
//! <root>/<checksum>/_task.json
//! <root>/<checksum>/_error.json   (failed runs only)
//! <root>/<checksum>.lock
//! ```
//!
//! The store never locks anything itself. Callers mutate an entry
//! directory only while holding the execution lock at [`CacheStore::lock_path`].

use crate::entry::{ErrorRecord, TaskResult, TaskSnapshot};
use cairn_core::{Error, Result, ERROR_FILE, LOCK_SUFFIX, RESULT_FILE, TASK_SNAPSHOT_FILE};
use cairn_utils::write_json_atomic;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    locations: Vec<PathBuf>,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locations: Vec::new(),
        }
    }

    /// Extra read-only roots consulted by [`CacheStore::lookup`]
    pub fn with_locations(mut self, locations: impl IntoIterator<Item = PathBuf>) -> Self {
        self.locations.extend(locations);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    pub fn entry_dir(&self, checksum: &str) -> PathBuf {
        self.root.join(checksum)
    }

    /// Sidecar lock file, next to the entry directory rather than inside it
    pub fn lock_path(&self, checksum: &str) -> PathBuf {
        self.root.join(format!("{checksum}.{LOCK_SUFFIX}"))
    }

    /// Make the entry directory ready for a run
    ///
    /// A non-resumable entry is wiped and recreated. A resumable one is
    /// reused as is.
    pub fn prepare(&self, checksum: &str, resumable: bool) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .map_err(|e| Error::file_system(&self.root, "create cache root", e))?;

        let entry = self.entry_dir(checksum);
        if !resumable && entry.exists() {
            debug!(entry_dir = %entry.display(), "wiping non-resumable entry");
            fs::remove_dir_all(&entry)
                .map_err(|e| Error::file_system(&entry, "remove stale entry directory", e))?;
        }
        fs::create_dir_all(&entry)
            .map_err(|e| Error::file_system(&entry, "create entry directory", e))?;
        Ok(entry)
    }

    /// Write the result and the task snapshot
    pub fn persist(&self, entry: &Path, result: &TaskResult, snapshot: &TaskSnapshot) -> Result<()> {
        write_json_atomic(&entry.join(RESULT_FILE), result)?;
        write_json_atomic(&entry.join(TASK_SNAPSHOT_FILE), snapshot)?;
        debug!(entry_dir = %entry.display(), "persisted result");
        Ok(())
    }

    pub fn record_error(&self, entry: &Path, record: &ErrorRecord) -> Result<()> {
        write_json_atomic(&entry.join(ERROR_FILE), record)
    }

    pub fn clear_error(&self, entry: &Path) -> Result<()> {
        let path = entry.join(ERROR_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_system(path, "remove error marker", e)),
        }
    }

    /// Drop the result and error marker left by an earlier run
    ///
    /// Called before a fresh execution in a reused entry, so an
    /// interrupted run leaves nothing that reads as a valid result.
    pub fn invalidate(&self, entry: &Path) -> Result<()> {
        let path = entry.join(RESULT_FILE);
        match fs::remove_file(&path) {
            Ok(()) => debug!(entry_dir = %entry.display(), "removed previous result"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::file_system(path, "remove previous result", e)),
        }
        self.clear_error(entry)
    }

    pub fn has_error(&self, entry: &Path) -> bool {
        entry.join(ERROR_FILE).is_file()
    }

    /// Previously persisted result, if present and well-formed
    ///
    /// A malformed file reads as absent so the entry is recomputed.
    pub fn load(&self, entry: &Path) -> Result<Option<TaskResult>> {
        let path = entry.join(RESULT_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::file_system(path, "read result", e)),
        };

        match serde_json::from_str(&content) {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed result");
                Ok(None)
            }
        }
    }

    pub fn load_snapshot(&self, entry: &Path) -> Result<Option<TaskSnapshot>> {
        let path = entry.join(TASK_SNAPSHOT_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| Error::json(format!("invalid task snapshot {}", path.display()), e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::file_system(path, "read task snapshot", e)),
        }
    }

    /// Valid result for `checksum`: parsed, not failed and not marked as failed
    ///
    /// The store's own root is searched first, then the extra locations.
    pub fn lookup(&self, checksum: &str) -> Result<Option<(PathBuf, TaskResult)>> {
        for root in std::iter::once(&self.root).chain(self.locations.iter()) {
            let entry = root.join(checksum);
            if !entry.is_dir() || self.has_error(&entry) {
                continue;
            }
            match self.load(&entry)? {
                Some(result) if result.is_failed() => {
                    debug!(entry_dir = %entry.display(), "skipping failed result");
                }
                Some(result) => return Ok(Some((entry, result))),
                None => {}
            }
        }
        Ok(None)
    }
}
