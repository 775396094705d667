use cairn_core::{Error, Result, EPHEMERAL_CACHE_PREFIX};
use std::env;
use std::path::PathBuf;

/// XDG Base Directory paths for cairn
pub struct XdgPaths;

impl XdgPaths {
    /// Get XDG_CACHE_HOME/cairn or fallback
    pub fn cache_dir() -> PathBuf {
        env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|home| home.join(".cache"))
                    .unwrap_or_else(|| PathBuf::from(".cache"))
            })
            .join("cairn")
    }

    /// Get XDG_STATE_HOME/cairn or fallback
    pub fn state_dir() -> PathBuf {
        env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|home| home.join(".local/state"))
                    .unwrap_or_else(|| PathBuf::from(".local/state"))
            })
            .join("cairn")
    }
}

/// Allocate a fresh, persistent temporary directory to serve as a cache root.
///
/// The directory outlives this call; whoever pins it owns its lifetime.
pub fn ephemeral_cache_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(EPHEMERAL_CACHE_PREFIX)
        .tempdir()
        .map_err(|e| Error::file_system(env::temp_dir(), "create ephemeral cache root", e))?;
    Ok(dir.into_path())
}
