//! Shared utilities for cairn
//!
//! Filesystem helpers that the cache store and the task kernel both lean
//! on: atomic artifact writes, the cross-process execution lock, the
//! working-directory guard, cache-root locations and tracing setup.

pub mod atomic_file;
pub mod lock;
pub mod tracing;
pub mod workdir;
pub mod xdg;

pub use atomic_file::*;
pub use lock::{ExecutionLock, LockConfig};
pub use workdir::WorkingDirGuard;
pub use xdg::*;
