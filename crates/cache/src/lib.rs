//! Result cache for cairn tasks
//!
//! - Content fingerprints of a task's identity and inputs
//! - Entry directories holding the persisted result and task snapshot
//! - Kernel configuration (cache roots, lock lease, sampling, provenance)

pub mod config;
pub mod entry;
pub mod fingerprint;
pub mod store;

pub use config::{KernelConfig, MonitorConfig};
pub use entry::{ErrorRecord, RuntimeSummary, TaskResult, TaskSnapshot};
pub use fingerprint::{canonical_json, fingerprint, ContentHasher, FingerprintSource};
pub use store::CacheStore;
