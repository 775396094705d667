//! Core error type definitions

use std::path::PathBuf;

/// Result type alias for cairn operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cairn operations using thiserror
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors: raised eagerly, never retried
    Configuration { message: String },

    /// An input or output field could not be resolved against its schema
    Schema {
        spec: String,
        field: String,
        message: String,
    },

    /// Command execution errors (spawn or wait failures)
    CommandExecution {
        command: String,
        args: Vec<String>,
        message: String,
        exit_code: Option<i32>,
    },

    /// A task's own execute step failed
    Execution { task: String, message: String },

    /// File system operations
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Execution lock primitive failures
    Lock {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Operation timeout errors
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },
}
