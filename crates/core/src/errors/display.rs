//! Display implementations for error types

use super::types::Error;
use std::fmt;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration { message } => {
                write!(f, "configuration error: {message}")
            }
            Error::Schema {
                spec,
                field,
                message,
            } => {
                write!(f, "field '{field}' of '{spec}': {message}")
            }
            Error::CommandExecution {
                command,
                args,
                message,
                exit_code,
            } => {
                let args_str = args.join(" ");
                let full = if args_str.is_empty() {
                    command.clone()
                } else {
                    format!("{command} {args_str}")
                };
                match exit_code {
                    Some(code) => {
                        write!(f, "command '{full}' failed with exit code {code}: {message}")
                    }
                    None => write!(f, "command '{full}' failed: {message}"),
                }
            }
            Error::Execution { task, message } => {
                write!(f, "task '{task}' failed: {message}")
            }
            Error::FileSystem {
                path,
                operation,
                source,
            } => {
                write!(
                    f,
                    "file system {} operation failed for '{}': {}",
                    operation,
                    path.display(),
                    source
                )
            }
            Error::Json { message, .. } => {
                write!(f, "JSON error: {message}")
            }
            Error::Lock { path, message, .. } => {
                write!(f, "lock '{}' error: {message}", path.display())
            }
            Error::Timeout {
                operation,
                duration,
            } => {
                write!(f, "operation '{operation}' timed out after {duration:?}")
            }
        }
    }
}
