//! Extension traits for error handling

use super::types::{Error, Result};

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a lazy message
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", message.into(), base_error),
            }
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", f(), base_error),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_as_configuration() {
        let raw: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk on fire"));
        let err = raw.context("loading spec").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("loading spec"));
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_display_command_with_exit_code() {
        let err = Error::command_execution("ls", vec!["-l".into()], "boom", Some(2));
        assert_eq!(
            err.to_string(),
            "command 'ls -l' failed with exit code 2: boom"
        );
    }
}
