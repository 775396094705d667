use cairn_core::{Error, Result};
use serde_json::Value;
use std::process::{Command, Stdio};

/// Captured outcome of a child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Values in the order of the shell output fields
    pub fn into_values(self) -> Vec<Value> {
        vec![
            Value::from(self.return_code),
            Value::from(self.stdout),
            Value::from(self.stderr),
        ]
    }
}

/// Run `args[0]` with the remaining arguments in the current directory
///
/// A non-zero exit is reported through `return_code`, not as an error.
/// A process killed by a signal reports the negated signal number.
pub fn execute(args: &[String]) -> Result<CommandOutput> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| Error::configuration("cannot execute an empty command line"))?;

    tracing::debug!(command = %program, args = ?rest, "spawning process");

    let output = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            Error::command_execution(
                program.as_str(),
                rest.to_vec(),
                format!("Failed to spawn process: {e}"),
                None,
            )
        })?;

    let return_code = match output.status.code() {
        Some(code) => code,
        None => signal_code(&output.status),
    };

    if return_code != 0 {
        tracing::debug!(command = %program, return_code, "process exited unsuccessfully");
    }

    Ok(CommandOutput {
        return_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(unix)]
fn signal_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map_or(1, |signal| -signal)
}

#[cfg(not(unix))]
fn signal_code(_status: &std::process::ExitStatus) -> i32 {
    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_captures_stdout() {
        let output = execute(&args(&["echo", "hi"])).unwrap();
        assert_eq!(output.return_code, 0);
        assert_eq!(output.stdout, "hi\n");
        assert_eq!(output.stderr, "");
    }

    #[test]
    fn test_non_zero_exit_is_not_an_error() {
        let output = execute(&args(&["sh", "-c", "echo oops >&2; exit 3"])).unwrap();
        assert_eq!(output.return_code, 3);
        assert_eq!(output.stderr, "oops\n");
    }

    #[test]
    fn test_missing_program() {
        let err = execute(&args(&["cairn-definitely-not-a-program"])).unwrap_err();
        assert!(matches!(err, Error::CommandExecution { .. }));
    }

    #[test]
    fn test_empty_command_line() {
        assert!(execute(&[]).unwrap_err().is_configuration());
    }
}
