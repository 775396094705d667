//! Command-line tasks: plain processes and container-wrapped processes

pub mod container;
pub mod segment;
pub mod shell;

pub use container::{ContainerRuntime, ContainerTask};
pub use segment::{compose, Binding, Segment};
pub use shell::ShellCommandTask;

use crate::runner;
use cairn_core::{Error, Result};
use serde_json::Value;

/// Tasks whose work is a single command line
pub trait CommandLine {
    /// The full argument vector, program first
    fn command_line(&self) -> Result<Vec<String>>;

    /// The command line joined with spaces
    fn cmdline(&self) -> Result<String> {
        Ok(self.command_line()?.join(" "))
    }
}

/// Execute `line` and return `[return_code, stdout, stderr]`
pub(crate) fn run_command_line(line: &[String]) -> Result<Vec<Value>> {
    if line.is_empty() {
        return Err(Error::configuration(
            "command line is empty; set `executable` or `args`",
        ));
    }
    Ok(runner::execute(line)?.into_values())
}
