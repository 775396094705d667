use super::segment::{compose, Segment};
use super::{run_command_line, CommandLine};
use crate::kernel::{Task, TaskCore};
use cairn_core::{Error, FieldSpec, FieldType, Record, Result, SpecBase, SpecInfo};
use serde_json::Value;

/// Runs `executable` plus `args` as a child process
///
/// Outputs are `return_code`, `stdout` and `stderr`, followed by any
/// fields the output spec declares itself (left null).
#[derive(Debug, Clone)]
pub struct ShellCommandTask {
    core: TaskCore,
    output: Option<Vec<Value>>,
}

impl ShellCommandTask {
    pub const KIND: &'static str = "ShellCommandTask";

    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_specs(name, None, None)
    }

    /// Custom specs; the output spec must build on [`SpecBase::ShellOutput`]
    pub fn with_specs(
        name: impl Into<String>,
        input_spec: Option<SpecInfo>,
        output_spec: Option<SpecInfo>,
    ) -> Result<Self> {
        let input_spec = input_spec.unwrap_or_else(|| default_input_spec(SpecBase::Shell));
        let output_spec = shell_output_spec(output_spec)?;
        Ok(Self {
            core: TaskCore::new(
                Self::KIND,
                name,
                Record::new(input_spec.build()?),
                output_spec.build()?,
            ),
            output: None,
        })
    }

    /// `executable` followed by `args`; no other input is forwarded
    pub fn command_args(&self) -> Result<Vec<String>> {
        compose(&[Segment::Program], self.core.inputs())
    }
}

impl CommandLine for ShellCommandTask {
    fn command_line(&self) -> Result<Vec<String>> {
        self.command_args()
    }
}

impl Task for ShellCommandTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn execute(&mut self) -> Result<()> {
        self.output = None;
        self.output = Some(run_command_line(&self.command_line()?)?);
        Ok(())
    }

    fn list_outputs(&self) -> Result<Vec<Value>> {
        Ok(self.output.clone().unwrap_or_default())
    }
}

/// `args` on top of `base`
pub(crate) fn default_input_spec(base: SpecBase) -> SpecInfo {
    SpecInfo::new("Inputs", base).field(
        FieldSpec::new("args", FieldType::list(FieldType::Str))
            .with_default(Value::Array(Vec::new()))
            .with_help("arguments after the executable"),
    )
}

pub(crate) fn shell_output_spec(output_spec: Option<SpecInfo>) -> Result<SpecInfo> {
    match output_spec {
        None => Ok(SpecInfo::new("Output", SpecBase::ShellOutput)),
        Some(spec) if spec.base == SpecBase::ShellOutput => Ok(spec),
        Some(spec) => Err(Error::configuration(format!(
            "output spec '{}' of a command task must use the shell output base",
            spec.name
        ))),
    }
}
