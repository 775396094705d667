use super::segment::{bindings, compose, Segment};
use super::shell::{default_input_spec, shell_output_spec};
use super::{run_command_line, CommandLine};
use crate::kernel::{Task, TaskCore};
use cairn_core::{Error, Record, Result, SpecBase, SpecInfo};
use serde_json::Value;

/// Container runtime a [`ContainerTask`] targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Whatever `container` names; bind mounts unsupported
    Generic,
    Docker,
    Singularity,
}

impl ContainerRuntime {
    pub fn base(self) -> SpecBase {
        match self {
            ContainerRuntime::Generic => SpecBase::Container,
            ContainerRuntime::Docker => SpecBase::Docker,
            ContainerRuntime::Singularity => SpecBase::Singularity,
        }
    }

    pub fn kind(self) -> &'static str {
        match self {
            ContainerRuntime::Generic => "ContainerTask",
            ContainerRuntime::Docker => "DockerTask",
            ContainerRuntime::Singularity => "SingularityTask",
        }
    }

    /// Executable the `container` input must name, if fixed
    pub fn executable(self) -> Option<&'static str> {
        match self {
            ContainerRuntime::Generic => None,
            ContainerRuntime::Docker => Some("docker"),
            ContainerRuntime::Singularity => Some("singularity"),
        }
    }

    pub fn bind_flag(self) -> Option<&'static str> {
        match self {
            ContainerRuntime::Generic => None,
            ContainerRuntime::Docker => Some("-v"),
            ContainerRuntime::Singularity => Some("-B"),
        }
    }

    /// Segments in front of the wrapped program
    pub fn segments(self) -> Vec<Segment> {
        let mut segments = vec![Segment::Runtime, Segment::ExtraFlags];
        if let Some(flag) = self.bind_flag() {
            segments.push(Segment::Binds(flag));
        }
        segments.push(Segment::Image);
        segments
    }
}

/// A command task wrapped in `<runtime> run ... <image>`
#[derive(Debug, Clone)]
pub struct ContainerTask {
    core: TaskCore,
    runtime: ContainerRuntime,
    output: Option<Vec<Value>>,
}

impl ContainerTask {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_specs(ContainerRuntime::Generic, name, None, None)
    }

    pub fn docker(name: impl Into<String>) -> Result<Self> {
        Self::with_specs(ContainerRuntime::Docker, name, None, None)
    }

    pub fn singularity(name: impl Into<String>) -> Result<Self> {
        Self::with_specs(ContainerRuntime::Singularity, name, None, None)
    }

    pub fn with_specs(
        runtime: ContainerRuntime,
        name: impl Into<String>,
        input_spec: Option<SpecInfo>,
        output_spec: Option<SpecInfo>,
    ) -> Result<Self> {
        let input_spec = input_spec.unwrap_or_else(|| default_input_spec(runtime.base()));
        let output_spec = shell_output_spec(output_spec)?;
        Ok(Self {
            core: TaskCore::new(
                runtime.kind(),
                name,
                Record::new(input_spec.build()?),
                output_spec.build()?,
            ),
            runtime,
            output: None,
        })
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Everything up to and including the image reference
    pub fn container_args(&self) -> Result<Vec<String>> {
        let inputs = self.core.inputs();

        if let Some(expected) = self.runtime.executable() {
            match inputs.get("container").and_then(Value::as_str) {
                Some(actual) if actual != expected => {
                    return Err(Error::configuration(format!(
                        "{} requires container '{expected}', got '{actual}'",
                        self.runtime.kind()
                    )));
                }
                _ => {}
            }
        } else if !bindings(inputs)?.is_empty() {
            return Err(Error::configuration(
                "bind mounts need a docker or singularity runtime",
            ));
        }

        compose(&self.runtime.segments(), inputs)
    }

    /// The wrapped program: `executable` followed by `args`
    pub fn command_args(&self) -> Result<Vec<String>> {
        compose(&[Segment::Program], self.core.inputs())
    }
}

impl CommandLine for ContainerTask {
    fn command_line(&self) -> Result<Vec<String>> {
        let mut line = self.container_args()?;
        line.extend(self.command_args()?);
        Ok(line)
    }
}

impl Task for ContainerTask {
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
