//! Task execution for cairn
//!
//! Every task type implements [`Task`] and runs through the same kernel:
//! at most one concurrent execution per fingerprint and cache root, a
//! persisted result in the entry directory, and guaranteed cleanup.
//!
//! - [`FunctionTask`] calls a function from a [`FunctionRegistry`]
//! - [`ShellCommandTask`] runs a child process
//! - [`ContainerTask`] wraps the process in a docker, singularity or
//!   generic container runtime

pub mod command;
pub mod function;
pub mod kernel;
pub mod observe;
pub mod runner;

pub use command::{Binding, CommandLine, ContainerRuntime, ContainerTask, Segment, ShellCommandTask};
pub use function::{
    Arguments, FunctionRegistry, FunctionSignature, FunctionTask, RegisteredFunction,
    ReturnAnnotation, Returned,
};
pub use kernel::{run, Task, TaskCore};
pub use observe::{
    Auditor, FileMessenger, Messenger, RecordingMessenger, ResourceMonitor, ResourceSampler,
    TracingMessenger,
};

pub use cairn_cache::{KernelConfig, TaskResult};
