//! Observers of a task run: provenance messengers and resource sampling

pub mod auditor;
pub mod messenger;
pub mod monitor;

pub use auditor::Auditor;
pub use messenger::{FileMessenger, Messenger, RecordingMessenger, TracingMessenger};
pub use monitor::{gather_runtime_info, ResourceMonitor, ResourceSampler};
