//! Artifacts persisted in an entry directory

use cairn_core::{AuditFlags, Record, SpecInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one `run`
///
/// `output` is `None` when the run failed before any output record was
/// assembled. Fields the task never produced stay null inside the record.
/// `error` is set on the result of a failed run; such a result is never
/// reused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub output: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn new(output: Option<Record>) -> Self {
        Self {
            output,
            runtime: None,
            error: None,
        }
    }

    pub fn failed(output: Option<Record>, error: impl Into<String>) -> Self {
        Self {
            output,
            runtime: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Output value by field name, `None` when absent or null
    pub fn output_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.output
            .as_ref()
            .and_then(|record| record.get(name))
            .filter(|value| !value.is_null())
    }
}

/// Peak resource usage observed while a task ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSummary {
    pub rss_peak_gb: f64,
    pub vms_peak_gb: f64,
    pub cpu_peak_percent: f64,
}

/// Snapshot of the task that produced an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub kind: String,
    pub name: String,
    pub version: Option<String>,
    pub checksum: String,
    pub inputs: Record,
    pub output_spec: SpecInfo,
    pub audit: AuditFlags,
    pub can_resume: bool,
    pub persisted_at: DateTime<Utc>,
}

/// Marker left next to the result of a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub task: String,
    pub checksum: String,
    pub error: String,
}
