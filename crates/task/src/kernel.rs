//! The run-once protocol shared by every task type
//!
//! A run merges input overrides, fingerprints the task, takes the
//! execution lock for that fingerprint, and then either reuses a valid
//! cached result (resumable tasks only) or executes inside the entry
//! directory. Persistence, observer end events, directory restore and
//! lock release happen whether or not execution succeeded; an execution
//! error is returned to the caller only after all of them.

use crate::observe::{Auditor, Messenger};
use cairn_cache::{
    fingerprint, CacheStore, ErrorRecord, FingerprintSource, KernelConfig, TaskResult,
    TaskSnapshot,
};
use cairn_core::{AuditFlags, Error, Record, RecordType, Result};
use cairn_utils::tracing::{cache_event, task_completed, task_span};
use cairn_utils::{ephemeral_cache_dir, ExecutionLock, WorkingDirGuard};
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// State every task carries, independent of how it executes
#[derive(Debug, Clone)]
pub struct TaskCore {
    kind: &'static str,
    name: String,
    version: Option<String>,
    inputs: Record,
    output_type: Arc<RecordType>,
    audit: AuditFlags,
    messengers: Vec<Arc<dyn Messenger>>,
    cache_dir: Option<PathBuf>,
    config: KernelConfig,
    pinned: Vec<&'static str>,
}

impl TaskCore {
    pub fn new(
        kind: &'static str,
        name: impl Into<String>,
        inputs: Record,
        output_type: Arc<RecordType>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            version: None,
            inputs,
            output_type,
            audit: AuditFlags::none(),
            messengers: Vec::new(),
            cache_dir: None,
            config: KernelConfig::default(),
            pinned: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn inputs(&self) -> &Record {
        &self.inputs
    }

    pub fn output_type(&self) -> &Arc<RecordType> {
        &self.output_type
    }

    pub fn audit(&self) -> &AuditFlags {
        &self.audit
    }

    pub fn messengers(&self) -> &[Arc<dyn Messenger>] {
        &self.messengers
    }

    /// Cache root this task is pinned to, once known
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    pub fn set_audit(&mut self, audit: AuditFlags) {
        self.audit = audit;
    }

    pub fn add_messenger(&mut self, messenger: Arc<dyn Messenger>) {
        self.messengers.push(messenger);
    }

    pub fn set_cache_dir(&mut self, dir: impl Into<PathBuf>) {
        self.cache_dir = Some(dir.into());
    }

    pub fn set_config(&mut self, config: KernelConfig) {
        self.config = config;
    }

    /// Refuse later overrides of `field` that change its current value
    pub fn pin_input(&mut self, field: &'static str) {
        if !self.pinned.contains(&field) {
            self.pinned.push(field);
        }
    }

    /// Replace the named input values wholesale
    pub fn set_inputs<I, K>(&mut self, overrides: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let overrides: Vec<(String, Value)> = overrides
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        for (name, value) in &overrides {
            if self.pinned.contains(&name.as_str()) && self.inputs.get(name) != Some(value) {
                return Err(Error::configuration(format!(
                    "input '{name}' of {} '{}' is fixed at construction",
                    self.kind, self.name
                )));
            }
        }
        self.inputs = self.inputs.replace(overrides)?;
        Ok(())
    }

    /// Fingerprint of the current name, version and inputs
    pub fn checksum(&self) -> Result<String> {
        fingerprint(FingerprintSource {
            kind: self.kind,
            name: &self.name,
            version: self.version.as_deref(),
            inputs: &self.inputs,
        })
    }

    /// Human-readable listing of input and output fields
    pub fn help(&self) -> String {
        let mut lines = vec![format!("Help for {} '{}'", self.kind, self.name)];
        lines.push("Input Parameters:".to_string());
        lines.extend(self.inputs.record_type().help_lines());
        lines.push("Output Parameters:".to_string());
        lines.extend(self.output_type.help_lines());
        lines.join("\n")
    }

    /// Resolve the cache root, allocating an ephemeral one if needed
    ///
    /// Once resolved, the root is absolute and sticks to this task.
    fn pin_cache_dir(&mut self) -> Result<PathBuf> {
        let root = match self.cache_dir.clone().or_else(|| self.config.cache_dir.clone()) {
            Some(root) => root,
            None => {
                let root = ephemeral_cache_dir()?;
                debug!(task = %self.name, root = %root.display(), "allocated ephemeral cache root");
                root
            }
        };
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map_err(|e| Error::file_system(".", "read current directory", e))?
                .join(root)
        };
        self.cache_dir = Some(root.clone());
        Ok(root)
    }

    fn snapshot(&self, checksum: &str, can_resume: bool) -> TaskSnapshot {
        TaskSnapshot {
            kind: self.kind.to_string(),
            name: self.name.clone(),
            version: self.version.clone(),
            checksum: checksum.to_string(),
            inputs: self.inputs.clone(),
            output_spec: self.output_type.info().clone(),
            audit: self.audit.clone(),
            can_resume,
            persisted_at: Utc::now(),
        }
    }
}

/// A unit of work the kernel can run once per fingerprint
pub trait Task {
    fn core(&self) -> &TaskCore;

    fn core_mut(&mut self) -> &mut TaskCore;

    /// Whether an existing entry directory is reused rather than wiped
    fn can_resume(&self) -> bool {
        false
    }

    /// Do the work. Runs with the entry directory as current directory.
    fn execute(&mut self) -> Result<()>;

    /// Raw outputs of the last `execute`, in output field order
    fn list_outputs(&self) -> Result<Vec<Value>>;

    /// Run with `overrides` applied to the inputs first
    fn run<I, K>(&mut self, overrides: I) -> Result<TaskResult>
    where
        Self: Sized,
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.core_mut().set_inputs(overrides)?;
        run(self)
    }

    fn checksum(&self) -> Result<String> {
        self.core().checksum()
    }

    fn help(&self) -> String {
        self.core().help()
    }

    /// Entry directory of the current fingerprint, if the cache root is known
    fn output_dir(&self) -> Result<Option<PathBuf>> {
        match self.core().cache_dir() {
            Some(root) => Ok(Some(root.join(self.checksum()?))),
            None => Ok(None),
        }
    }

    fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self
    where
        Self: Sized,
    {
        self.core_mut().set_cache_dir(dir);
        self
    }

    fn with_audit(mut self, audit: AuditFlags) -> Self
    where
        Self: Sized,
    {
        self.core_mut().set_audit(audit);
        self
    }

    fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self
    where
        Self: Sized,
    {
        self.core_mut().add_messenger(messenger);
        self
    }

    fn with_version(mut self, version: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.core_mut().set_version(version);
        self
    }

    fn with_config(mut self, config: KernelConfig) -> Self
    where
        Self: Sized,
    {
        self.core_mut().set_config(config);
        self
    }

    fn with_inputs<I, K>(mut self, overrides: I) -> Result<Self>
    where
        Self: Sized,
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.core_mut().set_inputs(overrides)?;
        Ok(self)
    }
}

/// Run `task` with its current inputs
pub fn run<T: Task + ?Sized>(task: &mut T) -> Result<TaskResult> {
    let root = task.core_mut().pin_cache_dir()?;
    let core = task.core();
    let store = CacheStore::new(root).with_locations(core.config.cache_locations.iter().cloned());

    let checksum = core.checksum()?;
    let name = core.name.clone();
    let span = task_span(&name, &checksum);
    let _entered = span.enter();

    let lock = ExecutionLock::acquire(&store.lock_path(&checksum), &core.config.lock)?;
    debug!(task = %name, lock = %lock.path().display(), "acquired execution lock");

    let resumable = task.can_resume();
    if resumable {
        if let Some(result) = reuse_cached(task, &store, &checksum)? {
            cache_event(&name, true, &checksum);
            return Ok(result);
        }
    }
    cache_event(&name, false, &checksum);

    let entry = store.prepare(&checksum, resumable)?;
    store.invalidate(&entry)?;

    let started = Instant::now();
    let core = task.core();
    let mut auditor = Auditor::new(
        core.audit.clone(),
        core.messengers.clone(),
        core.config.provenance.clone(),
        core.config.monitor.interval,
    );
    let output_type = Arc::clone(&core.output_type);

    let guard = WorkingDirGuard::enter(&entry)?;
    info!(task = %name, entry_dir = %entry.display(), "running task");
    auditor.start(&entry);

    let outcome = task
        .execute()
        .and_then(|()| task.list_outputs())
        .and_then(|raw| collect_outputs(&output_type, raw));

    let mut result = match &outcome {
        Ok(output) => TaskResult::new(Some(output.clone())),
        Err(e) => TaskResult::failed(Some(Record::absent(Arc::clone(&output_type))), e.to_string()),
    };
    auditor.finish(&mut result);

    // error marker first, then the result
    let marked = match &outcome {
        Ok(_) => Ok(()),
        Err(e) => store.record_error(
            &entry,
            &ErrorRecord {
                task: name.clone(),
                checksum: checksum.clone(),
                error: e.to_string(),
            },
        ),
    };
    let persisted = store.persist(&entry, &result, &task.core().snapshot(&checksum, resumable));
    let restored = guard.restore();
    drop(lock);

    task_completed(&name, started.elapsed().as_millis() as u64, outcome.is_ok());

    if let Err(e) = outcome {
        for cleanup_err in [marked.err(), persisted.err(), restored.err()].into_iter().flatten() {
            error!(task = %name, error = %cleanup_err, "cleanup failed after task error");
        }
        return Err(e);
    }
    persisted?;
    restored?;
    Ok(result)
}

/// A valid persisted result for this fingerprint, copied into the task's
/// own root when it was found in another cache location
fn reuse_cached<T: Task + ?Sized>(
    task: &T,
    store: &CacheStore,
    checksum: &str,
) -> Result<Option<TaskResult>> {
    let Some((found, result)) = store.lookup(checksum)? else {
        return Ok(None);
    };

    let own = store.entry_dir(checksum);
    if found != own {
        debug!(from = %found.display(), "reusing result from another cache location");
        let entry = store.prepare(checksum, true)?;
        store.persist(&entry, &result, &task.core().snapshot(checksum, true))?;
    }
    Ok(Some(result))
}

/// Zip raw outputs onto the output fields; missing ones stay null
fn collect_outputs(output_type: &Arc<RecordType>, raw: Vec<Value>) -> Result<Record> {
    let names: Vec<String> = output_type.field_names().map(str::to_string).collect();
    if raw.len() > names.len() {
        warn!(
            produced = raw.len(),
            declared = names.len(),
            "task produced more outputs than declared; extras dropped"
        );
    }
    Record::absent(Arc::clone(output_type)).replace(names.into_iter().zip(raw))
}
