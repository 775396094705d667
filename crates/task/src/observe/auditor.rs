use super::messenger::Messenger;
use super::monitor::{ResourceMonitor, ResourceSampler};
use cairn_cache::TaskResult;
use cairn_core::audit::{gen_uid, make_message, now};
use cairn_core::{AuditCapability, AuditFlags, AuditMessage, ProvenanceContext};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Emits provenance events and drives resource sampling for one run
///
/// Observer failures are logged and swallowed; they never fail a run.
pub struct Auditor {
    flags: AuditFlags,
    messengers: Vec<Arc<dyn Messenger>>,
    context: ProvenanceContext,
    interval: Duration,
    sampler: Option<Box<dyn ResourceSampler>>,
    task_id: Option<String>,
    monitor_id: Option<String>,
}

impl Auditor {
    pub fn new(
        flags: AuditFlags,
        messengers: Vec<Arc<dyn Messenger>>,
        context: ProvenanceContext,
        interval: Duration,
    ) -> Self {
        Self {
            flags,
            messengers,
            context,
            interval,
            sampler: None,
            task_id: None,
            monitor_id: None,
        }
    }

    /// Use `sampler` instead of a [`ResourceMonitor`] on the current process
    pub fn with_sampler(mut self, sampler: Box<dyn ResourceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn enabled(&self, capability: AuditCapability) -> bool {
        self.flags.contains(capability)
    }

    /// Send `message` to every messenger if `capability` is enabled
    pub fn audit(&self, message: &AuditMessage, capability: AuditCapability) {
        if !self.enabled(capability) {
            return;
        }
        let message = make_message(message, &self.context);
        for messenger in &self.messengers {
            if let Err(e) = messenger.send(&message) {
                tracing::warn!(
                    messenger = ?messenger,
                    error = %e,
                    "failed to deliver provenance message"
                );
            }
        }
    }

    /// Task start, then monitor start
    pub fn start(&mut self, log_dir: &Path) {
        let task_id = gen_uid();
        self.audit(
            &AuditMessage::new(&task_id)
                .with("@type", "task")
                .with("startedAtTime", now()),
            AuditCapability::Provenance,
        );

        if self.enabled(AuditCapability::Resource) {
            let interval = self.interval;
            let sampler = self
                .sampler
                .get_or_insert_with(|| Box::new(ResourceMonitor::current(log_dir, interval)));
            match sampler.start() {
                Ok(()) => {
                    let monitor_id = gen_uid();
                    self.audit(
                        &AuditMessage::new(&monitor_id)
                            .with("@type", "monitor")
                            .with("startedAtTime", now())
                            .with("wasStartedBy", task_id.as_str()),
                        AuditCapability::Provenance,
                    );
                    self.monitor_id = Some(monitor_id);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to start resource monitor");
                    self.sampler = None;
                }
            }
        }

        self.task_id = Some(task_id);
    }

    /// Stop sampling, fold the runtime into `result`, then close the task
    pub fn finish(&mut self, result: &mut TaskResult) {
        let task_id = self.task_id.take().unwrap_or_else(gen_uid);

        if let Some(mut sampler) = self.sampler.take() {
            if let Err(e) = sampler.stop() {
                tracing::warn!(error = %e, "failed to stop resource monitor");
            }
            match sampler.summary() {
                Ok(summary) => result.runtime = summary,
                Err(e) => tracing::warn!(error = %e, "failed to read resource log"),
            }

            if let Some(monitor_id) = self.monitor_id.take() {
                self.audit(
                    &AuditMessage::new(&monitor_id)
                        .with("endedAtTime", now())
                        .with("wasEndedBy", task_id.as_str()),
                    AuditCapability::Provenance,
                );

                let entity_id = gen_uid();
                let runtime = match result.runtime.map(serde_json::to_value) {
                    Some(Ok(Value::Object(fields))) => fields,
                    _ => serde_json::Map::new(),
                };
                self.audit(
                    &AuditMessage::new(&entity_id)
                        .merge(runtime)
                        .with("@type", "runtime")
                        .with("prov:wasGeneratedBy", task_id.as_str()),
                    AuditCapability::Provenance,
                );
                self.audit(
                    &AuditMessage::typed("prov:Generation")
                        .with("entity_generated", entity_id)
                        .with("hadActivity", monitor_id),
                    AuditCapability::Provenance,
                );
            }
        }

        self.audit(
            &AuditMessage::new(task_id).with("endedAtTime", now()),
            AuditCapability::Provenance,
        );
    }
}
