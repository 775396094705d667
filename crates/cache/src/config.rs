//! Kernel configuration with environment overrides
use cairn_core::{
    Error, ProvenanceContext, Result, CAIRN_CACHE_DIR_VAR, CAIRN_LOCK_TIMEOUT_VAR,
    CAIRN_MONITOR_INTERVAL_VAR, CAIRN_PROV_CONTEXT_VAR,
};
use cairn_utils::LockConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Settings every task run consults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Cache root; `None` allocates an ephemeral root on first run
    pub cache_dir: Option<PathBuf>,
    /// Read-only roots searched for reusable results
    pub cache_locations: Vec<PathBuf>,
    pub lock: LockConfig,
    pub monitor: MonitorConfig,
    pub provenance: ProvenanceContext,
}

/// Resource sampling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

impl KernelConfig {
    /// Defaults with `CAIRN_*` environment variables applied on top
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `CAIRN_*` environment variables to this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env_var(CAIRN_CACHE_DIR_VAR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }

        if let Some(secs) = env_var(CAIRN_LOCK_TIMEOUT_VAR) {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::configuration(format!(
                    "{CAIRN_LOCK_TIMEOUT_VAR} must be a whole number of seconds, got '{secs}'"
                ))
            })?;
            // zero means wait forever
            self.lock.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(ms) = env_var(CAIRN_MONITOR_INTERVAL_VAR) {
            let ms: u64 = ms.parse().ok().filter(|ms| *ms > 0).ok_or_else(|| {
                Error::configuration(format!(
                    "{CAIRN_MONITOR_INTERVAL_VAR} must be a positive number of milliseconds, got '{ms}'"
                ))
            })?;
            self.monitor.interval = Duration::from_millis(ms);
        }

        if let Some(context) = env_var(CAIRN_PROV_CONTEXT_VAR) {
            self.provenance = match context.as_str() {
                "embedded" => ProvenanceContext::Embedded,
                url => ProvenanceContext::Remote(url.to_string()),
            };
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
