//! Resource sampling of the running process
//!
//! Samples are appended to `proc-<pid>.log` as CSV lines of
//! `elapsed_secs,cpu_percent,rss_mb,vms_mb`, and folded into a
//! [`RuntimeSummary`] once sampling stops.

use cairn_cache::RuntimeSummary;
use cairn_core::{Error, Result};
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Something that observes resource usage between `start` and `stop`
pub trait ResourceSampler: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    /// Peak usage seen so far; `None` if nothing was sampled
    fn summary(&self) -> Result<Option<RuntimeSummary>>;
}

/// Background sampler backed by `sysinfo`
///
/// The process and its direct children are summed on every tick.
pub struct ResourceMonitor {
    pid: u32,
    log_path: PathBuf,
    interval: Duration,
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl ResourceMonitor {
    pub fn new(pid: u32, log_dir: &Path, interval: Duration) -> Self {
        Self {
            pid,
            log_path: log_dir.join(format!("proc-{pid}.log")),
            interval,
            worker: None,
        }
    }

    /// Sampler for the calling process
    pub fn current(log_dir: &Path, interval: Duration) -> Self {
        Self::new(std::process::id(), log_dir, interval)
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

impl ResourceSampler for ResourceMonitor {
    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| Error::file_system(&self.log_path, "open resource log", e))?;

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let pid = self.pid;
        let interval = self.interval;
        let log_path = self.log_path.clone();

        let handle = thread::Builder::new()
            .name(format!("cairn-monitor-{pid}"))
            .spawn(move || {
                let mut writer = BufWriter::new(file);
                let mut system = System::new();
                let started = Instant::now();
                loop {
                    if let Err(e) = write_sample(&mut writer, &mut system, pid, started) {
                        tracing::warn!(path = %log_path.display(), error = %e, "resource sampling stopped");
                        break;
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // one last sample so short tasks still leave a line behind
                let _ = write_sample(&mut writer, &mut system, pid, started);
            })
            .map_err(|e| Error::file_system(&self.log_path, "spawn resource monitor", e))?;

        tracing::debug!(pid, interval_ms = interval.as_millis() as u64, "resource monitor started");
        self.worker = Some((stop_tx, handle));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some((stop_tx, handle)) = self.worker.take() {
            let _ = stop_tx.send(());
            if handle.join().is_err() {
                tracing::warn!(pid = self.pid, "resource monitor thread panicked");
            }
            tracing::debug!(pid = self.pid, "resource monitor stopped");
        }
        Ok(())
    }

    fn summary(&self) -> Result<Option<RuntimeSummary>> {
        gather_runtime_info(&self.log_path)
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn write_sample(
    writer: &mut BufWriter<File>,
    system: &mut System,
    pid: u32,
    started: Instant,
) -> std::io::Result<()> {
    system.refresh_processes();
    let root = Pid::from_u32(pid);

    let (mut cpu, mut rss, mut vms) = (0.0f64, 0u64, 0u64);
    for (process_pid, process) in system.processes() {
        if *process_pid == root || process.parent() == Some(root) {
            cpu += f64::from(process.cpu_usage());
            rss += process.memory();
            vms += process.virtual_memory();
        }
    }

    writeln!(
        writer,
        "{:.3},{:.2},{:.3},{:.3}",
        started.elapsed().as_secs_f64(),
        cpu,
        rss as f64 / BYTES_PER_MB,
        vms as f64 / BYTES_PER_MB
    )?;
    writer.flush()
}

/// Fold a resource log into peak values
///
/// Returns `None` when the log is missing or holds no parsable sample.
pub fn gather_runtime_info(path: &Path) -> Result<Option<RuntimeSummary>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::file_system(path, "read resource log", e)),
    };

    let mut summary: Option<RuntimeSummary> = None;
    for line in content.lines() {
        let columns: Vec<f64> = match line
            .split(',')
            .map(|column| column.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
        {
            Ok(columns) if columns.len() == 4 => columns,
            _ => continue,
        };

        let peak = summary.get_or_insert_with(RuntimeSummary::default);
        peak.cpu_peak_percent = peak.cpu_peak_percent.max(columns[1]);
        peak.rss_peak_gb = peak.rss_peak_gb.max(columns[2] / 1024.0);
        peak.vms_peak_gb = peak.vms_peak_gb.max(columns[3] / 1024.0);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_gather_runtime_info_takes_peaks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("proc-1.log");
        fs::write(
            &path,
            "0.0,10.0,512.0,2048.0\n1.0,55.5,1024.0,1024.0\nnot,a,sample\n",
        )
        .unwrap();

        let summary = gather_runtime_info(&path).unwrap().unwrap();
        assert_eq!(summary.cpu_peak_percent, 55.5);
        assert_eq!(summary.rss_peak_gb, 1.0);
        assert_eq!(summary.vms_peak_gb, 2.0);
    }

    #[test]
    fn test_gather_runtime_info_skips_short_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("proc-2.log");
        fs::write(&path, "0.0,99.0,4096.0\n0.5,12.0,256.0,512.0\n").unwrap();

        let summary = gather_runtime_info(&path).unwrap().unwrap();
        assert_eq!(summary.cpu_peak_percent, 12.0);
        assert_eq!(summary.rss_peak_gb, 0.25);
        assert_eq!(summary.vms_peak_gb, 0.5);
    }

    #[test]
    fn test_gather_runtime_info_missing_log() {
        let temp_dir = TempDir::new().unwrap();
        assert!(gather_runtime_info(&temp_dir.path().join("none.log"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_monitor_samples_current_process() {
        let temp_dir = TempDir::new().unwrap();
        let mut monitor = ResourceMonitor::current(temp_dir.path(), Duration::from_millis(20));

        monitor.start().unwrap();
        thread::sleep(Duration::from_millis(60));
        monitor.stop().unwrap();

        assert!(monitor.log_path().exists());
        let summary = monitor.summary().unwrap().unwrap();
        assert!(summary.rss_peak_gb > 0.0);
    }
}
