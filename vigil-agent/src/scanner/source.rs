//! Metric source capability
//!
//! One [`MetricSource`] implementation is selected at startup; business
//! logic never branches on the platform. [`SysinfoSource`] is the portable
//! production source; scripted sources for tests live in the devkit.

use async_trait::async_trait;
use sysinfo::{Disks, Networks, System};
use tokio::sync::Mutex;

use super::{CpuSample, DiskSample, MemorySample, NetworkSample, ProcessSample};
use crate::error::AgentError;

/// Settle time between the two CPU refreshes a usage delta needs.
const CPU_SAMPLE_SETTLE_MS: u64 = 200;

/// Capability interface for one metric family per method.
///
/// Implementations must be read-only with respect to host state.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn cpu(&self) -> Result<CpuSample, AgentError>;
    async fn memory(&self) -> Result<MemorySample, AgentError>;
    async fn disks(&self) -> Result<Vec<DiskSample>, AgentError>;
    async fn processes(&self, top_n: usize) -> Result<Vec<ProcessSample>, AgentError>;
    async fn network(&self) -> Result<NetworkSample, AgentError>;
}

/// Cross-platform source backed by the sysinfo crate.
pub struct SysinfoSource {
    sys: Mutex<System>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for SysinfoSource {
    async fn cpu(&self) -> Result<CpuSample, AgentError> {
        let mut sys = self.sys.lock().await;
        sys.refresh_cpu_usage();
        // Two refreshes with a settle between them for an accurate delta
        tokio::time::sleep(tokio::time::Duration::from_millis(CPU_SAMPLE_SETTLE_MS)).await;
        sys.refresh_cpu_usage();

        let percent = sys.global_cpu_info().cpu_usage();
        let core_count = sys.cpus().len();
        let load = System::load_average();

        Ok(CpuSample {
            percent,
            core_count,
            load_avg: [load.one, load.five, load.fifteen],
        })
    }

    async fn memory(&self) -> Result<MemorySample, AgentError> {
        let mut sys = self.sys.lock().await;
        sys.refresh_memory();

        let total_bytes = sys.total_memory();
        let available_bytes = sys.available_memory();
        let used_bytes = total_bytes.saturating_sub(available_bytes);

        let percent_used = if total_bytes > 0 {
            (used_bytes as f32 / total_bytes as f32) * 100.0
        } else {
            0.0
        };

        Ok(MemorySample {
            total_mb: total_bytes / (1024 * 1024),
            used_mb: used_bytes / (1024 * 1024),
            available_mb: available_bytes / (1024 * 1024),
            percent_used,
        })
    }

    async fn disks(&self) -> Result<Vec<DiskSample>, AgentError> {
        let disks = Disks::new_with_refreshed_list();

        let samples: Vec<DiskSample> = disks
            .iter()
            .filter(|disk| disk.total_space() > 0)
            .map(|disk| {
                let total = disk.total_space();
                let used = total.saturating_sub(disk.available_space());
                DiskSample {
                    mount: disk.mount_point().display().to_string(),
                    total_gb: total as f64 / (1024.0 * 1024.0 * 1024.0),
                    used_gb: used as f64 / (1024.0 * 1024.0 * 1024.0),
                    percent_used: (used as f32 / total as f32) * 100.0,
                }
            })
            .collect();

        if samples.is_empty() {
            return Err(AgentError::collection("disk", "no mounted volumes visible"));
        }
        Ok(samples)
    }

    async fn processes(&self, top_n: usize) -> Result<Vec<ProcessSample>, AgentError> {
        let mut sys = self.sys.lock().await;
        sys.refresh_processes();

        let mut processes: Vec<&sysinfo::Process> = sys.processes().values().collect();
        processes.sort_by(|a, b| b.memory().cmp(&a.memory()));

        Ok(processes
            .into_iter()
            .take(top_n)
            .map(|process| ProcessSample {
                pid: process.pid().as_u32(),
                name: process.name().to_string(),
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / (1024.0 * 1024.0),
            })
            .collect())
    }

    async fn network(&self) -> Result<NetworkSample, AgentError> {
        let networks = Networks::new_with_refreshed_list();

        let mut sample = NetworkSample::default();
        for (_name, data) in networks.iter() {
            sample.interfaces += 1;
            sample.bytes_received += data.total_received();
            sample.bytes_transmitted += data.total_transmitted();
            sample.packets_received += data.total_packets_received();
            sample.packets_transmitted += data.total_packets_transmitted();
        }
        Ok(sample)
    }
}
