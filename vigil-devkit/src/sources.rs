//! Scripted metric sources
//!
//! Deterministic [`MetricSource`] implementations for tests: fixed
//! percentages adjustable at runtime, plus per-probe failure and hang
//! injection to exercise the scanner's isolation and timeout paths.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use vigil_agent::scanner::{
    CpuSample, DiskSample, MemorySample, NetworkSample, ProcessSample,
};
use vigil_agent::{AgentError, MetricSource, Probe};

const TOTAL_MEMORY_MB: u64 = 16_384;
const DISK_TOTAL_GB: f64 = 100.0;

/// Source returning configured percentages for every probe.
pub struct StaticMetricSource {
    cpu_pct: Mutex<f32>,
    memory_pct: Mutex<f32>,
    disk_pct: Mutex<f32>,
    failing: Mutex<HashSet<Probe>>,
    hanging: Mutex<HashSet<Probe>>,
}

impl StaticMetricSource {
    /// A quiet host: low CPU, half-used memory and disk.
    pub fn healthy() -> Self {
        Self {
            cpu_pct: Mutex::new(10.0),
            memory_pct: Mutex::new(40.0),
            disk_pct: Mutex::new(50.0),
            failing: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_cpu(self, percent: f32) -> Self {
        *self.cpu_pct.lock().unwrap() = percent;
        self
    }

    pub fn with_memory(self, percent: f32) -> Self {
        *self.memory_pct.lock().unwrap() = percent;
        self
    }

    pub fn with_disk(self, percent: f32) -> Self {
        *self.disk_pct.lock().unwrap() = percent;
        self
    }

    /// The given probe fails with a collection error from now on.
    pub fn failing(self, probe: Probe) -> Self {
        self.failing.lock().unwrap().insert(probe);
        self
    }

    /// The given probe never resolves, exercising the scan timeout.
    pub fn hanging(self, probe: Probe) -> Self {
        self.hanging.lock().unwrap().insert(probe);
        self
    }

    /// Runtime adjustment for tests that flip load mid-run.
    pub fn set_cpu(&self, percent: f32) {
        *self.cpu_pct.lock().unwrap() = percent;
    }

    pub fn set_memory(&self, percent: f32) {
        *self.memory_pct.lock().unwrap() = percent;
    }

    /// Clear all injected failures and hangs.
    pub fn heal_all(&self) {
        self.failing.lock().unwrap().clear();
        self.hanging.lock().unwrap().clear();
    }

    /// Inject a failure on a live source.
    pub fn break_probe(&self, probe: Probe) {
        self.failing.lock().unwrap().insert(probe);
    }

    async fn gate(&self, probe: Probe) -> Result<(), AgentError> {
        if self.hanging.lock().unwrap().contains(&probe) {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(&probe) {
            return Err(AgentError::collection(
                probe.to_string(),
                "scripted failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricSource for StaticMetricSource {
    async fn cpu(&self) -> Result<CpuSample, AgentError> {
        self.gate(Probe::Cpu).await?;
        Ok(CpuSample {
            percent: *self.cpu_pct.lock().unwrap(),
            core_count: 4,
            load_avg: [0.5, 0.4, 0.3],
        })
    }

    async fn memory(&self) -> Result<MemorySample, AgentError> {
        self.gate(Probe::Memory).await?;
        let percent_used = *self.memory_pct.lock().unwrap();
        let used_mb = (TOTAL_MEMORY_MB as f32 * percent_used / 100.0) as u64;
        Ok(MemorySample {
            total_mb: TOTAL_MEMORY_MB,
            used_mb,
            available_mb: TOTAL_MEMORY_MB - used_mb,
            percent_used,
        })
    }

    async fn disks(&self) -> Result<Vec<DiskSample>, AgentError> {
        self.gate(Probe::Disk).await?;
        let percent_used = *self.disk_pct.lock().unwrap();
        Ok(vec![DiskSample {
            mount: "/".to_string(),
            total_gb: DISK_TOTAL_GB,
            used_gb: DISK_TOTAL_GB * percent_used as f64 / 100.0,
            percent_used,
        }])
    }

    async fn processes(&self, top_n: usize) -> Result<Vec<ProcessSample>, AgentError> {
        self.gate(Probe::Processes).await?;
        Ok((0..top_n.min(3))
            .map(|i| ProcessSample {
                pid: 1000 + i as u32,
                name: format!("scripted-{}", i),
                cpu_percent: 2.0,
                memory_mb: 128.0,
            })
            .collect())
    }

    async fn network(&self) -> Result<NetworkSample, AgentError> {
        self.gate(Probe::Network).await?;
        Ok(NetworkSample {
            interfaces: 2,
            bytes_received: 10_000,
            bytes_transmitted: 20_000,
            packets_received: 100,
            packets_transmitted: 200,
        })
    }
}
