//! Host awareness scanning
//!
//! Collects host resource usage through a [`MetricSource`] capability:
//! - Quick depth: CPU, memory, disks
//! - Full depth: adds top-N processes (by memory) and coarse network counters
//!
//! Probes are isolated: each one runs under a bounded timeout, and a failing
//! or hung probe yields a default-valued sample plus a failure tag instead of
//! aborting the scan. The scanner never mutates host state.

mod source;

pub use source::{MetricSource, SysinfoSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::AgentError;

/// Processes reported on a Full scan.
pub const DEFAULT_TOP_PROCESSES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanDepth {
    Quick,
    Full,
}

impl std::fmt::Display for ScanDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanDepth::Quick => write!(f, "quick"),
            ScanDepth::Full => write!(f, "full"),
        }
    }
}

/// CPU usage sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuSample {
    pub percent: f32,
    pub core_count: usize,
    pub load_avg: [f64; 3], // [1min, 5min, 15min]
}

/// Memory usage sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySample {
    pub total_mb: u64,
    pub used_mb: u64,
    pub available_mb: u64,
    pub percent_used: f32,
}

/// Usage for one mounted volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSample {
    pub mount: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub percent_used: f32,
}

/// One entry of the top-N process list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

/// Coarse host-wide network counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSample {
    pub interfaces: usize,
    pub bytes_received: u64,
    pub bytes_transmitted: u64,
    pub packets_received: u64,
    pub packets_transmitted: u64,
}

/// Metric probe identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Probe {
    Cpu,
    Memory,
    Disk,
    Processes,
    Network,
}

impl Probe {
    /// Probes collected at every depth; when all of them fail the scan
    /// itself counts as failed.
    pub const CORE: [Probe; 3] = [Probe::Cpu, Probe::Memory, Probe::Disk];
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Probe::Cpu => "cpu",
            Probe::Memory => "memory",
            Probe::Disk => "disk",
            Probe::Processes => "processes",
            Probe::Network => "network",
        };
        write!(f, "{}", name)
    }
}

/// Error marker for one failed probe within an otherwise usable scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub probe: Probe,
    pub reason: String,
}

/// Result of one awareness scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub collected_at: DateTime<Utc>,
    pub depth: ScanDepth,
    pub cpu: CpuSample,
    pub memory: MemorySample,
    pub disks: Vec<DiskSample>,
    pub processes: Option<Vec<ProcessSample>>,
    pub network: Option<NetworkSample>,
    pub failures: Vec<ProbeFailure>,
}

impl ScanResult {
    /// True when at least one probe substituted defaults.
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed(&self, probe: Probe) -> bool {
        self.failures.iter().any(|failure| failure.probe == probe)
    }
}

/// Read-only host scanner over a [`MetricSource`] selected at startup.
pub struct AwarenessScanner {
    source: Arc<dyn MetricSource>,
    probe_timeout: Duration,
    top_processes: usize,
}

impl AwarenessScanner {
    pub fn new(source: Arc<dyn MetricSource>, probe_timeout: Duration) -> Self {
        Self {
            source,
            probe_timeout,
            top_processes: DEFAULT_TOP_PROCESSES,
        }
    }

    /// Collect one scan at the requested depth.
    ///
    /// Returns `Err` only when every core probe failed in the same pass;
    /// anything less is reported through `ScanResult::failures`.
    pub async fn scan(&self, depth: ScanDepth) -> Result<ScanResult, AgentError> {
        let collected_at = Utc::now();
        debug!("scanning host ({} depth)", depth);

        let mut failures = Vec::new();
        let cpu = self
            .probe(Probe::Cpu, self.source.cpu(), &mut failures)
            .await
            .unwrap_or_default();
        let memory = self
            .probe(Probe::Memory, self.source.memory(), &mut failures)
            .await
            .unwrap_or_default();
        let disks = self
            .probe(Probe::Disk, self.source.disks(), &mut failures)
            .await
            .unwrap_or_default();

        let (processes, network) = match depth {
            ScanDepth::Quick => (None, None),
            ScanDepth::Full => {
                let processes = self
                    .probe(
                        Probe::Processes,
                        self.source.processes(self.top_processes),
                        &mut failures,
                    )
                    .await;
                let network = self
                    .probe(Probe::Network, self.source.network(), &mut failures)
                    .await;
                (processes, network)
            }
        };

        if Probe::CORE.iter().all(|core| {
            failures.iter().any(|failure| failure.probe == *core)
        }) {
            return Err(AgentError::collection(
                "scan",
                "all core probes failed in one pass",
            ));
        }

        Ok(ScanResult {
            collected_at,
            depth,
            cpu,
            memory,
            disks,
            processes,
            network,
            failures,
        })
    }

    /// Run one probe under the bounded timeout; a failure or timeout is
    /// recorded and turned into `None` so the remaining probes still run.
    async fn probe<T, F>(
        &self,
        probe: Probe,
        collect: F,
        failures: &mut Vec<ProbeFailure>,
    ) -> Option<T>
    where
        F: Future<Output = Result<T, AgentError>>,
    {
        match tokio::time::timeout(self.probe_timeout, collect).await {
            Ok(Ok(sample)) => Some(sample),
            Ok(Err(err)) => {
                warn!("{} probe failed: {}", probe, err);
                failures.push(ProbeFailure {
                    probe,
                    reason: err.to_string(),
                });
                None
            }
            Err(_) => {
                warn!(
                    "{} probe timed out after {}ms",
                    probe,
                    self.probe_timeout.as_millis()
                );
                failures.push(ProbeFailure {
                    probe,
                    reason: format!("timed out after {}ms", self.probe_timeout.as_millis()),
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Inline scripted source; per-probe failures and hangs are injectable.
    struct ScriptedSource {
        failing: Mutex<HashSet<Probe>>,
        hang: Mutex<HashSet<Probe>>,
    }

    impl ScriptedSource {
        fn healthy() -> Self {
            Self {
                failing: Mutex::new(HashSet::new()),
                hang: Mutex::new(HashSet::new()),
            }
        }

        fn failing(self, probe: Probe) -> Self {
            self.failing.lock().unwrap().insert(probe);
            self
        }

        fn hanging(self, probe: Probe) -> Self {
            self.hang.lock().unwrap().insert(probe);
            self
        }

        async fn gate(&self, probe: Probe) -> Result<(), AgentError> {
            if self.hang.lock().unwrap().contains(&probe) {
                std::future::pending::<()>().await;
            }
            if self.failing.lock().unwrap().contains(&probe) {
                return Err(AgentError::collection(probe.to_string(), "scripted failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MetricSource for ScriptedSource {
        async fn cpu(&self) -> Result<CpuSample, AgentError> {
            self.gate(Probe::Cpu).await?;
            Ok(CpuSample {
                percent: 12.5,
                core_count: 4,
                load_avg: [0.4, 0.3, 0.2],
            })
        }

        async fn memory(&self) -> Result<MemorySample, AgentError> {
            self.gate(Probe::Memory).await?;
            Ok(MemorySample {
                total_mb: 16_384,
                used_mb: 8_192,
                available_mb: 8_192,
                percent_used: 50.0,
            })
        }

        async fn disks(&self) -> Result<Vec<DiskSample>, AgentError> {
            self.gate(Probe::Disk).await?;
            Ok(vec![DiskSample {
                mount: "/".to_string(),
                total_gb: 100.0,
                used_gb: 40.0,
                percent_used: 40.0,
            }])
        }

        async fn processes(&self, top_n: usize) -> Result<Vec<ProcessSample>, AgentError> {
            self.gate(Probe::Processes).await?;
            Ok((0..top_n.min(3))
                .map(|i| ProcessSample {
                    pid: 100 + i as u32,
                    name: format!("proc-{}", i),
                    cpu_percent: 1.0,
                    memory_mb: 64.0,
                })
                .collect())
        }

        async fn network(&self) -> Result<NetworkSample, AgentError> {
            self.gate(Probe::Network).await?;
            Ok(NetworkSample {
                interfaces: 2,
                bytes_received: 1_000,
                bytes_transmitted: 2_000,
                packets_received: 10,
                packets_transmitted: 20,
            })
        }
    }

    fn scanner(source: ScriptedSource) -> AwarenessScanner {
        AwarenessScanner::new(Arc::new(source), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn quick_scan_skips_processes_and_network() {
        let scan = scanner(ScriptedSource::healthy())
            .scan(ScanDepth::Quick)
            .await
            .unwrap();
        assert!(scan.processes.is_none());
        assert!(scan.network.is_none());
        assert!(!scan.is_degraded());
        assert_eq!(scan.cpu.percent, 12.5);
    }

    #[tokio::test]
    async fn full_scan_collects_everything() {
        let scan = scanner(ScriptedSource::healthy())
            .scan(ScanDepth::Full)
            .await
            .unwrap();
        assert_eq!(scan.processes.unwrap().len(), 3);
        assert_eq!(scan.network.unwrap().interfaces, 2);
        assert_eq!(scan.disks.len(), 1);
    }

    #[tokio::test]
    async fn failing_probe_defaults_and_tags_without_aborting() {
        let scan = scanner(ScriptedSource::healthy().failing(Probe::Cpu))
            .scan(ScanDepth::Quick)
            .await
            .unwrap();
        assert!(scan.failed(Probe::Cpu));
        assert_eq!(scan.cpu.percent, 0.0);
        // Independent probes still collected
        assert_eq!(scan.memory.percent_used, 50.0);
        assert_eq!(scan.disks.len(), 1);
    }

    #[tokio::test]
    async fn hung_probe_times_out_as_a_failure() {
        let scan = scanner(ScriptedSource::healthy().hanging(Probe::Memory))
            .scan(ScanDepth::Quick)
            .await
            .unwrap();
        assert!(scan.failed(Probe::Memory));
        assert!(scan
            .failures
            .iter()
            .any(|failure| failure.reason.contains("timed out")));
        assert_eq!(scan.cpu.percent, 12.5);
    }

    #[tokio::test]
    async fn all_core_probes_failing_fails_the_scan() {
        let source = ScriptedSource::healthy()
            .failing(Probe::Cpu)
            .failing(Probe::Memory)
            .failing(Probe::Disk);
        let err = scanner(source).scan(ScanDepth::Quick).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Collection);
    }
}
