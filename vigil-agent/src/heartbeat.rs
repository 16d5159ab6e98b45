//! Heartbeat controller
//!
//! Owns the capsule store and drives the monitoring loop. Each tick runs
//! strictly sequentially: scan -> store -> threshold evaluation -> renewal
//! check -> stat update, followed by a cancellable sleep for the remainder
//! of the interval. A tick that overruns the interval proceeds straight to
//! the next one; the skipped sleep is never made up.
//!
//! The controller's task is the only writer of the capsule store. External
//! callers interact through an [`AgentHandle`]: stop signal, status
//! snapshot, forced renewal and manual scans.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::capsule::{
    AlertLevel, AlertRecord, CapsuleKind, CapsuleLimits, CapsuleStore, MetricSnapshot,
    ThresholdValues,
};
use crate::config::AgentConfig;
use crate::error::{AgentError, FailureKind};
use crate::healing::{RecoveryAction, SelfHealer};
use crate::renewal::{RenewalEngine, RenewalTrigger};
use crate::scanner::{AwarenessScanner, MetricSource, ScanDepth, ScanResult, SysinfoSource};
use crate::state::{new_shared, Shared, SystemState};
use crate::status::{CapsuleStatus, HostIdentity, StatusSnapshot};
use crate::telemetry::{AlertSink, TelemetryLevel, TelemetryRecord, TelemetrySink};

/// Consecutive clean beats required to leave Degraded mode.
const DEGRADED_RECOVERY_BEATS: u32 = 3;

/// Control surface command buffer.
const COMMAND_BUFFER: usize = 16;

/// Running heartbeat statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HeartbeatStats {
    pub running: bool,
    pub total_beats: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub last_beat_at: Option<DateTime<Utc>>,
    pub avg_latency_ms: f64,
}

impl HeartbeatStats {
    /// Incremental mean over all beats; no latency history is kept.
    fn record_latency(&mut self, latency_ms: f64) {
        let beats = self.total_beats.max(1) as f64;
        self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / beats;
    }
}

/// Control surface commands, handled at tick/sleep boundaries.
enum Command {
    ForceRenew,
    ForcePartialRenew,
    ManualScan {
        depth: ScanDepth,
        reply: oneshot::Sender<Result<ScanResult, AgentError>>,
    },
}

/// Cloneable handle to a running (or starting) agent.
#[derive(Clone)]
pub struct AgentHandle {
    status: Shared<StatusSnapshot>,
    stop_tx: watch::Sender<bool>,
    cmd_tx: mpsc::Sender<Command>,
}

impl AgentHandle {
    /// Read-only snapshot of the agent. Always succeeds; a degraded or
    /// stopped agent reports that state here instead of erroring.
    pub fn status(&self) -> StatusSnapshot {
        self.status.lock().clone()
    }

    /// Signal the loop to stop; observed at the next tick or sleep
    /// boundary.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Request a renewal cycle out of schedule. Returns false once the
    /// agent has stopped.
    pub async fn force_renew(&self) -> bool {
        self.cmd_tx.send(Command::ForceRenew).await.is_ok()
    }

    /// Request a partial renewal: clears only the per-tick capsules and
    /// halves the staleness counter. Never auto-selected by the loop.
    pub async fn force_partial_renew(&self) -> bool {
        self.cmd_tx.send(Command::ForcePartialRenew).await.is_ok()
    }

    /// Run one scan outside the tick cadence and return the result without
    /// touching the capsules.
    pub async fn manual_scan(&self, depth: ScanDepth) -> Result<ScanResult, AgentError> {
        let (reply, answer) = oneshot::channel();
        self.cmd_tx
            .send(Command::ManualScan { depth, reply })
            .await
            .map_err(|_| AgentError::heartbeat("agent is not running"))?;
        answer
            .await
            .map_err(|_| AgentError::heartbeat("agent stopped before answering"))?
    }
}

/// The assembled agent: construct, grab a handle, then `run()`.
pub struct HealthAgent {
    controller: HeartbeatController,
    handle: AgentHandle,
}

impl HealthAgent {
    /// Build an agent monitoring the local host.
    pub fn new(
        config: AgentConfig,
        telemetry: Arc<dyn TelemetrySink>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Result<Self, AgentError> {
        Self::with_source(config, Arc::new(SysinfoSource::new()), telemetry, alert_sink)
    }

    /// Build an agent over an explicit metric source (platform selection,
    /// devkit scripted sources).
    pub fn with_source(
        config: AgentConfig,
        source: Arc<dyn MetricSource>,
        telemetry: Arc<dyn TelemetrySink>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Result<Self, AgentError> {
        // The only failure allowed to abort startup
        config.validate()?;

        let now = Utc::now();
        let mut store = CapsuleStore::new(CapsuleLimits::from_config(&config.capsules));
        store.set_thresholds(config.thresholds.named());

        let scanner = AwarenessScanner::new(source, config.probe_timeout());
        let renewal = RenewalEngine::new(&config.renewal, now);
        let host = HostIdentity::discover();

        let stats = HeartbeatStats::default();
        let status = new_shared(StatusSnapshot {
            state: SystemState::Initialized,
            host: host.clone(),
            capsules: CapsuleStatus::of(&store),
            heartbeat: stats.clone(),
            renewal: renewal.status(),
            last_scan_at: None,
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

        let handle = AgentHandle {
            status: status.clone(),
            stop_tx,
            cmd_tx,
        };

        let controller = HeartbeatController {
            config,
            store,
            scanner,
            renewal,
            healer: SelfHealer::new(),
            telemetry,
            alert_sink,
            stats,
            state: SystemState::Initialized,
            last_scan_at: None,
            degraded_clean_beats: 0,
            shutdown_requested: false,
            commands_closed: false,
            stop_closed: false,
            host,
            status,
            stop_rx,
            cmd_rx,
        };

        Ok(Self { controller, handle })
    }

    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    /// Run the monitoring loop until stopped. Consumes the agent; the
    /// returned future is the loop itself.
    pub async fn run(self) -> Result<(), AgentError> {
        self.controller.run().await
    }
}

struct HeartbeatController {
    config: AgentConfig,
    store: CapsuleStore,
    scanner: AwarenessScanner,
    renewal: RenewalEngine,
    healer: SelfHealer,
    telemetry: Arc<dyn TelemetrySink>,
    alert_sink: Arc<dyn AlertSink>,
    stats: HeartbeatStats,
    state: SystemState,
    last_scan_at: Option<DateTime<Utc>>,
    degraded_clean_beats: u32,
    shutdown_requested: bool,
    commands_closed: bool,
    stop_closed: bool,
    host: HostIdentity,
    status: Shared<StatusSnapshot>,
    stop_rx: watch::Receiver<bool>,
    cmd_rx: mpsc::Receiver<Command>,
}

impl HeartbeatController {
    async fn run(mut self) -> Result<(), AgentError> {
        let interval = Duration::from_secs(self.config.heartbeat.interval_seconds);
        self.transition(SystemState::Running);
        self.stats.running = true;
        info!(
            "heartbeat started on {} (interval {}s)",
            self.host.hostname, self.config.heartbeat.interval_seconds
        );
        self.emit(
            TelemetryLevel::Info,
            "heartbeat started",
            Some(json!({
                "hostname": self.host.hostname,
                "interval_seconds": self.config.heartbeat.interval_seconds,
            })),
        );
        self.publish_status();

        loop {
            // Stop signal is only observed at tick boundaries
            if *self.stop_rx.borrow() {
                break;
            }

            let tick_start = Instant::now();
            self.beat().await;
            self.publish_status();

            if self.shutdown_requested {
                // Graceful shutdown already ran inside the tick
                return Ok(());
            }

            let remaining = remaining_sleep(interval, tick_start.elapsed());
            if remaining.is_zero() {
                debug!(
                    "tick overran the {}s interval, proceeding without sleep",
                    interval.as_secs()
                );
                self.drain_pending_commands().await;
                continue;
            }
            if !self.wait_for_next_tick(remaining).await {
                break;
            }
        }

        self.shutdown();
        self.publish_status();
        Ok(())
    }

    /// Sleep out the rest of the interval, staying responsive to the stop
    /// signal and control commands. Returns false when stopping.
    async fn wait_for_next_tick(&mut self, mut remaining: Duration) -> bool {
        loop {
            let wait_started = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep(remaining) => return true,
                changed = self.stop_rx.changed(), if !self.stop_closed => {
                    match changed {
                        Ok(()) if *self.stop_rx.borrow() => return false,
                        Ok(()) => {}
                        Err(_) => self.stop_closed = true,
                    }
                }
                cmd = self.cmd_rx.recv(), if !self.commands_closed => {
                    match cmd {
                        Some(cmd) => {
                            self.handle_command(cmd).await;
                            self.publish_status();
                            if self.shutdown_requested {
                                return false;
                            }
                        }
                        None => self.commands_closed = true,
                    }
                }
            }
            remaining = remaining.saturating_sub(wait_started.elapsed());
            if remaining.is_zero() {
                return true;
            }
        }
    }

    async fn drain_pending_commands(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            self.handle_command(cmd).await;
            self.publish_status();
            if self.shutdown_requested {
                break;
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::ForceRenew => {
                info!("renewal requested through the control surface");
                if let Err(err) = self.run_renewal(RenewalTrigger::Forced) {
                    self.handle_failure(err);
                }
            }
            Command::ForcePartialRenew => {
                let report = self.renewal.renew_partial(&mut self.store);
                info!("partial renewal: {} bytes freed", report.freed_bytes);
                self.emit(
                    TelemetryLevel::Info,
                    "partial renewal complete",
                    Some(json!({"freed_bytes": report.freed_bytes})),
                );
            }
            Command::ManualScan { depth, reply } => {
                // Out-of-cadence scans answer the caller without touching
                // the tick-ordered capsules
                let result = self.scanner.scan(depth).await;
                let _ = reply.send(result);
            }
        }
    }

    /// One heartbeat tick.
    async fn beat(&mut self) {
        self.stats.total_beats += 1;
        let started = Instant::now();
        let now = Utc::now();
        let depth = if self.state == SystemState::Degraded {
            ScanDepth::Quick
        } else {
            ScanDepth::Full
        };

        match self.run_tick(depth, now).await {
            Ok(()) => {
                self.stats.succeeded += 1;
                self.note_clean_beat();
            }
            Err(err) => {
                self.stats.failed += 1;
                self.handle_failure(err);
            }
        }

        self.renewal.note_beat();
        self.stats
            .record_latency(started.elapsed().as_secs_f64() * 1000.0);
        self.stats.last_beat_at = Some(now);
    }

    async fn run_tick(&mut self, depth: ScanDepth, now: DateTime<Utc>) -> Result<(), AgentError> {
        let scan = self.scan_with_retry(depth).await?;
        self.last_scan_at = Some(scan.collected_at);

        self.ingest(&scan, now)?;

        let alerts = evaluate_thresholds(&scan, self.store.thresholds());
        self.deliver_alerts(alerts, now)?;

        if let Some(trigger) = self.renewal.should_renew(&self.store, now) {
            self.run_renewal(trigger)?;
        }
        Ok(())
    }

    /// Scan with the configured retry policy: up to `max_retries` extra
    /// attempts, a fixed `timeout_ms / 2` delay apart.
    async fn scan_with_retry(&mut self, depth: ScanDepth) -> Result<ScanResult, AgentError> {
        let max_retries = self.config.heartbeat.max_retries;
        let delay = self.config.retry_delay();
        let mut attempt = 0;
        loop {
            match self.scanner.scan(depth).await {
                Ok(scan) => return Ok(scan),
                Err(err) if attempt < max_retries => {
                    attempt += 1;
                    warn!(
                        "scan attempt {} failed: {} (retrying in {}ms)",
                        attempt,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(AgentError::heartbeat(format!(
                        "scan failed after {} attempts: {}",
                        attempt + 1,
                        err
                    )))
                }
            }
        }
    }

    /// Fold one scan into the capsules: metric slot, pattern history, and
    /// probe-failure events.
    fn ingest(&mut self, scan: &ScanResult, now: DateTime<Utc>) -> Result<(), AgentError> {
        self.store.set_metric(MetricSnapshot {
            collected_at: scan.collected_at,
            scan: scan.clone(),
        });

        let key = scan
            .collected_at
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let max_disk_pct = scan
            .disks
            .iter()
            .map(|disk| disk.percent_used)
            .fold(0.0f32, f32::max);
        self.store.record_pattern(
            key,
            json!({
                "cpu_pct": scan.cpu.percent,
                "memory_pct": scan.memory.percent_used,
                "max_disk_pct": max_disk_pct,
                "degraded": scan.is_degraded(),
            }),
        )?;

        for failure in &scan.failures {
            self.store.record_event(
                now,
                json!({
                    "kind": "probe_failure",
                    "probe": failure.probe,
                    "reason": failure.reason,
                }),
            )?;
            self.emit(
                TelemetryLevel::Warning,
                &format!("{} probe degraded", failure.probe),
                Some(json!({"reason": failure.reason})),
            );
        }
        Ok(())
    }

    /// Store each alert and forward it to the sinks.
    fn deliver_alerts(
        &mut self,
        alerts: Vec<AlertRecord>,
        now: DateTime<Utc>,
    ) -> Result<(), AgentError> {
        for alert in alerts {
            self.alert_sink.accept(&alert);
            self.emit(
                TelemetryLevel::Warning,
                &format!("{} {} threshold breached", alert.metric, alert.level),
                Some(json!({
                    "metric": alert.metric,
                    "level": alert.level,
                    "observed": alert.observed,
                    "threshold": alert.threshold,
                })),
            );
            self.store.record_event(
                now,
                json!({
                    "kind": "threshold_breach",
                    "metric": alert.metric,
                    "level": alert.level,
                }),
            )?;
            self.store.push_alert(alert)?;
        }
        Ok(())
    }

    /// Run one renewal cycle inside a `Renewing` window.
    fn run_renewal(&mut self, trigger: RenewalTrigger) -> Result<(), AgentError> {
        let previous = self.state;
        self.transition(SystemState::Renewing);

        let now = Utc::now();
        let result = self.renewal.renew(&mut self.store, now, false);
        self.transition(previous);

        let report = result?;
        info!(
            "renewal complete ({}): {} bytes freed",
            trigger, report.freed_bytes
        );
        let _ = self.store.record_event(
            now,
            json!({
                "kind": "renewal",
                "trigger": trigger,
                "freed_bytes": report.freed_bytes,
            }),
        );
        self.emit(
            TelemetryLevel::Info,
            "renewal cycle complete",
            Some(json!({
                "trigger": trigger,
                "freed_bytes": report.freed_bytes,
                "preserved_thresholds": report.preserved_thresholds,
            })),
        );
        Ok(())
    }

    /// Classify a beat failure and apply the selected recovery action.
    fn handle_failure(&mut self, err: AgentError) {
        error!("beat failed: {}", err);
        self.emit(
            TelemetryLevel::Error,
            "beat failed",
            Some(json!({"kind": err.kind(), "detail": err.to_string()})),
        );
        let _ = self.store.record_event(
            Utc::now(),
            json!({
                "kind": "beat_failure",
                "failure_kind": err.kind(),
                "detail": err.to_string(),
            }),
        );

        if !self.config.self_healing_enabled {
            return;
        }

        let category = self.healer.classify(&err);
        let action = self
            .healer
            .act(category, err.kind(), self.state == SystemState::Degraded);
        debug!("failure classified {} -> {:?}", category, action);

        match action {
            RecoveryAction::Retry => {}
            RecoveryAction::ResetSubsystem(kind) => self.reset_subsystem(kind),
            RecoveryAction::EnterDegraded => {
                if self.state != SystemState::Degraded {
                    self.degraded_clean_beats = 0;
                    self.transition(SystemState::Degraded);
                    self.emit(
                        TelemetryLevel::Warning,
                        "entering degraded mode (quick scans only)",
                        None,
                    );
                }
            }
            RecoveryAction::Shutdown => {
                self.emit(
                    TelemetryLevel::Error,
                    "critical failure, shutting down",
                    Some(json!({"kind": err.kind()})),
                );
                self.shutdown();
                self.shutdown_requested = true;
            }
        }
    }

    /// Reset only the in-memory state of the subsystem that raised the
    /// failure.
    fn reset_subsystem(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Renewal => {
                self.renewal.reset_counters(Utc::now());
                self.emit(TelemetryLevel::Info, "renewal engine state reset", None);
            }
            FailureKind::Validation | FailureKind::Collection => {
                self.store.clear(CapsuleKind::Metric);
                self.emit(TelemetryLevel::Info, "stale metric slot cleared", None);
            }
            other => debug!("no subsystem reset mapped for {} failures", other),
        }
    }

    fn note_clean_beat(&mut self) {
        self.healer.note_success();
        if self.state == SystemState::Degraded {
            self.degraded_clean_beats += 1;
            if self.degraded_clean_beats >= DEGRADED_RECOVERY_BEATS {
                self.transition(SystemState::Running);
                self.emit(TelemetryLevel::Info, "recovered from degraded mode", None);
            }
        }
    }

    fn transition(&mut self, next: SystemState) {
        if self.state == next {
            return;
        }
        info!("state {} -> {}", self.state, next);
        let _ = self.store.record_event(
            Utc::now(),
            json!({"kind": "state_transition", "from": self.state, "to": next}),
        );
        self.state = next;
    }

    /// Graceful shutdown: final telemetry, clear every capsule, flush the
    /// sinks. Idempotent.
    fn shutdown(&mut self) {
        if self.state == SystemState::Stopped {
            return;
        }
        info!("stopping: clearing capsules and flushing telemetry");
        self.emit(TelemetryLevel::Info, "agent stopping", None);
        self.transition(SystemState::Stopped);
        self.store.clear_all();
        self.stats.running = false;
        self.telemetry.flush();
        self.alert_sink.flush();
    }

    fn publish_status(&self) {
        *self.status.lock() = StatusSnapshot {
            state: self.state,
            host: self.host.clone(),
            capsules: CapsuleStatus::of(&self.store),
            heartbeat: self.stats.clone(),
            renewal: self.renewal.status(),
            last_scan_at: self.last_scan_at,
        };
    }

    fn emit(&self, level: TelemetryLevel, message: &str, data: Option<Value>) {
        let mut record = TelemetryRecord::new(level, message);
        if let Some(data) = data {
            record = record.with_data(data);
        }
        self.telemetry.accept(record);
    }
}

/// Sleep time left after a tick; zero on overrun (never made up later).
fn remaining_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Evaluate one scan against the configured thresholds.
///
/// CPU and memory check their own named pair; every disk volume checks the
/// shared "disk" pair and reports as `disk:<mount>`. At most one alert per
/// metric per tick - critical supersedes warning.
fn evaluate_thresholds(
    scan: &ScanResult,
    thresholds: &HashMap<String, ThresholdValues>,
) -> Vec<AlertRecord> {
    let mut alerts = Vec::new();

    if let Some(pair) = thresholds.get("cpu") {
        if let Some((level, threshold)) = breach(pair, scan.cpu.percent as f64) {
            alerts.push(AlertRecord::new(
                "cpu",
                level,
                threshold,
                scan.cpu.percent as f64,
                scan.collected_at,
            ));
        }
    }
    if let Some(pair) = thresholds.get("memory") {
        if let Some((level, threshold)) = breach(pair, scan.memory.percent_used as f64) {
            alerts.push(AlertRecord::new(
                "memory",
                level,
                threshold,
                scan.memory.percent_used as f64,
                scan.collected_at,
            ));
        }
    }
    if let Some(pair) = thresholds.get("disk") {
        for disk in &scan.disks {
            if let Some((level, threshold)) = breach(pair, disk.percent_used as f64) {
                alerts.push(AlertRecord::new(
                    format!("disk:{}", disk.mount),
                    level,
                    threshold,
                    disk.percent_used as f64,
                    scan.collected_at,
                ));
            }
        }
    }

    alerts
}

fn breach(pair: &ThresholdValues, observed: f64) -> Option<(AlertLevel, f64)> {
    if observed >= pair.critical {
        Some((AlertLevel::Critical, pair.critical))
    } else if observed >= pair.warning {
        Some((AlertLevel::Warning, pair.warning))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{CpuSample, DiskSample, MemorySample};

    fn scan_with(cpu: f32, memory: f32, disk: f32) -> ScanResult {
        ScanResult {
            collected_at: Utc::now(),
            depth: ScanDepth::Quick,
            cpu: CpuSample {
                percent: cpu,
                core_count: 4,
                load_avg: [0.0, 0.0, 0.0],
            },
            memory: MemorySample {
                total_mb: 16_384,
                used_mb: 0,
                available_mb: 0,
                percent_used: memory,
            },
            disks: vec![DiskSample {
                mount: "/".to_string(),
                total_gb: 100.0,
                used_gb: 0.0,
                percent_used: disk,
            }],
            processes: None,
            network: None,
            failures: Vec::new(),
        }
    }

    fn default_thresholds() -> HashMap<String, ThresholdValues> {
        AgentConfig::default()
            .thresholds
            .named()
            .into_iter()
            .map(|(name, values)| (name.to_string(), values))
            .collect()
    }

    #[test]
    fn critical_cpu_yields_exactly_one_critical_alert() {
        let alerts = evaluate_thresholds(&scan_with(96.0, 50.0, 50.0), &default_thresholds());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, "cpu");
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(alerts[0].threshold, 90.0);
        assert_eq!(alerts[0].observed, 96.0);
    }

    #[test]
    fn warning_band_yields_a_warning_alert() {
        let alerts = evaluate_thresholds(&scan_with(75.0, 50.0, 50.0), &default_thresholds());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
        assert_eq!(alerts[0].threshold, 70.0);
    }

    #[test]
    fn in_range_metrics_raise_nothing() {
        let alerts = evaluate_thresholds(&scan_with(10.0, 20.0, 30.0), &default_thresholds());
        assert!(alerts.is_empty());
    }

    #[test]
    fn each_breaching_volume_alerts_by_mount() {
        let mut scan = scan_with(10.0, 20.0, 96.0);
        scan.disks.push(DiskSample {
            mount: "/data".to_string(),
            total_gb: 500.0,
            used_gb: 450.0,
            percent_used: 90.0,
        });
        let alerts = evaluate_thresholds(&scan, &default_thresholds());
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].metric, "disk:/");
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(alerts[1].metric, "disk:/data");
        assert_eq!(alerts[1].level, AlertLevel::Warning);
    }

    #[test]
    fn missing_threshold_entry_is_skipped() {
        let alerts = evaluate_thresholds(&scan_with(96.0, 96.0, 96.0), &HashMap::new());
        assert!(alerts.is_empty());
    }

    #[test]
    fn latency_average_is_an_incremental_mean() {
        let mut stats = HeartbeatStats::default();
        let expected = [10.0, 15.0, 20.0];
        for (i, latency) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            stats.total_beats += 1;
            stats.record_latency(latency);
            assert!((stats.avg_latency_ms - expected[i]).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn overrun_skips_the_sleep_entirely() {
        let interval = Duration::from_secs(5);
        assert_eq!(
            remaining_sleep(interval, Duration::from_secs(2)),
            Duration::from_secs(3)
        );
        assert_eq!(
            remaining_sleep(interval, Duration::from_secs(5)),
            Duration::ZERO
        );
        assert_eq!(
            remaining_sleep(interval, Duration::from_secs(9)),
            Duration::ZERO
        );
    }
}
