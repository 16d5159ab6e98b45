//! End-to-end loop tests over scripted sources and capturing sinks

use std::sync::Arc;
use std::time::Duration;

use vigil_agent::{AlertLevel, Probe, ScanDepth, SystemState};
use vigil_devkit::{StaticMetricSource, TestHarness};

#[tokio::test]
async fn critical_cpu_raises_only_cpu_critical_alerts() {
    let source = Arc::new(StaticMetricSource::healthy().with_cpu(96.0));
    let mut harness = TestHarness::build(TestHarness::fast_config(), source).unwrap();
    let worker = harness.spawn();

    tokio::time::sleep(Duration::from_millis(400)).await;
    harness.handle.stop();
    worker.await.unwrap().unwrap();

    let alerts = harness.alerts.alerts();
    assert!(!alerts.is_empty());
    assert!(alerts
        .iter()
        .all(|alert| alert.metric == "cpu" && alert.level == AlertLevel::Critical));
    assert!(harness.alerts.alerts_for("memory").is_empty());
    assert!(alerts.iter().all(|alert| alert.observed == 96.0 && alert.threshold == 90.0));
}

#[tokio::test]
async fn manual_scan_answers_while_the_loop_runs() {
    let source = Arc::new(StaticMetricSource::healthy());
    let mut harness = TestHarness::build(TestHarness::fast_config(), source).unwrap();
    let worker = harness.spawn();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let scan = harness.handle.manual_scan(ScanDepth::Quick).await.unwrap();
    assert_eq!(scan.cpu.percent, 10.0);
    assert!(scan.processes.is_none());
    assert!(!scan.is_degraded());

    harness.handle.stop();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn failing_probe_degrades_the_scan_but_beats_succeed() {
    let source = Arc::new(StaticMetricSource::healthy().failing(Probe::Cpu));
    let mut harness = TestHarness::build(TestHarness::fast_config(), source).unwrap();
    let worker = harness.spawn();

    tokio::time::sleep(Duration::from_millis(400)).await;
    let status = harness.handle.status();
    assert_eq!(status.state, SystemState::Running);
    assert!(status.heartbeat.succeeded >= 1);
    assert_eq!(status.heartbeat.failed, 0);
    assert!(harness.telemetry.messages_containing("cpu probe degraded") >= 1);

    harness.handle.stop();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn total_collection_failure_enters_degraded_mode() {
    let source = Arc::new(
        StaticMetricSource::healthy()
            .failing(Probe::Cpu)
            .failing(Probe::Memory)
            .failing(Probe::Disk),
    );
    let mut harness = TestHarness::build(TestHarness::fast_config(), source).unwrap();
    let worker = harness.spawn();

    // One beat plus one retry delay (timeout_ms / 2 = 200ms)
    tokio::time::sleep(Duration::from_millis(800)).await;
    let status = harness.handle.status();
    assert_eq!(status.state, SystemState::Degraded);
    assert!(status.heartbeat.failed >= 1);

    harness.handle.stop();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn degraded_mode_recovers_after_clean_beats() {
    let source = Arc::new(
        StaticMetricSource::healthy()
            .failing(Probe::Cpu)
            .failing(Probe::Memory)
            .failing(Probe::Disk),
    );
    let mut harness = TestHarness::build(TestHarness::fast_config(), source.clone()).unwrap();
    let worker = harness.spawn();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(harness.handle.status().state, SystemState::Degraded);

    // Host recovers; three consecutive clean beats bring the agent back
    source.heal_all();
    tokio::time::sleep(Duration::from_millis(3600)).await;
    let status = harness.handle.status();
    assert_eq!(status.state, SystemState::Running);
    assert!(status.heartbeat.succeeded >= 3);

    harness.handle.stop();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn forced_renewal_resets_counters_and_keeps_thresholds() {
    let source = Arc::new(StaticMetricSource::healthy());
    let mut harness = TestHarness::build(TestHarness::fast_config(), source).unwrap();
    let worker = harness.spawn();

    tokio::time::sleep(Duration::from_millis(400)).await;
    let before = harness.handle.status().renewal.renewal_count;

    assert!(harness.handle.force_renew().await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = harness.handle.status();
    assert_eq!(status.renewal.renewal_count, before + 1);
    assert!(status.renewal.cycles_since_renewal <= 1);
    // Threshold calibration survives the cycle
    assert_eq!(status.capsules.threshold_entries, 3);

    harness.handle.stop();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn partial_renewal_clears_per_tick_capsules_only() {
    let source = Arc::new(StaticMetricSource::healthy().with_cpu(96.0));
    let mut harness = TestHarness::build(TestHarness::fast_config(), source).unwrap();
    let worker = harness.spawn();

    tokio::time::sleep(Duration::from_millis(400)).await;
    let before = harness.handle.status();
    assert!(before.capsules.alert_entries >= 1);
    assert!(before.capsules.pattern_entries >= 1);

    assert!(harness.handle.force_partial_renew().await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = harness.handle.status();
    assert_eq!(status.capsules.alert_entries, 0);
    assert_eq!(status.capsules.event_entries, 0);
    assert!(!status.capsules.metric_present);
    // Pattern history and thresholds survive a partial cycle
    assert!(status.capsules.pattern_entries >= before.capsules.pattern_entries);
    assert_eq!(status.capsules.threshold_entries, 3);
    assert_eq!(status.renewal.renewal_count, 0);
    assert_eq!(status.renewal.partial_count, 1);

    harness.handle.stop();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_flushes_sinks_and_clears_every_capsule() {
    let source = Arc::new(StaticMetricSource::healthy().with_cpu(96.0));
    let mut harness = TestHarness::build(TestHarness::fast_config(), source).unwrap();
    let worker = harness.spawn();

    tokio::time::sleep(Duration::from_millis(400)).await;
    harness.handle.stop();
    worker.await.unwrap().unwrap();

    // Status still answers after the loop exits
    let status = harness.handle.status();
    assert_eq!(status.state, SystemState::Stopped);
    assert!(!status.heartbeat.running);
    assert_eq!(status.capsules.pattern_entries, 0);
    assert_eq!(status.capsules.event_entries, 0);
    assert_eq!(status.capsules.alert_entries, 0);
    assert!(!status.capsules.metric_present);
    assert!(harness.telemetry.flush_count() >= 1);
    assert!(harness.alerts.flush_count() >= 1);
}

#[tokio::test]
async fn beats_accumulate_latency_statistics() {
    let source = Arc::new(StaticMetricSource::healthy());
    let mut harness = TestHarness::build(TestHarness::fast_config(), source).unwrap();
    let worker = harness.spawn();

    tokio::time::sleep(Duration::from_millis(1400)).await;
    let status = harness.handle.status();
    assert!(status.heartbeat.total_beats >= 2);
    assert_eq!(status.heartbeat.failed, 0);
    assert!(status.heartbeat.avg_latency_ms >= 0.0);
    assert!(status.heartbeat.last_beat_at.is_some());
    assert!(status.last_scan_at.is_some());

    harness.handle.stop();
    worker.await.unwrap().unwrap();
}
