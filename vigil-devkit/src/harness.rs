//! Test harness
//!
//! Wires a [`HealthAgent`] to capturing sinks and a scripted source, with a
//! cadence fast enough for integration tests.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

use vigil_agent::{AgentConfig, AgentError, AgentHandle, HealthAgent, MetricSource};

use crate::sinks::{CapturingAlertSink, CapturingTelemetrySink};

/// Complete test setup around one agent instance.
pub struct TestHarness {
    pub telemetry: CapturingTelemetrySink,
    pub alerts: CapturingAlertSink,
    pub handle: AgentHandle,
    agent: Option<HealthAgent>,
}

impl TestHarness {
    /// One-second cadence, tight timeouts, small capsules. Renewal triggers
    /// are pushed far out so cycles only happen when a test forces them.
    pub fn fast_config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.heartbeat.interval_seconds = 1;
        config.heartbeat.timeout_ms = 400;
        config.heartbeat.max_retries = 1;
        config.capsules.max_pattern_size_mb = 1;
        config.capsules.max_event_size_mb = 1;
        config.capsules.event_retention_minutes = 5;
        config.capsules.max_alert_size_kb = 64;
        config.renewal.memory_pressure_pct = 99.0;
        config.renewal.stale_cycles = 100_000;
        config
    }

    /// Build an agent over the given source, capturing everything it emits.
    pub fn build(config: AgentConfig, source: Arc<dyn MetricSource>) -> Result<Self> {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let telemetry = CapturingTelemetrySink::new();
        let alerts = CapturingAlertSink::new();
        let agent = HealthAgent::with_source(
            config,
            source,
            Arc::new(telemetry.clone()),
            Arc::new(alerts.clone()),
        )
        .context("failed to assemble test agent")?;
        let handle = agent.handle();

        Ok(Self {
            telemetry,
            alerts,
            handle,
            agent: Some(agent),
        })
    }

    /// Spawn the monitoring loop; stop it through `handle.stop()` and await
    /// the returned task.
    pub fn spawn(&mut self) -> JoinHandle<Result<(), AgentError>> {
        let agent = self.agent.take().expect("agent already spawned");
        tokio::spawn(agent.run())
    }
}
