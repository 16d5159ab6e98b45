//! Vigil agent binary
//!
//! Loads configuration, wires the tracing-backed sinks, and runs the
//! monitoring loop until ctrl-c.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use vigil_agent::{AgentConfig, HealthAgent, TracingAlertSink, TracingTelemetrySink};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = AgentConfig::load()
        .await
        .context("failed to load configuration")?;
    info!(
        "vigil agent starting (interval {}s, self-healing {})",
        config.heartbeat.interval_seconds,
        if config.self_healing_enabled {
            "on"
        } else {
            "off"
        }
    );

    let agent = HealthAgent::new(
        config,
        Arc::new(TracingTelemetrySink),
        Arc::new(TracingAlertSink),
    )
    .context("failed to initialize agent")?;

    let handle = agent.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop signal received");
            handle.stop();
        }
    });

    agent.run().await.context("agent execution failed")?;
    Ok(())
}
