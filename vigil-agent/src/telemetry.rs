//! Telemetry and alert sinks
//!
//! The core never formats output to a terminal or file itself; structured
//! records go through these sink interfaces. The production sinks forward to
//! `tracing`; capturing sinks for tests live in the devkit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::capsule::AlertRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// One structured log entry handed to the telemetry sink.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub level: TelemetryLevel,
    pub message: String,
    pub data: Option<Value>,
}

impl TelemetryRecord {
    pub fn new(level: TelemetryLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Receives structured log entries. `accept` must never block the
/// monitoring loop; `flush` is called once during shutdown.
pub trait TelemetrySink: Send + Sync {
    fn accept(&self, record: TelemetryRecord);

    fn flush(&self) {}
}

/// Receives alert records as they are raised.
pub trait AlertSink: Send + Sync {
    fn accept(&self, alert: &AlertRecord);

    fn flush(&self) {}
}

/// Telemetry sink forwarding to the `tracing` subscriber.
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn accept(&self, record: TelemetryRecord) {
        match record.level {
            TelemetryLevel::Debug => debug!(data = ?record.data, "{}", record.message),
            TelemetryLevel::Info => info!(data = ?record.data, "{}", record.message),
            TelemetryLevel::Warning => warn!(data = ?record.data, "{}", record.message),
            TelemetryLevel::Error => error!(data = ?record.data, "{}", record.message),
        }
    }
}

/// Alert sink forwarding to the `tracing` subscriber.
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn accept(&self, alert: &AlertRecord) {
        warn!(
            metric = %alert.metric,
            level = %alert.level,
            observed = alert.observed,
            threshold = alert.threshold,
            "threshold breach"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_builder_attaches_data() {
        let record = TelemetryRecord::new(TelemetryLevel::Info, "beat complete")
            .with_data(serde_json::json!({"beat": 3}));
        assert_eq!(record.level, TelemetryLevel::Info);
        assert_eq!(record.data.unwrap()["beat"], 3);
    }
}
