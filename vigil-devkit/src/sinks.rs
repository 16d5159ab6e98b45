//! Capturing sinks
//!
//! Record everything the agent emits so tests can assert on it. Both sinks
//! are cheap clones sharing the same buffers, matching how the agent holds
//! them behind `Arc`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vigil_agent::{AlertRecord, AlertSink, TelemetryLevel, TelemetryRecord, TelemetrySink};

/// Telemetry sink that captures records in memory.
#[derive(Clone, Default)]
pub struct CapturingTelemetrySink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
    flushes: Arc<AtomicUsize>,
}

impl CapturingTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything accepted so far.
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn messages_containing(&self, needle: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.message.contains(needle))
            .count()
    }

    pub fn count_at_level(&self, level: TelemetryLevel) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.level == level)
            .count()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl TelemetrySink for CapturingTelemetrySink {
    fn accept(&self, record: TelemetryRecord) {
        self.records.lock().unwrap().push(record);
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Alert sink that captures alert records in memory.
#[derive(Clone, Default)]
pub struct CapturingAlertSink {
    alerts: Arc<Mutex<Vec<AlertRecord>>>,
    flushes: Arc<AtomicUsize>,
}

impl CapturingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn alerts_for(&self, metric: &str) -> Vec<AlertRecord> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|alert| alert.metric == metric)
            .cloned()
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl AlertSink for CapturingAlertSink {
    fn accept(&self, alert: &AlertRecord) {
        self.alerts.lock().unwrap().push(alert.clone());
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_agent::AlertLevel;

    #[test]
    fn telemetry_sink_captures_and_filters() {
        let sink = CapturingTelemetrySink::new();
        sink.accept(TelemetryRecord::new(TelemetryLevel::Info, "beat complete"));
        sink.accept(TelemetryRecord::new(TelemetryLevel::Error, "beat failed"));
        sink.flush();

        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.messages_containing("failed"), 1);
        assert_eq!(sink.count_at_level(TelemetryLevel::Error), 1);
        assert_eq!(sink.flush_count(), 1);
    }

    #[test]
    fn alert_sink_filters_by_metric() {
        let sink = CapturingAlertSink::new();
        let now = Utc::now();
        sink.accept(&AlertRecord::new("cpu", AlertLevel::Critical, 90.0, 96.0, now));
        sink.accept(&AlertRecord::new("memory", AlertLevel::Warning, 75.0, 80.0, now));

        assert_eq!(sink.alerts().len(), 2);
        assert_eq!(sink.alerts_for("cpu").len(), 1);
        assert_eq!(sink.alerts_for("disk:/").len(), 0);
    }
}
