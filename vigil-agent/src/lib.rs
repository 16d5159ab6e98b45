//! Vigil - diagnostic-only local health monitoring agent
//!
//! The agent observes host resource usage on a heartbeat cadence, keeps a
//! bounded in-memory history, raises threshold alerts, and periodically
//! renews (wipes and reinitializes) its own volatile state:
//! - Capsule store: bounded, typed, volatile containers
//! - Awareness scanner: CPU/memory/disk plus processes and network counters
//! - Heartbeat controller: the single-task monitoring loop
//! - Renewal engine: scheduled/pressure/staleness resets
//! - Self-healing classifier: rule-based recovery selection
//!
//! Nothing is persisted and nothing on the host is mutated; telemetry and
//! alerts leave through sink interfaces owned by the embedding process.

pub mod capsule;
pub mod config;
pub mod error;
pub mod healing;
pub mod heartbeat;
pub mod renewal;
pub mod scanner;
pub mod state;
pub mod status;
pub mod telemetry;

pub use capsule::{AlertLevel, AlertRecord, CapsuleKind, CapsuleStore, ThresholdValues};
pub use config::AgentConfig;
pub use error::{AgentError, FailureKind};
pub use healing::{FailureCategory, RecoveryAction, SelfHealer};
pub use heartbeat::{AgentHandle, HealthAgent, HeartbeatStats};
pub use renewal::{RenewalState, RenewalTrigger};
pub use scanner::{MetricSource, Probe, ScanDepth, ScanResult, SysinfoSource};
pub use state::SystemState;
pub use status::StatusSnapshot;
pub use telemetry::{
    AlertSink, TelemetryLevel, TelemetryRecord, TelemetrySink, TracingAlertSink,
    TracingTelemetrySink,
};
