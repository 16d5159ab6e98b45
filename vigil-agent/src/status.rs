//! Read-only status snapshot
//!
//! The controller publishes a fresh snapshot at the end of every tick under
//! a brief lock; external queriers clone it and never touch live state. The
//! status call always succeeds - a degraded or stopped agent reports that
//! state instead of raising.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::capsule::{CapsuleKind, CapsuleStore};
use crate::heartbeat::HeartbeatStats;
use crate::renewal::RenewalState;
use crate::state::SystemState;

/// Identity of the monitored host and this agent instance.
#[derive(Debug, Clone, Serialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub agent_id: String,
    pub started_at: DateTime<Utc>,
}

impl HostIdentity {
    pub fn discover() -> Self {
        Self {
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            agent_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        }
    }
}

/// Per-capsule occupancy summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapsuleStatus {
    pub pattern_entries: usize,
    pub pattern_bytes: usize,
    pub event_entries: usize,
    pub event_bytes: usize,
    pub alert_entries: usize,
    pub alert_bytes: usize,
    pub threshold_entries: usize,
    pub metric_present: bool,
}

impl CapsuleStatus {
    pub fn of(store: &CapsuleStore) -> Self {
        Self {
            pattern_entries: store.pattern_len(),
            pattern_bytes: store.size_estimate(CapsuleKind::Pattern),
            event_entries: store.event_len(),
            event_bytes: store.size_estimate(CapsuleKind::Event),
            alert_entries: store.alert_len(),
            alert_bytes: store.size_estimate(CapsuleKind::Alert),
            threshold_entries: store.threshold_len(),
            metric_present: store.latest_metric().is_some(),
        }
    }
}

/// Full read-only view answered by the status query.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: SystemState,
    pub host: HostIdentity,
    pub capsules: CapsuleStatus,
    pub heartbeat: HeartbeatStats,
    pub renewal: RenewalState,
    pub last_scan_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::CapsuleLimits;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn capsule_status_reflects_store_contents() {
        let mut store = CapsuleStore::new(CapsuleLimits {
            max_pattern_bytes: 10_000,
            max_event_bytes: 10_000,
            event_retention: Duration::minutes(5),
            max_alert_bytes: 10_000,
        });
        store.record_pattern("k", json!({"v": 1})).unwrap();
        store.record_event(Utc::now(), json!({"e": 1})).unwrap();

        let status = CapsuleStatus::of(&store);
        assert_eq!(status.pattern_entries, 1);
        assert_eq!(status.event_entries, 1);
        assert!(status.pattern_bytes > 0);
        assert!(!status.metric_present);
    }

    #[test]
    fn host_identity_has_a_unique_agent_id() {
        let a = HostIdentity::discover();
        let b = HostIdentity::discover();
        assert_ne!(a.agent_id, b.agent_id);
        assert!(!a.hostname.is_empty());
    }
}
