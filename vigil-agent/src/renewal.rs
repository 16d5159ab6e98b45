//! Renewal engine
//!
//! Periodically wipes and reinitializes the volatile capsules so memory use
//! and data staleness stay bounded. A renewal fires on any one of three
//! conditions: a scheduled interval, size pressure in a bounded capsule, or
//! too many cycles since the last reset. Threshold calibration (and
//! optionally recent patterns) survives via snapshot/restore.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::capsule::{CapsuleKind, CapsuleStore};
use crate::config::RenewalConfig;
use crate::error::AgentError;

/// Why a renewal fired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "trigger")]
pub enum RenewalTrigger {
    /// The scheduled interval elapsed.
    Scheduled,
    /// A bounded capsule crossed the pressure threshold.
    Pressure { kind: CapsuleKind, ratio: f64 },
    /// Too many heartbeat cycles without a reset.
    Stale { cycles: u64 },
    /// Operator request through the control surface.
    Forced,
}

impl std::fmt::Display for RenewalTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenewalTrigger::Scheduled => write!(f, "scheduled interval elapsed"),
            RenewalTrigger::Pressure { kind, ratio } => {
                write!(f, "{} capsule at {:.0}% occupancy", kind, ratio * 100.0)
            }
            RenewalTrigger::Stale { cycles } => write!(f, "{} cycles without renewal", cycles),
            RenewalTrigger::Forced => write!(f, "forced by operator"),
        }
    }
}

/// Renewal counters; reset only here.
#[derive(Debug, Clone, Serialize)]
pub struct RenewalState {
    pub last_renewal_at: DateTime<Utc>,
    pub renewal_count: u64,
    pub partial_count: u64,
    pub cycles_since_renewal: u64,
}

/// Outcome of one renewal cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RenewalReport {
    pub freed_bytes: usize,
    pub preserved_thresholds: usize,
    pub preserved_patterns: usize,
}

pub struct RenewalEngine {
    scheduled_interval: Duration,
    pressure_pct: f64,
    stale_cycles: u64,
    state: RenewalState,
}

impl RenewalEngine {
    pub fn new(config: &RenewalConfig, now: DateTime<Utc>) -> Self {
        Self {
            scheduled_interval: Duration::hours(config.scheduled_interval_hours as i64),
            pressure_pct: config.memory_pressure_pct,
            stale_cycles: config.stale_cycles,
            state: RenewalState {
                last_renewal_at: now,
                renewal_count: 0,
                partial_count: 0,
                cycles_since_renewal: 0,
            },
        }
    }

    /// Called once per heartbeat tick.
    pub fn note_beat(&mut self) {
        self.state.cycles_since_renewal += 1;
    }

    /// Check the three trigger conditions; any one is sufficient.
    pub fn should_renew(&self, store: &CapsuleStore, now: DateTime<Utc>) -> Option<RenewalTrigger> {
        if now - self.state.last_renewal_at >= self.scheduled_interval {
            return Some(RenewalTrigger::Scheduled);
        }
        for kind in CapsuleKind::BOUNDED {
            let ratio = store.fill_ratio(kind);
            if ratio * 100.0 >= self.pressure_pct {
                return Some(RenewalTrigger::Pressure { kind, ratio });
            }
        }
        if self.state.cycles_since_renewal >= self.stale_cycles {
            return Some(RenewalTrigger::Stale {
                cycles: self.state.cycles_since_renewal,
            });
        }
        None
    }

    /// Full renewal: snapshot calibration, clear everything, reset the
    /// counters, restore. Single pass - a failure after the clear leaves an
    /// empty-but-consistent store, never a torn one.
    pub fn renew(
        &mut self,
        store: &mut CapsuleStore,
        now: DateTime<Utc>,
        preserve_patterns: bool,
    ) -> Result<RenewalReport, AgentError> {
        let occupied_before: usize = CapsuleKind::ALL
            .iter()
            .map(|kind| store.size_estimate(*kind))
            .sum();

        let snapshot = store.snapshot(preserve_patterns);
        let preserved_thresholds = snapshot.thresholds.len();
        let preserved_patterns = snapshot.patterns.as_ref().map_or(0, Vec::len);

        store.clear_all();
        self.state.last_renewal_at = now;
        self.state.renewal_count += 1;
        self.state.cycles_since_renewal = 0;

        store
            .restore(snapshot)
            .map_err(|err| AgentError::renewal(format!("restore after clear failed: {}", err)))?;

        let occupied_after: usize = CapsuleKind::ALL
            .iter()
            .map(|kind| store.size_estimate(*kind))
            .sum();

        Ok(RenewalReport {
            freed_bytes: occupied_before.saturating_sub(occupied_after),
            preserved_thresholds,
            preserved_patterns,
        })
    }

    /// Partial renewal: clear only the per-tick capsules and halve the
    /// staleness counter. Exposed for moderate pressure; never auto-selected
    /// by the controller.
    pub fn renew_partial(&mut self, store: &mut CapsuleStore) -> RenewalReport {
        let occupied_before: usize = [CapsuleKind::Event, CapsuleKind::Metric, CapsuleKind::Alert]
            .iter()
            .map(|kind| store.size_estimate(*kind))
            .sum();

        store.clear(CapsuleKind::Event);
        store.clear(CapsuleKind::Metric);
        store.clear(CapsuleKind::Alert);
        self.state.cycles_since_renewal /= 2;
        self.state.partial_count += 1;

        RenewalReport {
            freed_bytes: occupied_before,
            preserved_thresholds: store.threshold_len(),
            preserved_patterns: store.pattern_len(),
        }
    }

    /// Recovery hook: restart the trigger clock without touching the
    /// monotonic counts.
    pub fn reset_counters(&mut self, now: DateTime<Utc>) {
        self.state.last_renewal_at = now;
        self.state.cycles_since_renewal = 0;
    }

    pub fn status(&self) -> RenewalState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::{CapsuleLimits, ThresholdValues};
    use serde_json::json;

    fn engine(hours: u64, pressure: f64, stale: u64) -> RenewalEngine {
        RenewalEngine::new(
            &RenewalConfig {
                scheduled_interval_hours: hours,
                memory_pressure_pct: pressure,
                stale_cycles: stale,
            },
            Utc::now(),
        )
    }

    fn store() -> CapsuleStore {
        let mut store = CapsuleStore::new(CapsuleLimits {
            max_pattern_bytes: 1_000,
            max_event_bytes: 1_000,
            event_retention: Duration::minutes(60),
            max_alert_bytes: 1_000,
        });
        store.set_threshold(
            "cpu",
            ThresholdValues {
                warning: 70.0,
                critical: 90.0,
            },
        );
        store
    }

    #[test]
    fn no_trigger_when_fresh() {
        let engine = engine(24, 80.0, 100);
        assert!(engine.should_renew(&store(), Utc::now()).is_none());
    }

    #[test]
    fn scheduled_trigger_after_interval() {
        let engine = engine(24, 80.0, 100);
        let later = Utc::now() + Duration::hours(25);
        assert_eq!(
            engine.should_renew(&store(), later),
            Some(RenewalTrigger::Scheduled)
        );
    }

    #[test]
    fn pressure_trigger_when_a_capsule_fills() {
        let engine = engine(24, 50.0, 100);
        let mut store = store();
        store
            .record_pattern("k", json!({"data": "x".repeat(600)}))
            .unwrap();
        match engine.should_renew(&store, Utc::now()) {
            Some(RenewalTrigger::Pressure { kind, .. }) => {
                assert_eq!(kind, CapsuleKind::Pattern)
            }
            other => panic!("expected pressure trigger, got {:?}", other),
        }
    }

    #[test]
    fn staleness_trigger_after_enough_cycles() {
        let mut engine = engine(24, 80.0, 5);
        for _ in 0..5 {
            engine.note_beat();
        }
        assert!(matches!(
            engine.should_renew(&store(), Utc::now()),
            Some(RenewalTrigger::Stale { cycles: 5 })
        ));
    }

    #[test]
    fn full_renewal_resets_counters_and_preserves_thresholds() {
        let mut engine = engine(24, 80.0, 100);
        let mut store = store();
        store.record_event(Utc::now(), json!({"e": 1})).unwrap();
        for _ in 0..7 {
            engine.note_beat();
        }

        let report = engine.renew(&mut store, Utc::now(), false).unwrap();

        let state = engine.status();
        assert_eq!(state.cycles_since_renewal, 0);
        assert_eq!(state.renewal_count, 1);
        assert_eq!(report.preserved_thresholds, 1);
        assert_eq!(store.threshold("cpu").unwrap().critical, 90.0);
        assert_eq!(store.event_len(), 0);
    }

    #[test]
    fn every_full_renewal_increments_count_exactly_once() {
        let mut engine = engine(24, 80.0, 100);
        let mut store = store();
        for expected in 1..=3 {
            engine.renew(&mut store, Utc::now(), false).unwrap();
            assert_eq!(engine.status().renewal_count, expected);
        }
    }

    #[test]
    fn partial_renewal_halves_staleness_and_keeps_patterns() {
        let mut engine = engine(24, 80.0, 100);
        let mut store = store();
        store.record_pattern("p", json!({"v": 1})).unwrap();
        store.record_event(Utc::now(), json!({"e": 1})).unwrap();
        for _ in 0..9 {
            engine.note_beat();
        }

        engine.renew_partial(&mut store);

        let state = engine.status();
        assert_eq!(state.cycles_since_renewal, 4);
        assert_eq!(state.partial_count, 1);
        assert_eq!(state.renewal_count, 0);
        assert_eq!(store.pattern_len(), 1);
        assert_eq!(store.event_len(), 0);
        assert_eq!(store.threshold_len(), 1);
    }

    #[test]
    fn preserving_renewal_carries_recent_patterns() {
        let mut engine = engine(24, 80.0, 100);
        let mut store = store();
        store.record_pattern("p-1", json!({"v": 1})).unwrap();
        store.record_pattern("p-2", json!({"v": 2})).unwrap();

        let report = engine.renew(&mut store, Utc::now(), true).unwrap();

        assert_eq!(report.preserved_patterns, 2);
        assert!(store.pattern("p-1").is_some());
        assert!(store.pattern("p-2").is_some());
    }
}
