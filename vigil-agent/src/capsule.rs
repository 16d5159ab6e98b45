//! Bounded volatile capsules
//!
//! One typed, bounded, in-memory container per observation category:
//! - Pattern: timestamp-keyed observation payloads, bounded by serialized size
//! - Event: ordered entries pruned by retention window
//! - Threshold: metric name -> warning/critical pair, overwritten in place
//! - Metric: single slot holding the latest scan snapshot
//! - Alert: ordered alert records, bounded by serialized size
//!
//! Size accounting is incremental: every entry carries its serialized byte
//! count, so eviction at the boundary is O(1) per removed entry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

use crate::config::CapsuleConfig;
use crate::error::AgentError;
use crate::scanner::ScanResult;

/// After a store overflows its maximum, eviction continues down to this
/// fraction of the maximum (hysteresis against per-insert thrashing).
const PRUNE_TARGET_RATIO: f64 = 0.8;

/// Newest Pattern entries carried through a preserving renewal snapshot.
const SNAPSHOT_PATTERN_KEEP: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleKind {
    Pattern,
    Event,
    Threshold,
    Metric,
    Alert,
}

impl CapsuleKind {
    pub const ALL: [CapsuleKind; 5] = [
        CapsuleKind::Pattern,
        CapsuleKind::Event,
        CapsuleKind::Threshold,
        CapsuleKind::Metric,
        CapsuleKind::Alert,
    ];

    /// Kinds with a configured byte maximum; only these report a fill ratio.
    pub const BOUNDED: [CapsuleKind; 3] =
        [CapsuleKind::Pattern, CapsuleKind::Event, CapsuleKind::Alert];
}

impl std::fmt::Display for CapsuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CapsuleKind::Pattern => "pattern",
            CapsuleKind::Event => "event",
            CapsuleKind::Threshold => "threshold",
            CapsuleKind::Metric => "metric",
            CapsuleKind::Alert => "alert",
        };
        write!(f, "{}", name)
    }
}

/// Warning/critical boundary pair for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdValues {
    pub warning: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Warning => write!(f, "warning"),
            AlertLevel::Critical => write!(f, "critical"),
        }
    }
}

/// One threshold breach, stored in the Alert capsule and forwarded to the
/// alert sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub metric: String,
    pub level: AlertLevel,
    pub threshold: f64,
    pub observed: f64,
    pub raised_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn new(
        metric: impl Into<String>,
        level: AlertLevel,
        threshold: f64,
        observed: f64,
        raised_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            metric: metric.into(),
            level,
            threshold,
            observed,
            raised_at,
        }
    }
}

/// Entry in the Event capsule.
#[derive(Debug, Clone, Serialize)]
pub struct EventEntry {
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(skip)]
    bytes: usize,
}

/// Entry in the Alert capsule.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAlert {
    pub timestamp: DateTime<Utc>,
    pub record: AlertRecord,
    #[serde(skip)]
    bytes: usize,
}

/// Latest scan, single slot.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub collected_at: DateTime<Utc>,
    pub scan: ScanResult,
}

#[derive(Debug, Clone)]
struct PatternEntry {
    payload: Value,
    bytes: usize,
}

/// Byte/retention bounds for the store, derived from configuration.
#[derive(Debug, Clone)]
pub struct CapsuleLimits {
    pub max_pattern_bytes: usize,
    pub max_event_bytes: usize,
    pub event_retention: Duration,
    pub max_alert_bytes: usize,
}

impl CapsuleLimits {
    pub fn from_config(config: &CapsuleConfig) -> Self {
        Self {
            max_pattern_bytes: (config.max_pattern_size_mb as usize) * 1024 * 1024,
            max_event_bytes: (config.max_event_size_mb as usize) * 1024 * 1024,
            event_retention: Duration::minutes(config.event_retention_minutes as i64),
            max_alert_bytes: (config.max_alert_size_kb as usize) * 1024,
        }
    }
}

/// Calibration state carried across a full renewal.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub thresholds: HashMap<String, ThresholdValues>,
    pub patterns: Option<Vec<(String, Value)>>,
}

/// The five capsules behind one owner.
///
/// Exactly one instance is mutated per process, from the heartbeat
/// controller's task; external readers only ever see cloned status
/// snapshots.
pub struct CapsuleStore {
    pattern: BTreeMap<String, PatternEntry>,
    pattern_bytes: usize,
    event: VecDeque<EventEntry>,
    event_bytes: usize,
    threshold: HashMap<String, ThresholdValues>,
    metric: Option<MetricSnapshot>,
    metric_bytes: usize,
    alert: VecDeque<StoredAlert>,
    alert_bytes: usize,
    limits: CapsuleLimits,
}

impl CapsuleStore {
    pub fn new(limits: CapsuleLimits) -> Self {
        Self {
            pattern: BTreeMap::new(),
            pattern_bytes: 0,
            event: VecDeque::new(),
            event_bytes: 0,
            threshold: HashMap::new(),
            metric: None,
            metric_bytes: 0,
            alert: VecDeque::new(),
            alert_bytes: 0,
            limits,
        }
    }

    // --- store operations ---

    /// Store an observation payload under a timestamp-string key, then prune
    /// oldest-first if the capsule overflowed. Atomic store-or-reject: a
    /// rejected payload leaves the capsule untouched.
    pub fn record_pattern(
        &mut self,
        key: impl Into<String>,
        payload: Value,
    ) -> Result<(), AgentError> {
        let key = key.into();
        if key.is_empty() {
            return Err(AgentError::validation("pattern key must not be empty"));
        }
        if payload.is_null() {
            return Err(AgentError::validation("pattern payload must not be null"));
        }
        let bytes = key.len() + serialized_size(&payload);
        if bytes > self.limits.max_pattern_bytes {
            return Err(AgentError::validation(format!(
                "pattern entry of {} bytes exceeds the capsule maximum",
                bytes
            )));
        }
        if let Some(old) = self.pattern.insert(key, PatternEntry { payload, bytes }) {
            self.pattern_bytes -= old.bytes;
        }
        self.pattern_bytes += bytes;
        self.prune_pattern();
        Ok(())
    }

    /// Append an event, then drop every entry older than the retention
    /// window relative to `now`.
    pub fn record_event(&mut self, now: DateTime<Utc>, payload: Value) -> Result<(), AgentError> {
        if payload.is_null() {
            return Err(AgentError::validation("event payload must not be null"));
        }
        let mut entry = EventEntry {
            timestamp: now,
            payload,
            bytes: 0,
        };
        entry.bytes = serialized_size(&entry);
        self.event_bytes += entry.bytes;
        self.event.push_back(entry);
        self.prune_events(now);
        Ok(())
    }

    pub fn set_threshold(&mut self, metric: impl Into<String>, values: ThresholdValues) {
        self.threshold.insert(metric.into(), values);
    }

    pub fn set_thresholds<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (S, ThresholdValues)>,
        S: Into<String>,
    {
        for (metric, values) in entries {
            self.set_threshold(metric, values);
        }
    }

    /// Overwrite the single metric slot.
    pub fn set_metric(&mut self, snapshot: MetricSnapshot) {
        self.metric_bytes = serialized_size(&snapshot);
        self.metric = Some(snapshot);
    }

    /// Append an alert record, then prune oldest-first on overflow.
    pub fn push_alert(&mut self, record: AlertRecord) -> Result<(), AgentError> {
        let mut entry = StoredAlert {
            timestamp: record.raised_at,
            record,
            bytes: 0,
        };
        entry.bytes = serialized_size(&entry);
        if entry.bytes > self.limits.max_alert_bytes {
            return Err(AgentError::validation(format!(
                "alert record of {} bytes exceeds the capsule maximum",
                entry.bytes
            )));
        }
        self.alert_bytes += entry.bytes;
        self.alert.push_back(entry);
        self.prune_alerts();
        Ok(())
    }

    // --- reads (absent keys yield None, never an error) ---

    pub fn pattern(&self, key: &str) -> Option<&Value> {
        self.pattern.get(key).map(|entry| &entry.payload)
    }

    pub fn pattern_len(&self) -> usize {
        self.pattern.len()
    }

    pub fn pattern_keys(&self) -> impl Iterator<Item = &str> {
        self.pattern.keys().map(String::as_str)
    }

    pub fn events(&self) -> impl Iterator<Item = &EventEntry> {
        self.event.iter()
    }

    pub fn event_len(&self) -> usize {
        self.event.len()
    }

    pub fn threshold(&self, metric: &str) -> Option<&ThresholdValues> {
        self.threshold.get(metric)
    }

    pub fn thresholds(&self) -> &HashMap<String, ThresholdValues> {
        &self.threshold
    }

    pub fn threshold_len(&self) -> usize {
        self.threshold.len()
    }

    pub fn latest_metric(&self) -> Option<&MetricSnapshot> {
        self.metric.as_ref()
    }

    pub fn alerts(&self) -> impl Iterator<Item = &StoredAlert> {
        self.alert.iter()
    }

    pub fn alert_len(&self) -> usize {
        self.alert.len()
    }

    // --- size accounting ---

    /// Approximate occupied size in serialized bytes. Never fails.
    pub fn size_estimate(&self, kind: CapsuleKind) -> usize {
        match kind {
            CapsuleKind::Pattern => self.pattern_bytes,
            CapsuleKind::Event => self.event_bytes,
            CapsuleKind::Threshold => serialized_size(&self.threshold),
            CapsuleKind::Metric => self.metric_bytes,
            CapsuleKind::Alert => self.alert_bytes,
        }
    }

    /// Occupied fraction of the configured maximum for bounded kinds;
    /// 0.0 for Threshold and Metric, which carry no maximum.
    pub fn fill_ratio(&self, kind: CapsuleKind) -> f64 {
        let max = match kind {
            CapsuleKind::Pattern => self.limits.max_pattern_bytes,
            CapsuleKind::Event => self.limits.max_event_bytes,
            CapsuleKind::Alert => self.limits.max_alert_bytes,
            CapsuleKind::Threshold | CapsuleKind::Metric => return 0.0,
        };
        if max == 0 {
            return 0.0;
        }
        self.size_estimate(kind) as f64 / max as f64
    }

    // --- clearing ---

    /// Empty one capsule. Idempotent.
    pub fn clear(&mut self, kind: CapsuleKind) {
        match kind {
            CapsuleKind::Pattern => {
                self.pattern.clear();
                self.pattern_bytes = 0;
            }
            CapsuleKind::Event => {
                self.event.clear();
                self.event_bytes = 0;
            }
            CapsuleKind::Threshold => self.threshold.clear(),
            CapsuleKind::Metric => {
                self.metric = None;
                self.metric_bytes = 0;
            }
            CapsuleKind::Alert => {
                self.alert.clear();
                self.alert_bytes = 0;
            }
        }
    }

    /// Empty every capsule. Idempotent.
    pub fn clear_all(&mut self) {
        for kind in CapsuleKind::ALL {
            self.clear(kind);
        }
    }

    // --- snapshot/restore (renewal support) ---

    /// Capture the Threshold container and, when asked, the newest Pattern
    /// entries, for restoration after a full renewal.
    pub fn snapshot(&self, preserve_patterns: bool) -> StoreSnapshot {
        let patterns = preserve_patterns.then(|| {
            let keep: Vec<(String, Value)> = self
                .pattern
                .iter()
                .rev()
                .take(SNAPSHOT_PATTERN_KEEP)
                .map(|(key, entry)| (key.clone(), entry.payload.clone()))
                .collect();
            keep
        });
        StoreSnapshot {
            thresholds: self.threshold.clone(),
            patterns,
        }
    }

    /// Re-insert a snapshot into the (usually just-cleared) containers.
    pub fn restore(&mut self, snapshot: StoreSnapshot) -> Result<(), AgentError> {
        for (metric, values) in snapshot.thresholds {
            self.threshold.insert(metric, values);
        }
        if let Some(patterns) = snapshot.patterns {
            // Entries were captured newest-first; re-insert oldest-first so
            // eviction order stays meaningful.
            for (key, payload) in patterns.into_iter().rev() {
                self.record_pattern(key, payload)?;
            }
        }
        Ok(())
    }

    // --- pruning ---

    fn prune_pattern(&mut self) {
        if self.pattern_bytes <= self.limits.max_pattern_bytes {
            return;
        }
        let target = (self.limits.max_pattern_bytes as f64 * PRUNE_TARGET_RATIO) as usize;
        while self.pattern_bytes > target {
            match self.pattern.pop_first() {
                Some((_, entry)) => self.pattern_bytes -= entry.bytes,
                None => {
                    self.pattern_bytes = 0;
                    break;
                }
            }
        }
    }

    fn prune_events(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.event.front() {
            if now - front.timestamp <= self.limits.event_retention {
                break;
            }
            let bytes = front.bytes;
            self.event.pop_front();
            self.event_bytes -= bytes;
        }
    }

    fn prune_alerts(&mut self) {
        if self.alert_bytes <= self.limits.max_alert_bytes {
            return;
        }
        let target = (self.limits.max_alert_bytes as f64 * PRUNE_TARGET_RATIO) as usize;
        while self.alert_bytes > target {
            match self.alert.pop_front() {
                Some(entry) => self.alert_bytes -= entry.bytes,
                None => {
                    self.alert_bytes = 0;
                    break;
                }
            }
        }
    }
}

/// Serialized byte count of a value; 0 on the (unreachable for plain data)
/// serialization failure, so size accounting never fails a store operation.
fn serialized_size<T: Serialize>(value: &T) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}
