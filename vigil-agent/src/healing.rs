//! Self-healing classifier
//!
//! Categorizes caught failures and selects a recovery action. Classification
//! reads the explicit [`FailureKind`] tag carried by every error - message
//! text is never inspected.

use serde::Serialize;

use crate::error::{AgentError, FailureKind};

/// Degradable classifications tolerated while already degraded before the
/// classifier escalates to a graceful shutdown.
const MAX_DEGRADED_STRIKES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    /// Worth retrying; the heartbeat retry policy handles it.
    Transient,
    /// The failing subsystem's in-memory state should be reset.
    Recoverable,
    /// Keep operating at reduced scope.
    Degradable,
    /// Graceful shutdown.
    Critical,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureCategory::Transient => "transient",
            FailureCategory::Recoverable => "recoverable",
            FailureCategory::Degradable => "degradable",
            FailureCategory::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// What the controller should do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing now; the next tick retries naturally.
    Retry,
    /// Reset the in-memory state of the subsystem that raised the kind.
    ResetSubsystem(FailureKind),
    /// Transition to Degraded and continue with Quick-only scans.
    EnterDegraded,
    /// Flush telemetry, clear capsules, stop.
    Shutdown,
}

/// Classification counters, reported through telemetry.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ClassificationCounts {
    pub transient: u64,
    pub recoverable: u64,
    pub degradable: u64,
    pub critical: u64,
}

pub struct SelfHealer {
    degraded_strikes: u32,
    counts: ClassificationCounts,
}

impl SelfHealer {
    pub fn new() -> Self {
        Self {
            degraded_strikes: 0,
            counts: ClassificationCounts::default(),
        }
    }

    /// Pure kind -> category table.
    pub fn classify(&self, error: &AgentError) -> FailureCategory {
        match error.kind() {
            FailureKind::Collection => FailureCategory::Transient,
            FailureKind::Validation | FailureKind::Renewal => FailureCategory::Recoverable,
            FailureKind::Heartbeat => FailureCategory::Degradable,
            FailureKind::Configuration | FailureKind::Critical => FailureCategory::Critical,
        }
    }

    /// Select the recovery action for a classified failure.
    ///
    /// A Degradable failure while already degraded adds a strike; once the
    /// strikes run out the host cannot even Quick-scan reliably and the
    /// action escalates to shutdown.
    pub fn act(
        &mut self,
        category: FailureCategory,
        kind: FailureKind,
        currently_degraded: bool,
    ) -> RecoveryAction {
        match category {
            FailureCategory::Transient => {
                self.counts.transient += 1;
                RecoveryAction::Retry
            }
            FailureCategory::Recoverable => {
                self.counts.recoverable += 1;
                RecoveryAction::ResetSubsystem(kind)
            }
            FailureCategory::Degradable => {
                self.counts.degradable += 1;
                if currently_degraded {
                    self.degraded_strikes += 1;
                    if self.degraded_strikes >= MAX_DEGRADED_STRIKES {
                        return RecoveryAction::Shutdown;
                    }
                }
                RecoveryAction::EnterDegraded
            }
            FailureCategory::Critical => {
                self.counts.critical += 1;
                RecoveryAction::Shutdown
            }
        }
    }

    /// A clean beat clears the strike counter.
    pub fn note_success(&mut self) {
        self.degraded_strikes = 0;
    }

    pub fn counts(&self) -> ClassificationCounts {
        self.counts
    }
}

impl Default for SelfHealer {
    fn default() -> Self {
        Self::new()
    }
}
