//! Shared state alias and the agent lifecycle state machine

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Top-level lifecycle state of the agent.
///
/// Transitions are driven exclusively by the heartbeat controller:
/// `Initialized -> Running` on start, `Running <-> Renewing` around a
/// renewal cycle, `Running <-> Degraded` via self-healing, and any
/// operational state `-> Stopped` on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemState {
    Uninitialized,
    Initialized,
    Running,
    Degraded,
    Renewing,
    Stopped,
}

impl SystemState {
    /// True while the heartbeat loop is ticking.
    pub fn is_operational(self) -> bool {
        matches!(
            self,
            SystemState::Running | SystemState::Degraded | SystemState::Renewing
        )
    }
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SystemState::Uninitialized => "uninitialized",
            SystemState::Initialized => "initialized",
            SystemState::Running => "running",
            SystemState::Degraded => "degraded",
            SystemState::Renewing => "renewing",
            SystemState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operational_states() {
        assert!(SystemState::Running.is_operational());
        assert!(SystemState::Degraded.is_operational());
        assert!(SystemState::Renewing.is_operational());
        assert!(!SystemState::Initialized.is_operational());
        assert!(!SystemState::Stopped.is_operational());
    }
}
