//! Tagged error type for the Vigil agent
//!
//! Every failure carries an explicit [`FailureKind`] assigned at the point
//! the error is raised. The self-healing classifier reads that tag; it never
//! inspects message text.

use serde::Serialize;
use thiserror::Error;

/// Failure kind attached to every [`AgentError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A metric probe failed; absorbed by the scanner, tagged on the result.
    Collection,
    /// Malformed payload offered to the capsule store; store left unchanged.
    Validation,
    /// Invalid configuration; the only kind allowed to abort startup.
    Configuration,
    /// A tick failed after retries were exhausted.
    Heartbeat,
    /// A renewal cycle failed; the store stays empty-but-consistent.
    Renewal,
    /// Unrecoverable; triggers graceful shutdown.
    Critical,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Collection => "collection",
            FailureKind::Validation => "validation",
            FailureKind::Configuration => "configuration",
            FailureKind::Heartbeat => "heartbeat",
            FailureKind::Renewal => "renewal",
            FailureKind::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// Agent error with one variant per failure kind.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("collection failed ({probe}): {reason}")]
    Collection { probe: String, reason: String },

    #[error("payload rejected: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("heartbeat failure: {0}")]
    Heartbeat(String),

    #[error("renewal failure: {0}")]
    Renewal(String),

    #[error("critical failure: {0}")]
    Critical(String),
}

impl AgentError {
    pub fn collection(probe: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::Collection {
            probe: probe.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AgentError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        AgentError::Configuration(message.into())
    }

    pub fn heartbeat(message: impl Into<String>) -> Self {
        AgentError::Heartbeat(message.into())
    }

    pub fn renewal(message: impl Into<String>) -> Self {
        AgentError::Renewal(message.into())
    }

    pub fn critical(message: impl Into<String>) -> Self {
        AgentError::Critical(message.into())
    }

    /// The classification tag assigned where the error was raised.
    pub fn kind(&self) -> FailureKind {
        match self {
            AgentError::Collection { .. } => FailureKind::Collection,
            AgentError::Validation(_) => FailureKind::Validation,
            AgentError::Configuration(_) => FailureKind::Configuration,
            AgentError::Heartbeat(_) => FailureKind::Heartbeat,
            AgentError::Renewal(_) => FailureKind::Renewal,
            AgentError::Critical(_) => FailureKind::Critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            AgentError::collection("cpu", "probe exploded").kind(),
            FailureKind::Collection
        );
        assert_eq!(
            AgentError::validation("null payload").kind(),
            FailureKind::Validation
        );
        assert_eq!(
            AgentError::configuration("bad interval").kind(),
            FailureKind::Configuration
        );
        assert_eq!(AgentError::heartbeat("tick").kind(), FailureKind::Heartbeat);
        assert_eq!(AgentError::renewal("cycle").kind(), FailureKind::Renewal);
        assert_eq!(AgentError::critical("boom").kind(), FailureKind::Critical);
    }

    #[test]
    fn display_includes_probe_name() {
        let err = AgentError::collection("memory", "refresh failed");
        assert!(err.to_string().contains("memory"));
        assert!(err.to_string().contains("refresh failed"));
    }
}
