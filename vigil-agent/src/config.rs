//! Agent configuration
//!
//! Handles:
//! - Heartbeat cadence, probe timeout and retry policy
//! - Capsule size/retention bounds
//! - Alert thresholds per metric
//! - Renewal trigger settings
//! - TOML load/save under the OS config directory

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capsule::ThresholdValues;
use crate::error::AgentError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub heartbeat: HeartbeatConfig,
    pub capsules: CapsuleConfig,
    pub thresholds: ThresholdConfig,
    pub renewal: RenewalConfig,
    pub self_healing_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub interval_seconds: u64,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleConfig {
    pub max_pattern_size_mb: u64,
    pub max_event_size_mb: u64,
    pub event_retention_minutes: u64,
    pub max_alert_size_kb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub cpu_warning_pct: f64,
    pub cpu_critical_pct: f64,
    pub memory_warning_pct: f64,
    pub memory_critical_pct: f64,
    pub disk_warning_pct: f64,
    pub disk_critical_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalConfig {
    pub scheduled_interval_hours: u64,
    pub memory_pressure_pct: f64,
    pub stale_cycles: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig {
                interval_seconds: 30,
                timeout_ms: 5000,
                max_retries: 2,
            },
            capsules: CapsuleConfig {
                max_pattern_size_mb: 10,
                max_event_size_mb: 5,
                event_retention_minutes: 60,
                max_alert_size_kb: 256,
            },
            thresholds: ThresholdConfig {
                cpu_warning_pct: 70.0,
                cpu_critical_pct: 90.0,
                memory_warning_pct: 75.0,
                memory_critical_pct: 90.0,
                disk_warning_pct: 80.0,
                disk_critical_pct: 95.0,
            },
            renewal: RenewalConfig {
                scheduled_interval_hours: 24,
                memory_pressure_pct: 80.0,
                stale_cycles: 10_000,
            },
            self_healing_enabled: true,
        }
    }
}

impl ThresholdConfig {
    /// Named threshold pairs used to seed the Threshold capsule.
    ///
    /// Per-volume disk metrics all evaluate against the single "disk" pair.
    pub fn named(&self) -> Vec<(&'static str, ThresholdValues)> {
        vec![
            (
                "cpu",
                ThresholdValues {
                    warning: self.cpu_warning_pct,
                    critical: self.cpu_critical_pct,
                },
            ),
            (
                "memory",
                ThresholdValues {
                    warning: self.memory_warning_pct,
                    critical: self.memory_critical_pct,
                },
            ),
            (
                "disk",
                ThresholdValues {
                    warning: self.disk_warning_pct,
                    critical: self.disk_critical_pct,
                },
            ),
        ]
    }
}

impl AgentConfig {
    /// Validate the full option set.
    ///
    /// Configuration is the only failure allowed to abort startup; every
    /// violation reports the offending option by name.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.heartbeat.interval_seconds == 0 {
            return Err(AgentError::configuration(
                "interval_seconds must be at least 1",
            ));
        }
        if self.heartbeat.timeout_ms == 0 {
            return Err(AgentError::configuration("timeout_ms must be at least 1"));
        }
        if self.capsules.max_pattern_size_mb == 0 {
            return Err(AgentError::configuration(
                "max_pattern_size_mb must be at least 1",
            ));
        }
        if self.capsules.max_event_size_mb == 0 {
            return Err(AgentError::configuration(
                "max_event_size_mb must be at least 1",
            ));
        }
        if self.capsules.event_retention_minutes == 0 {
            return Err(AgentError::configuration(
                "event_retention_minutes must be at least 1",
            ));
        }
        if self.capsules.max_alert_size_kb == 0 {
            return Err(AgentError::configuration(
                "max_alert_size_kb must be at least 1",
            ));
        }
        for (name, warning, critical) in [
            (
                "cpu",
                self.thresholds.cpu_warning_pct,
                self.thresholds.cpu_critical_pct,
            ),
            (
                "memory",
                self.thresholds.memory_warning_pct,
                self.thresholds.memory_critical_pct,
            ),
            (
                "disk",
                self.thresholds.disk_warning_pct,
                self.thresholds.disk_critical_pct,
            ),
        ] {
            if !(0.0..=100.0).contains(&warning) || !(0.0..=100.0).contains(&critical) {
                return Err(AgentError::configuration(format!(
                    "{}_warning_pct/{}_critical_pct must be within 0-100",
                    name, name
                )));
            }
            if warning >= critical {
                return Err(AgentError::configuration(format!(
                    "{}_warning_pct must be below {}_critical_pct",
                    name, name
                )));
            }
        }
        if self.renewal.scheduled_interval_hours == 0 {
            return Err(AgentError::configuration(
                "renewal_scheduled_interval_hours must be at least 1",
            ));
        }
        if self.renewal.memory_pressure_pct <= 0.0 || self.renewal.memory_pressure_pct > 100.0 {
            return Err(AgentError::configuration(
                "renewal_memory_pressure_pct must be within (0, 100]",
            ));
        }
        if self.renewal.stale_cycles == 0 {
            return Err(AgentError::configuration(
                "renewal_stale_cycles must be at least 1",
            ));
        }
        Ok(())
    }

    /// Bounded timeout applied to each metric probe, derived from the
    /// heartbeat timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat.timeout_ms)
    }

    /// Fixed delay between scan retries.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.heartbeat.timeout_ms / 2)
    }

    /// Load config from the OS-specific location; defaults when absent.
    pub async fn load() -> Result<Self, AgentError> {
        let config_path = Self::config_file_path()
            .map_err(|e| AgentError::configuration(format!("no config directory: {}", e)))?;

        if config_path.exists() {
            Self::load_from(&config_path).await
        } else {
            // First run - defaults apply until a config file is saved
            Ok(Self::default())
        }
    }

    /// Load and validate a config file from an explicit path.
    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::configuration(format!("cannot read {:?}: {}", path, e)))?;
        let config: AgentConfig = toml::from_str(&content)
            .map_err(|e| AgentError::configuration(format!("cannot parse {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to an explicit path, creating parent directories.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// OS-specific config file path.
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push("vigil-agent");
        path.push("config.toml");
        Ok(path)
    }
}
