//! pinion.toml configuration parser.
//!
//! Every field is named and typed; `Settings::validate` rejects out-of-range
//! values at load time instead of clamping them later. Partial files are
//! fine — each section falls back to its defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{HealthThresholds, RolloutConfig, RolloutStatus, ScheduleConfig};

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Static configuration for the whole engine, loaded from `pinion.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub document: DocumentSettings,
    pub assignments: AssignmentSettings,
    pub metrics: MetricsSettings,
    pub report: ReportSettings,
    pub rollout: RolloutSettings,
    pub schedule: ScheduleSettings,
    pub thresholds: HealthThresholds,
}

/// Where the persisted rollout document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub path: String,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            path: "rollout.json".to_string(),
        }
    }
}

/// Client assignment store location and key prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentSettings {
    pub path: String,
    /// Storage key prefix; assignment blobs are keyed `{prefix}:{client_id}`.
    pub key_prefix: String,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            path: "assignments.redb".to_string(),
            key_prefix: "pinion/assignment".to_string(),
        }
    }
}

/// Where the evaluator's metrics input comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// JSON file holding one snapshot per variant name.
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            path: "metrics.json".to_string(),
        }
    }
}

/// Where the evaluation report is written after each automation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub path: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            path: "rollout-report.json".to_string(),
        }
    }
}

/// Bounds and step sizes for the rollout percentage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutSettings {
    /// Percentage a brand-new rollout document starts at.
    pub initial_percentage: f64,
    pub max_percentage: f64,
    pub safety_threshold: f64,
    pub increment_step: f64,
    pub period_days: u32,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            initial_percentage: 5.0,
            max_percentage: 50.0,
            safety_threshold: 2.0,
            increment_step: 1.0,
            period_days: 14,
        }
    }
}

/// Gradual-rollout ramp switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub enabled: bool,
    /// Unix timestamp (seconds) the ramp started. Required when enabled.
    pub start_epoch: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start_epoch: 0,
        }
    }
}

impl Settings {
    /// Load and validate settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject out-of-range values. Called by `from_file`; callers building
    /// settings programmatically should call it themselves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.rollout;
        check_percentage("rollout.initial_percentage", r.initial_percentage)?;
        check_percentage("rollout.max_percentage", r.max_percentage)?;
        check_percentage("rollout.safety_threshold", r.safety_threshold)?;
        if r.initial_percentage > r.max_percentage {
            return invalid(format!(
                "rollout.initial_percentage ({}) exceeds rollout.max_percentage ({})",
                r.initial_percentage, r.max_percentage
            ));
        }
        if r.safety_threshold > r.max_percentage {
            return invalid(format!(
                "rollout.safety_threshold ({}) exceeds rollout.max_percentage ({})",
                r.safety_threshold, r.max_percentage
            ));
        }
        if r.increment_step <= 0.0 {
            return invalid(format!(
                "rollout.increment_step must be positive, got {}",
                r.increment_step
            ));
        }

        let t = &self.thresholds;
        if t.slow_multiplier <= 1.0 {
            return invalid(format!(
                "thresholds.slow_multiplier must exceed 1.0, got {}",
                t.slow_multiplier
            ));
        }
        if t.critical_multiplier < t.slow_multiplier {
            return invalid(format!(
                "thresholds.critical_multiplier ({}) is below thresholds.slow_multiplier ({})",
                t.critical_multiplier, t.slow_multiplier
            ));
        }
        if !(0.0..=1.0).contains(&t.min_error_rate_floor) {
            return invalid(format!(
                "thresholds.min_error_rate_floor must be within 0..=1, got {}",
                t.min_error_rate_floor
            ));
        }
        if t.latency_multiplier <= 1.0 {
            return invalid(format!(
                "thresholds.latency_multiplier must exceed 1.0, got {}",
                t.latency_multiplier
            ));
        }

        if self.schedule.enabled && self.schedule.start_epoch == 0 {
            return invalid(
                "schedule.enabled requires schedule.start_epoch to be set".to_string(),
            );
        }

        Ok(())
    }

    /// Ramp parameters for the scheduler.
    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            enabled: self.schedule.enabled,
            initial_percentage: self.rollout.initial_percentage,
            start_epoch: self.schedule.start_epoch,
        }
    }

    /// Rollout state seeded from scratch, used when no document exists yet
    /// (or the existing one is unreadable and gets discarded).
    pub fn initial_config(&self) -> RolloutConfig {
        RolloutConfig {
            current_percentage: self.rollout.initial_percentage,
            max_percentage: self.rollout.max_percentage,
            safety_threshold: self.rollout.safety_threshold,
            increment_step: self.rollout.increment_step,
            rollout_period_days: self.rollout.period_days,
            status: RolloutStatus::Active,
            last_evaluation: None,
        }
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn check_percentage(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&value) {
        return invalid(format!("{field} must be within 0..=100, got {value}"));
    }
    Ok(())
}

fn invalid(msg: String) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg))
}
