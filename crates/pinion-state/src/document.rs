//! Wire schema of the persisted rollout document.
//!
//! The on-disk document is camelCase JSON with the distribution state
//! nested under `distribution`:
//!
//! ```json
//! {
//!   "distribution": {
//!     "canaryPercentage": 12.5,
//!     "maxPercentage": 50.0,
//!     "safetyThreshold": 2.0,
//!     "status": "ACTIVE",
//!     "lastEvaluationDate": 1754400000,
//!     "lastEvaluationResult": { "decision": "PROCEED", ... }
//!   },
//!   "lastUpdated": 1754400000,
//!   "updateSource": "automated"
//! }
//! ```
//!
//! Schedule parameters (increment step, ramp period) are static
//! configuration, not document state; conversions back to the engine's
//! `RolloutConfig` take them from [`RolloutSettings`].

use pinion_core::settings::RolloutSettings;
use pinion_core::{EvaluationResult, RolloutConfig, RolloutStatus};
use serde::{Deserialize, Serialize};

/// Who produced the last write to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    Automated,
    Manual,
}

/// Top-level persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutDocument {
    pub distribution: Distribution,
    /// Unix timestamp (seconds) of the last write.
    pub last_updated: u64,
    pub update_source: UpdateSource,
}

/// The distribution state inside the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub canary_percentage: f64,
    pub max_percentage: f64,
    pub safety_threshold: f64,
    pub status: RolloutStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluation_date: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluation_result: Option<EvaluationResult>,
}

impl RolloutDocument {
    /// Build a document from engine state.
    pub fn from_config(config: &RolloutConfig, source: UpdateSource, now: u64) -> Self {
        Self {
            distribution: Distribution {
                canary_percentage: config.current_percentage,
                max_percentage: config.max_percentage,
                safety_threshold: config.safety_threshold,
                status: config.status,
                last_evaluation_date: config.last_evaluation.as_ref().map(|e| e.timestamp),
                last_evaluation_result: config.last_evaluation.clone(),
            },
            last_updated: now,
            update_source: source,
        }
    }

    /// Rebuild engine state from the document; step sizes and ramp period
    /// come from static settings.
    pub fn to_config(&self, rollout: &RolloutSettings) -> RolloutConfig {
        RolloutConfig {
            current_percentage: self.distribution.canary_percentage,
            max_percentage: self.distribution.max_percentage,
            safety_threshold: self.distribution.safety_threshold,
            increment_step: rollout.increment_step,
            rollout_period_days: rollout.period_days,
            status: self.distribution.status,
            last_evaluation: self.distribution.last_evaluation_result.clone(),
        }
    }
}
