//! Domain types for the Pinion rollout engine.
//!
//! All types are serializable to/from JSON. The persisted rollout document
//! and per-client assignment blobs are JSON-encoded versions of these types;
//! the wire schema for the rollout document lives in `pinion-state`.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unique identifier for a client (browser, device, …).
pub type ClientId = String;

/// Seconds in a day, used by the gradual-rollout ramp.
pub const SECS_PER_DAY: u64 = 86_400;

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Variants and assignments ───────────────────────────────────────

/// One of the two experiences a client can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Stable,
    Canary,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => f.write_str("stable"),
            Self::Canary => f.write_str("canary"),
        }
    }
}

/// Identity attributes a custom-assignment hook can inspect.
///
/// The fingerprint changes when the user identity changes, which is the
/// trigger for re-running a custom hook against an existing assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub client_id: ClientId,
    /// Logged-in user, if any. Anonymous clients have `None`.
    pub user_id: Option<String>,
}

impl ClientIdentity {
    pub fn anonymous(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            user_id: None,
        }
    }

    pub fn with_user(client_id: &str, user_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            user_id: Some(user_id.to_string()),
        }
    }

    /// Stable fingerprint of this identity.
    pub fn fingerprint(&self) -> String {
        match &self.user_id {
            Some(user) => format!("{}/{user}", self.client_id),
            None => format!("{}/-", self.client_id),
        }
    }
}

/// A client's persisted variant assignment.
///
/// Created once per client and returned unchanged on every later visit;
/// the variant only changes through an operator force or a custom hook
/// reacting to an identity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub variant: Variant,
    /// Unix timestamp (seconds) when the assignment was made.
    pub assigned_at: u64,
    /// Rollout percentage in effect at assignment time.
    pub percentage_at_assignment: f64,
    /// Fingerprint of the identity a custom hook last evaluated, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_fingerprint: Option<String>,
}

// ── Metrics ────────────────────────────────────────────────────────

/// Aggregate traffic observed for one variant over the evaluation window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub pageviews: u64,
    pub errors: u64,
    /// Optional latency signal; softer secondary input to the evaluator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_latency_ms: Option<f64>,
}

impl MetricsSnapshot {
    pub fn new(pageviews: u64, errors: u64) -> Self {
        Self {
            pageviews,
            errors,
            p99_latency_ms: None,
        }
    }

    /// Error rate as a plain ratio in `[0, 1]`.
    ///
    /// Zero pageviews yields 0.0 rather than a division by zero; degenerate
    /// input must never panic the evaluation path.
    pub fn error_rate(&self) -> f64 {
        self.errors as f64 / self.pageviews.max(1) as f64
    }
}

// ── Evaluation ─────────────────────────────────────────────────────

/// Verdict from comparing the canary's error behavior against stable's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Proceed,
    Caution,
    SlowDown,
    Rollback,
    NeedMoreData,
    /// Upstream failure producing the snapshots. The evaluator itself never
    /// emits this; the controller treats it like `NeedMoreData`.
    Error,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Proceed => "PROCEED",
            Self::Caution => "CAUTION",
            Self::SlowDown => "SLOW_DOWN",
            Self::Rollback => "ROLLBACK",
            Self::NeedMoreData => "NEED_MORE_DATA",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Outcome of a single health evaluation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub decision: Decision,
    /// Confidence in the decision, `0..=1`.
    pub confidence: f64,
    /// `canary_error_rate - stable_error_rate`, recorded on every decision.
    pub relative_error_increase: f64,
    /// Human-readable justification.
    pub reason: String,
    /// Unix timestamp (seconds) of the evaluation.
    pub timestamp: u64,
}

// ── Rollout state ──────────────────────────────────────────────────

/// Lifecycle status of the rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RolloutStatus {
    Active,
    Paused,
    /// Sticky: automated evaluation keeps its hands off until an operator
    /// resumes or overrides.
    RolledBack,
}

impl fmt::Display for RolloutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::RolledBack => "ROLLED_BACK",
        };
        f.write_str(s)
    }
}

/// The rollout's mutable state plus the static bounds it moves within.
///
/// Invariant: `safety_threshold <= current_percentage <= max_percentage`
/// for every automated transition; a rollback clamps `current_percentage`
/// down to `safety_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Probability (0–100) that a new client receives the canary variant.
    pub current_percentage: f64,
    /// Ceiling the automated rollout may reach.
    pub max_percentage: f64,
    /// Floor retained after a rollback, keeping a small observation sample.
    pub safety_threshold: f64,
    /// Minimum percentage-point increment on a PROCEED step.
    pub increment_step: f64,
    /// Length of the gradual-rollout ramp in days.
    pub rollout_period_days: u32,
    pub status: RolloutStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluation: Option<EvaluationResult>,
}

/// Parameters of the time-based gradual rollout ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// When disabled, the percentage only moves via evaluator or operator.
    pub enabled: bool,
    /// Ramp starting percentage.
    pub initial_percentage: f64,
    /// Unix timestamp (seconds) the ramp started.
    pub start_epoch: u64,
}

/// Knobs for the health evaluator's decision rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Minimum canary pageviews before any judgement is made.
    pub min_sample_size: u64,
    /// Canary error rate above `stable * critical_multiplier` forces rollback.
    pub critical_multiplier: f64,
    /// Canary error rate above `stable * slow_multiplier` pauses growth.
    pub slow_multiplier: f64,
    /// Absolute error-rate floor the canary must also exceed before a
    /// rollback fires; keeps near-zero-rate noise from killing rollouts.
    pub min_error_rate_floor: f64,
    /// Canary p99 latency above `stable * latency_multiplier` is the softer
    /// secondary signal behind a CAUTION.
    pub latency_multiplier: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_sample_size: 50,
            critical_multiplier: 1.5,
            slow_multiplier: 1.2,
            min_error_rate_floor: 0.05,
            latency_multiplier: 1.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Variant::Canary).unwrap(), "\"canary\"");
        assert_eq!(serde_json::to_string(&Variant::Stable).unwrap(), "\"stable\"");
        let back: Variant = serde_json::from_str("\"canary\"").unwrap();
        assert_eq!(back, Variant::Canary);
    }

    #[test]
    fn status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&RolloutStatus::RolledBack).unwrap(),
            "\"ROLLED_BACK\""
        );
        let back: RolloutStatus = serde_json::from_str("\"PAUSED\"").unwrap();
        assert_eq!(back, RolloutStatus::Paused);
    }

    #[test]
    fn decision_display_matches_wire_form() {
        assert_eq!(Decision::SlowDown.to_string(), "SLOW_DOWN");
        assert_eq!(Decision::NeedMoreData.to_string(), "NEED_MORE_DATA");
        assert_eq!(
            serde_json::to_string(&Decision::SlowDown).unwrap(),
            "\"SLOW_DOWN\""
        );
    }

    #[test]
    fn error_rate_guards_zero_pageviews() {
        let empty = MetricsSnapshot::new(0, 0);
        assert_eq!(empty.error_rate(), 0.0);

        // Even nonsense input (errors without pageviews) stays finite.
        let degenerate = MetricsSnapshot::new(0, 7);
        assert!(degenerate.error_rate().is_finite());
    }

    #[test]
    fn error_rate_is_plain_ratio() {
        let snap = MetricsSnapshot::new(1000, 20);
        assert!((snap.error_rate() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn identity_fingerprint_tracks_user() {
        let anon = ClientIdentity::anonymous("c-1");
        let user = ClientIdentity::with_user("c-1", "u-9");
        assert_ne!(anon.fingerprint(), user.fingerprint());
        assert_eq!(anon.fingerprint(), ClientIdentity::anonymous("c-1").fingerprint());
    }

    #[test]
    fn assignment_roundtrip_omits_empty_fingerprint() {
        let a = Assignment {
            variant: Variant::Stable,
            assigned_at: 1000,
            percentage_at_assignment: 12.5,
            identity_fingerprint: None,
        };
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("identity_fingerprint"));
        let back: Assignment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
