//! Rollout controller — drives percentage and status transitions.

use pinion_core::{Decision, EvaluationResult, RolloutConfig, RolloutStatus};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fraction of the remaining distance to max covered per PROCEED step.
const PROCEED_FRACTION: f64 = 0.1;

/// CAUTION damping only applies above this percentage, and never cuts
/// below it.
const CAUTION_FLOOR: f64 = 30.0;

/// Damping factor applied on CAUTION.
const CAUTION_FACTOR: f64 = 0.8;

/// Raised when an operator-supplied percentage is out of range.
///
/// This is a hard validation error surfaced to the caller, never a
/// silent clamp.
#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("percentage {0} is outside the valid range 0..=100")]
    OutOfRange(f64),
}

/// The rollout decision state machine.
///
/// All methods take the current state by reference and return a new value;
/// the input is never mutated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Controller;

impl Controller {
    pub fn new() -> Self {
        Self
    }

    /// Apply one evaluation to the rollout state.
    ///
    /// `last_evaluation` is always updated. `ROLLED_BACK` is sticky: while
    /// set, no automatic percentage or status change is applied; recovery
    /// goes through [`Controller::resume`] or [`Controller::apply_manual`].
    pub fn step(&self, config: &RolloutConfig, evaluation: &EvaluationResult) -> RolloutConfig {
        let mut next = config.clone();
        next.last_evaluation = Some(evaluation.clone());

        if config.status == RolloutStatus::RolledBack {
            debug!(
                decision = %evaluation.decision,
                "rollout is rolled back; ignoring automated decision"
            );
            return next;
        }

        match evaluation.decision {
            Decision::Rollback => {
                next.current_percentage = config.safety_threshold;
                next.status = RolloutStatus::RolledBack;
                warn!(
                    from = config.current_percentage,
                    to = next.current_percentage,
                    reason = %evaluation.reason,
                    "rolling back canary"
                );
            }

            Decision::SlowDown => {
                // Percentage is left alone; pausing already freezes growth.
                next.status = RolloutStatus::Paused;
                info!(
                    percentage = config.current_percentage,
                    reason = %evaluation.reason,
                    "pausing rollout"
                );
            }

            Decision::Caution => {
                if config.current_percentage > CAUTION_FLOOR {
                    next.current_percentage =
                        (config.current_percentage * CAUTION_FACTOR).max(CAUTION_FLOOR);
                    info!(
                        from = config.current_percentage,
                        to = next.current_percentage,
                        "damping rollout percentage"
                    );
                }
            }

            Decision::Proceed => {
                if config.status == RolloutStatus::Paused {
                    info!("resuming paused rollout");
                    next.status = RolloutStatus::Active;
                }
                let remaining = config.max_percentage - config.current_percentage;
                let step = (remaining * PROCEED_FRACTION).max(config.increment_step);
                next.current_percentage =
                    (config.current_percentage + step).min(config.max_percentage);
                debug!(
                    from = config.current_percentage,
                    to = next.current_percentage,
                    max = config.max_percentage,
                    "advancing rollout percentage"
                );
            }

            Decision::NeedMoreData | Decision::Error => {
                debug!(
                    decision = %evaluation.decision,
                    "recording evaluation without state change"
                );
            }
        }

        next
    }

    /// Operator escape hatch: set an explicit percentage, bypassing the
    /// evaluator. Available regardless of current status; taking manual
    /// control reactivates a paused or rolled-back rollout.
    pub fn apply_manual(
        &self,
        config: &RolloutConfig,
        percentage: f64,
    ) -> Result<RolloutConfig, OverrideError> {
        if !(0.0..=100.0).contains(&percentage) || percentage.is_nan() {
            return Err(OverrideError::OutOfRange(percentage));
        }

        let mut next = config.clone();
        next.current_percentage = percentage;
        next.status = RolloutStatus::Active;
        info!(
            from = config.current_percentage,
            to = percentage,
            "manual percentage override"
        );
        Ok(next)
    }

    /// Operator reset: return a paused or rolled-back rollout to `ACTIVE`
    /// without touching the percentage.
    pub fn resume(&self, config: &RolloutConfig) -> RolloutConfig {
        let mut next = config.clone();
        if config.status != RolloutStatus::Active {
            info!(status = %config.status, "operator resumed rollout");
            next.status = RolloutStatus::Active;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(percentage: f64, status: RolloutStatus) -> RolloutConfig {
        RolloutConfig {
            current_percentage: percentage,
            max_percentage: 50.0,
            safety_threshold: 2.0,
            increment_step: 1.0,
            rollout_period_days: 14,
            status,
            last_evaluation: None,
        }
    }

    fn evaluation(decision: Decision) -> EvaluationResult {
        EvaluationResult {
            decision,
            confidence: 0.8,
            relative_error_increase: 0.0,
            reason: "test".to_string(),
            timestamp: 1000,
        }
    }

    #[test]
    fn rollback_clamps_to_safety_threshold() {
        let before = config(40.0, RolloutStatus::Active);
        let after = Controller::new().step(&before, &evaluation(Decision::Rollback));

        assert_eq!(after.current_percentage, 2.0);
        assert_eq!(after.status, RolloutStatus::RolledBack);
        // Input untouched.
        assert_eq!(before.current_percentage, 40.0);
        assert_eq!(before.status, RolloutStatus::Active);
    }

    #[test]
    fn rolled_back_is_sticky() {
        let controller = Controller::new();
        let before = config(2.0, RolloutStatus::RolledBack);

        for decision in [
            Decision::Proceed,
            Decision::Caution,
            Decision::SlowDown,
            Decision::Rollback,
        ] {
            let after = controller.step(&before, &evaluation(decision));
            assert_eq!(after.current_percentage, 2.0, "{decision} changed percentage");
            assert_eq!(after.status, RolloutStatus::RolledBack);
            // The evaluation itself is still recorded.
            assert_eq!(after.last_evaluation.unwrap().decision, decision);
        }
    }

    #[test]
    fn repeated_proceed_converges_to_max_without_overshoot() {
        let controller = Controller::new();
        let mut state = config(5.0, RolloutStatus::Active);
        let proceed = evaluation(Decision::Proceed);

        let mut previous = state.current_percentage;
        for _ in 0..200 {
            state = controller.step(&state, &proceed);
            assert!(state.current_percentage <= state.max_percentage);
            if previous < state.max_percentage {
                assert!(state.current_percentage > previous, "no strict increase");
            }
            previous = state.current_percentage;
        }
        assert_eq!(state.current_percentage, 50.0);

        // Once at max, further proceeds hold steady.
        let held = controller.step(&state, &proceed);
        assert_eq!(held.current_percentage, 50.0);
    }

    #[test]
    fn proceed_uses_minimum_step_near_max() {
        // Remaining distance 5 => fractional step 0.5, below the minimum
        // increment of 1, so the increment wins.
        let before = config(45.0, RolloutStatus::Active);
        let after = Controller::new().step(&before, &evaluation(Decision::Proceed));
        assert_eq!(after.current_percentage, 46.0);
    }

    #[test]
    fn proceed_resumes_paused_rollout() {
        let before = config(10.0, RolloutStatus::Paused);
        let after = Controller::new().step(&before, &evaluation(Decision::Proceed));
        assert_eq!(after.status, RolloutStatus::Active);
        assert_eq!(after.current_percentage, 14.0);
    }

    #[test]
    fn slow_down_pauses_without_touching_percentage() {
        let before = config(25.0, RolloutStatus::Active);
        let after = Controller::new().step(&before, &evaluation(Decision::SlowDown));
        assert_eq!(after.status, RolloutStatus::Paused);
        assert_eq!(after.current_percentage, 25.0);
    }

    #[test]
    fn caution_damps_above_floor() {
        let before = config(40.0, RolloutStatus::Active);
        let after = Controller::new().step(&before, &evaluation(Decision::Caution));
        assert_eq!(after.current_percentage, 32.0);
        assert_eq!(after.status, RolloutStatus::Active);
    }

    #[test]
    fn caution_clamps_to_floor() {
        let before = config(32.0, RolloutStatus::Active);
        let after = Controller::new().step(&before, &evaluation(Decision::Caution));
        // 32 * 0.8 = 25.6, clamped up to the floor of 30.
        assert_eq!(after.current_percentage, 30.0);
    }

    #[test]
    fn caution_below_floor_is_a_no_op() {
        let before = config(20.0, RolloutStatus::Active);
        let after = Controller::new().step(&before, &evaluation(Decision::Caution));
        assert_eq!(after.current_percentage, 20.0);
    }

    #[test]
    fn need_more_data_only_records_the_evaluation() {
        let before = config(15.0, RolloutStatus::Paused);
        for decision in [Decision::NeedMoreData, Decision::Error] {
            let after = Controller::new().step(&before, &evaluation(decision));
            assert_eq!(after.current_percentage, 15.0);
            assert_eq!(after.status, RolloutStatus::Paused);
            assert!(after.last_evaluation.is_some());
        }
    }

    #[test]
    fn manual_override_ignores_status() {
        let controller = Controller::new();
        for status in [
            RolloutStatus::Active,
            RolloutStatus::Paused,
            RolloutStatus::RolledBack,
        ] {
            let before = config(40.0, status);
            let after = controller.apply_manual(&before, 20.0).unwrap();
            assert_eq!(after.current_percentage, 20.0);
            assert_eq!(after.status, RolloutStatus::Active);
        }
    }

    #[test]
    fn manual_override_rejects_out_of_range() {
        let controller = Controller::new();
        let before = config(10.0, RolloutStatus::Active);

        assert!(matches!(
            controller.apply_manual(&before, -1.0),
            Err(OverrideError::OutOfRange(_))
        ));
        assert!(matches!(
            controller.apply_manual(&before, 100.5),
            Err(OverrideError::OutOfRange(_))
        ));
        assert!(controller.apply_manual(&before, f64::NAN).is_err());

        // Boundaries are inclusive.
        assert!(controller.apply_manual(&before, 0.0).is_ok());
        assert!(controller.apply_manual(&before, 100.0).is_ok());
    }

    #[test]
    fn resume_reactivates_rolled_back() {
        let before = config(2.0, RolloutStatus::RolledBack);
        let after = Controller::new().resume(&before);
        assert_eq!(after.status, RolloutStatus::Active);
        assert_eq!(after.current_percentage, 2.0);
    }

    #[test]
    fn rollback_then_resume_then_proceed_grows_again() {
        let controller = Controller::new();
        let mut state = config(40.0, RolloutStatus::Active);

        state = controller.step(&state, &evaluation(Decision::Rollback));
        assert_eq!(state.status, RolloutStatus::RolledBack);

        state = controller.resume(&state);
        state = controller.step(&state, &evaluation(Decision::Proceed));
        assert!(state.current_percentage > 2.0);
        assert_eq!(state.status, RolloutStatus::Active);
    }
}
