//! Decision rules over stable/canary metrics snapshots.

use pinion_core::{Decision, EvaluationResult, HealthThresholds, MetricsSnapshot};
use tracing::{debug, warn};

/// Evaluates canary health against the stable baseline.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    thresholds: HealthThresholds,
}

impl Evaluator {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Compare the two snapshots and produce a decision.
    ///
    /// Rules fire in priority order:
    /// 1. `NEED_MORE_DATA` — canary sample below the minimum count
    /// 2. `ROLLBACK` — canary rate beyond the critical multiple of stable
    ///    *and* above the absolute floor
    /// 3. `SLOW_DOWN` — canary rate beyond the secondary multiple
    /// 4. `CAUTION` — any positive error increase, or a latency regression
    /// 5. `PROCEED` — otherwise
    ///
    /// `relative_error_increase` is recorded on every decision, including
    /// `NEED_MORE_DATA`. Degenerate input (zero pageviews) never panics;
    /// it lands in rule 1.
    pub fn evaluate(
        &self,
        stable: &MetricsSnapshot,
        canary: &MetricsSnapshot,
        now: u64,
    ) -> EvaluationResult {
        let t = &self.thresholds;
        let stable_rate = stable.error_rate();
        let canary_rate = canary.error_rate();
        let relative_increase = canary_rate - stable_rate;

        let result = |decision, confidence, reason: String| {
            debug!(
                %decision,
                confidence,
                stable_rate,
                canary_rate,
                relative_increase,
                "evaluated canary health"
            );
            EvaluationResult {
                decision,
                confidence,
                relative_error_increase: relative_increase,
                reason,
                timestamp: now,
            }
        };

        // Rule 1: not enough canary traffic to judge anything.
        if canary.pageviews < t.min_sample_size {
            return result(
                Decision::NeedMoreData,
                0.3,
                format!(
                    "canary sample too small: {} pageviews, need {}",
                    canary.pageviews, t.min_sample_size
                ),
            );
        }

        // Rule 2: critical regression. The absolute floor keeps noise from
        // firing a rollback when both rates sit near zero.
        if canary_rate > stable_rate * t.critical_multiplier
            && canary_rate > t.min_error_rate_floor
        {
            warn!(
                canary_rate,
                stable_rate,
                multiplier = t.critical_multiplier,
                "canary error rate critically elevated"
            );
            return result(
                Decision::Rollback,
                0.9,
                format!(
                    "canary error rate {:.2}% exceeds {}x stable rate {:.2}% and the {:.1}% floor",
                    canary_rate * 100.0,
                    t.critical_multiplier,
                    stable_rate * 100.0,
                    t.min_error_rate_floor * 100.0
                ),
            );
        }

        // Rule 3: elevated but not critical.
        if canary_rate > stable_rate * t.slow_multiplier {
            return result(
                Decision::SlowDown,
                0.7,
                format!(
                    "canary error rate {:.2}% exceeds {}x stable rate {:.2}%",
                    canary_rate * 100.0,
                    t.slow_multiplier,
                    stable_rate * 100.0
                ),
            );
        }

        // Rule 4a: any positive error increase below the secondary multiple.
        if relative_increase > 0.0 {
            return result(
                Decision::Caution,
                0.5,
                format!(
                    "canary error rate {:.2}% slightly above stable {:.2}%",
                    canary_rate * 100.0,
                    stable_rate * 100.0
                ),
            );
        }

        // Rule 4b: softer secondary signal, latency regression.
        if let (Some(stable_p99), Some(canary_p99)) =
            (stable.p99_latency_ms, canary.p99_latency_ms)
            && canary_p99 > stable_p99 * t.latency_multiplier
        {
            return result(
                Decision::Caution,
                0.5,
                format!(
                    "canary p99 latency {canary_p99:.0}ms exceeds {}x stable {stable_p99:.0}ms",
                    t.latency_multiplier
                ),
            );
        }

        // Rule 5: healthy.
        result(
            Decision::Proceed,
            0.8,
            format!(
                "canary error rate {:.2}% within bounds of stable {:.2}%",
                canary_rate * 100.0,
                stable_rate * 100.0
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(stable: MetricsSnapshot, canary: MetricsSnapshot) -> EvaluationResult {
        Evaluator::default().evaluate(&stable, &canary, 1000)
    }

    #[test]
    fn critical_regression_rolls_back() {
        // Stable 2%, canary 20%.
        let result = evaluate(MetricsSnapshot::new(1000, 20), MetricsSnapshot::new(100, 20));
        assert_eq!(result.decision, Decision::Rollback);
        assert_eq!(result.confidence, 0.9);
        assert!((result.relative_error_increase - 0.18).abs() < 1e-9);
        assert_eq!(result.timestamp, 1000);
    }

    #[test]
    fn matching_rates_proceed() {
        // Stable 2%, canary 2%.
        let result = evaluate(MetricsSnapshot::new(500, 10), MetricsSnapshot::new(50, 1));
        assert_eq!(result.decision, Decision::Proceed);
        assert_eq!(result.confidence, 0.8);
        assert!(result.relative_error_increase.abs() < 1e-12);
    }

    #[test]
    fn small_sample_needs_more_data() {
        let result = evaluate(MetricsSnapshot::new(1000, 20), MetricsSnapshot::new(10, 9));
        assert_eq!(result.decision, Decision::NeedMoreData);
        assert_eq!(result.confidence, 0.3);
        // Relative increase is still recorded for the report.
        assert!(result.relative_error_increase > 0.0);
    }

    #[test]
    fn zero_canary_pageviews_is_need_more_data_not_a_crash() {
        let result = evaluate(MetricsSnapshot::new(1000, 20), MetricsSnapshot::new(0, 0));
        assert_eq!(result.decision, Decision::NeedMoreData);
        assert!(result.relative_error_increase.is_finite());
    }

    #[test]
    fn zero_stable_pageviews_does_not_panic() {
        let result = evaluate(MetricsSnapshot::new(0, 0), MetricsSnapshot::new(1000, 0));
        assert!(result.relative_error_increase.is_finite());
        assert_eq!(result.decision, Decision::Proceed);
    }

    #[test]
    fn elevated_but_not_critical_slows_down() {
        // Stable 10%, canary 13%: 1.3x, between the 1.2x and 1.5x gates.
        let result = evaluate(
            MetricsSnapshot::new(1000, 100),
            MetricsSnapshot::new(1000, 130),
        );
        assert_eq!(result.decision, Decision::SlowDown);
        assert_eq!(result.confidence, 0.7);
    }

    #[test]
    fn above_critical_multiple_but_below_floor_slows_down() {
        // Stable 1%, canary 3%: 3x stable, but below the 5% absolute floor,
        // so the rollback gate does not fire; the 1.2x gate does.
        let result = evaluate(
            MetricsSnapshot::new(10_000, 100),
            MetricsSnapshot::new(10_000, 300),
        );
        assert_eq!(result.decision, Decision::SlowDown);
    }

    #[test]
    fn slight_increase_is_caution() {
        // Stable 10%, canary 11%: positive but below the 1.2x gate.
        let result = evaluate(
            MetricsSnapshot::new(1000, 100),
            MetricsSnapshot::new(1000, 110),
        );
        assert_eq!(result.decision, Decision::Caution);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn latency_regression_is_caution_when_errors_are_clean() {
        let stable = MetricsSnapshot {
            p99_latency_ms: Some(100.0),
            ..MetricsSnapshot::new(1000, 10)
        };
        let canary = MetricsSnapshot {
            p99_latency_ms: Some(200.0),
            ..MetricsSnapshot::new(1000, 10)
        };
        let result = evaluate(stable, canary);
        assert_eq!(result.decision, Decision::Caution);
        assert!(result.reason.contains("latency"));
    }

    #[test]
    fn missing_latency_signal_is_ignored() {
        let result = evaluate(MetricsSnapshot::new(1000, 10), MetricsSnapshot::new(1000, 10));
        assert_eq!(result.decision, Decision::Proceed);
    }

    #[test]
    fn rollback_takes_priority_over_slow_down() {
        // Stable 2%, canary 10%: 5x stable and above the floor. Both the
        // critical and secondary gates match; the critical one must win.
        let result = evaluate(
            MetricsSnapshot::new(1000, 20),
            MetricsSnapshot::new(1000, 100),
        );
        assert_eq!(result.decision, Decision::Rollback);
    }

    #[test]
    fn both_rates_zero_proceeds() {
        let result = evaluate(MetricsSnapshot::new(1000, 0), MetricsSnapshot::new(500, 0));
        assert_eq!(result.decision, Decision::Proceed);
        assert_eq!(result.relative_error_increase, 0.0);
    }

    #[test]
    fn custom_thresholds_shift_the_gates() {
        let evaluator = Evaluator::new(HealthThresholds {
            min_sample_size: 500,
            ..HealthThresholds::default()
        });
        let result = evaluator.evaluate(
            &MetricsSnapshot::new(1000, 20),
            &MetricsSnapshot::new(100, 20),
            0,
        );
        assert_eq!(result.decision, Decision::NeedMoreData);
    }
}
