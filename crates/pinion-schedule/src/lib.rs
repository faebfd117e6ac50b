//! pinion-schedule — time-based gradual-rollout target.
//!
//! Computes the percentage the rollout *should* be at for a given wall-clock
//! time: a linear ramp from the configured initial percentage toward
//! `max_percentage` over `rollout_period_days`. Pure and side-effect free,
//! so it is safe to call on every request, and monotonically non-decreasing
//! in `now` for a fixed configuration.

use pinion_core::{RolloutConfig, ScheduleConfig, SECS_PER_DAY};
use tracing::debug;

/// Target percentage at time `now` (unix seconds).
///
/// With the schedule disabled this is just `config.current_percentage` —
/// manual mode, where the value only moves via evaluator or operator action.
/// A `rollout_period_days` of zero means "reach max immediately".
pub fn current_target(config: &RolloutConfig, schedule: &ScheduleConfig, now: u64) -> f64 {
    if !schedule.enabled {
        return config.current_percentage;
    }

    // A start epoch in the future counts as zero elapsed days.
    let days_elapsed = now.saturating_sub(schedule.start_epoch) / SECS_PER_DAY;
    let period = config.rollout_period_days as u64;

    let fraction = if period == 0 {
        1.0
    } else {
        days_elapsed.min(period) as f64 / period as f64
    };

    let target = schedule.initial_percentage
        + (config.max_percentage - schedule.initial_percentage) * fraction;
    let target = target.clamp(0.0, config.max_percentage);

    debug!(
        days_elapsed,
        period,
        target,
        "computed schedule target"
    );
    target
}
