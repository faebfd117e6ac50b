//! pinion-rollout — the rollout state machine.
//!
//! `Controller::step` maps an evaluation onto a new rollout state: rollbacks
//! clamp to the safety threshold, slow-downs pause, cautions damp the
//! percentage, proceeds grow it toward the ceiling. The operator escape
//! hatches (`apply_manual`, `resume`) bypass the evaluator entirely.
//!
//! Every transition produces a *new* `RolloutConfig`; inputs are never
//! mutated. That makes `step` safe to replay when an optimistic-concurrency
//! write loses the race and the caller retries against a fresh document.

pub mod controller;

pub use controller::{Controller, OverrideError};
