//! pinion-health — turns two metrics snapshots into a rollout decision.
//!
//! The evaluator compares the canary group's error rate against the stable
//! group's and produces one of five decisions with a confidence and a
//! human-readable justification. Rules are checked in priority order; the
//! first match wins.
//!
//! Error rates are compared as plain ratios. There is no confidence-interval
//! or sample-size weighting beyond the single minimum-count gate; see
//! DESIGN.md for why that limitation is kept rather than fixed here.

pub mod evaluator;

pub use evaluator::Evaluator;
