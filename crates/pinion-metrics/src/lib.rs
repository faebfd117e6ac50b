//! pinion-metrics — snapshot input for the health evaluator.
//!
//! The evaluator needs one `MetricsSnapshot` per variant. `MetricsSource`
//! abstracts where they come from; the two fetches are independent and
//! order-free, so [`fetch_pair`] runs them concurrently.
//!
//! Degenerate input is a first-class case, not an error: a missing variant
//! key, an unreadable file, or malformed JSON yields an empty snapshot,
//! which the evaluator's minimum-sample gate turns into `NEED_MORE_DATA`
//! downstream. The metrics path must never take the automation down.

pub mod source;

pub use source::{FileSource, MetricsSource, SourceError, StaticSource, fetch_pair};
