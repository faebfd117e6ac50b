//! pinion-core — domain types and configuration for Pinion.
//!
//! Pinion shifts a population of clients between a `stable` and a `canary`
//! experience and adjusts the rollout percentage from observed error
//! behavior. This crate holds the types every other crate shares:
//!
//! - **`types`** — variants, assignments, metrics snapshots, evaluation
//!   results, and the rollout state document's in-memory form
//! - **`settings`** — `pinion.toml` static configuration with validation
//!
//! No decision logic lives here; the assigner, scheduler, evaluator, and
//! controller crates each consume these types.

pub mod settings;
pub mod types;

pub use settings::{ConfigError, Settings};
pub use types::*;
