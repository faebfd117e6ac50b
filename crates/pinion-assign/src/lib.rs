//! pinion-assign — per-client variant assignment.
//!
//! A client is assigned `stable` or `canary` once, by a uniform draw against
//! the rollout percentage, and keeps that assignment on every later visit
//! even if the global percentage moves. The only sanctioned mutations are an
//! operator force and a custom-assignment hook reacting to an identity
//! change.
//!
//! The assigner is synchronous and storage-free: callers hand in the
//! previously persisted assignment (if any) and persist the returned one
//! through whatever store they use. That keeps the hot path non-blocking
//! and makes concurrent callers safe — the record is idempotent once
//! created, so first writer wins.

pub mod assigner;

pub use assigner::{Assigner, CustomAssign};
