//! # Snapshots and Drift
//!
//! Content hashing of a [`Model`](crate::domain::Model) and the checks built
//! on top of it.
//!
//! - [`capture_snapshot`] - deterministic `sha256:` digest of a model
//! - [`detect_drift`] - hash-only "has the model moved?" check
//! - [`compare_snapshots`] - equality of two digests
//! - [`diff_models`] - element-level diff of two materialized models
//!
//! Snapshots are pure functions of model content. Layer and element order
//! in memory never affects the digest.

mod digest;
mod drift;
mod diff;

pub use digest::{capture_snapshot, Snapshot, SnapshotError};
pub use drift::{compare_snapshots, detect_drift, DriftReport, SnapshotComparison};
pub use diff::{diff_models, ElementDelta, ModelDiff};
