//! Strata CLI - Changeset staging for layered architecture models
//!
//! A model is a manifest plus named layers of typed elements. Edits are
//! recorded in changesets, ordered logs that stay isolated from the live
//! model until committed. Changesets can be projected onto the model for
//! inspection, checked for drift against the snapshot they were based on,
//! and committed atomically.

pub mod cli;
pub mod domain;
pub mod error;
pub mod logging;
pub mod snapshot;
pub mod staging;
pub mod storage;

pub use domain::{Change, ChangeType, Changeset, ChangesetId, ChangesetStatus, Element, Layer, Model};
pub use error::{ErrorKind, Result, StagingError};
pub use snapshot::{capture_snapshot, detect_drift, Snapshot};
pub use staging::{CommitOptions, CommitOutcome, ProjectedModel, StagingArea};
