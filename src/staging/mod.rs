//! # Staging
//!
//! Changeset lifecycle, virtual projection and atomic commit.
//!
//! ## Flow
//!
//! ```text
//! create ──> stage / unstage ──> project (read-only) ──> commit
//!                                                     └─> delete
//! ```
//!
//! ## Lock domains
//!
//! | Lock | Held by | Protects |
//! |------|---------|----------|
//! | `changeset-<id>` | stage, unstage, delete, set_active, commit | the changeset's change log and its active marker |
//! | `layer-<name>` | commit | reading and persisting one model layer |
//!
//! Layer locks are always taken in sorted order after the changeset lock.

mod commit;
mod manager;
mod projection;
mod validate;

pub use commit::{CommitOptions, CommitOutcome};
pub use manager::StagingArea;
pub use projection::{apply_change, fold_changes, ProjectedModel, ProjectionEngine};
pub use validate::{NoopValidator, ReferenceValidator, ValidationReport, Validator};
