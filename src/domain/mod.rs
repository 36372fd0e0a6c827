//! Domain models for Strata
//!
//! Contains the model and changeset types without any I/O concerns.

mod id;
mod model;
mod changeset;

pub use id::{slugify, ChangesetId, IdError};
pub use model::{Element, Layer, Manifest, Model, ModelError, Properties, Reference, Relationship};
pub use changeset::{
    is_valid_layer_name, Change, ChangeType, Changeset, ChangesetStats, ChangesetStatus,
};
