//! # Storage Layer
//!
//! Persistence for Strata CLI with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Changeset metadata | YAML | `.strata/changesets/{id}/metadata.yaml` |
//! | Change log | YAML | `.strata/changesets/{id}/changes.yaml` |
//! | Active changeset | Plain text | `.strata/changesets/.active` |
//! | Manifest | YAML | `.strata/model/manifest.yaml` |
//! | Layers | YAML | `.strata/model/layers/{name}.yaml` |
//! | Config | TOML | `.strata/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - All writes are atomic (temp file + rename)
//! - [`LockSpace`] hands out `fs2` advisory locks per changeset and per layer
//! - [`ChangesetStore::delete`] renames before removing, so racing deletes
//!   have exactly one winner
//!
//! ## Project Structure
//!
//! ```text
//! .strata/
//! ├── changesets/
//! │   ├── .active
//! │   └── feature-x/
//! │       ├── metadata.yaml
//! │       └── changes.yaml
//! ├── model/
//! │   ├── manifest.yaml
//! │   └── layers/
//! ├── locks/                # Advisory lock files (ignored)
//! ├── config.toml
//! └── .gitignore
//! ```

mod atomic;
mod changesets;
mod config;
mod lock;
mod model_store;
mod project;

pub use atomic::atomic_write;
pub use changesets::ChangesetStore;
pub use config::{
    ChangesetConfig, Config, ConfigError, GlobalConfig, LogFormat, ModelConfig, OutputFormat,
    ProjectConfig,
};
pub use lock::{LockGuard, LockSpace};
pub use model_store::{ModelStore, YamlModelStore};
pub use project::{Project, ProjectError};
