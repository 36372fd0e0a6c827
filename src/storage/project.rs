//! Project management
//!
//! Handles project initialization and provides access to stores.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use super::{ChangesetStore, Config, LockSpace, ModelStore, YamlModelStore};
use crate::domain::{Manifest, Model};
use crate::staging::StagingArea;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a strata project. Run 'strata init' first.")]
    NotInProject,
}

/// A Strata project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(".strata").is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    ///
    /// Existing files are left alone, so running this twice is harmless.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let strata_dir = root.join(".strata");

        for dir in [
            strata_dir.join("changesets"),
            strata_dir.join("model").join("layers"),
            strata_dir.join("locks"),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        let config_path = strata_dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# Strata CLI configuration

[model]
# Name written to a fresh manifest
name = "architecture"
version = "0.1.0"

[changesets]
# Validate the resulting model before a commit is applied
validate_on_commit = true

# Refuse to commit when the model changed since the changeset was created
require_clean_base = true
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = strata_dir.join(".gitignore");
        if !gitignore_path.exists() {
            let gitignore = r#"# Advisory lock files
locks/

# Interrupted writes
*.tmp
"#;
            fs::write(&gitignore_path, gitignore).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        let project = Self::open(root)?;

        let manifest_path = project.model_dir().join("manifest.yaml");
        if !manifest_path.exists() {
            let model_config = &project.config.project.model;
            project
                .model_store()
                .save_manifest(&Manifest::new(&model_config.name, &model_config.version))
                .context("Failed to write model manifest")?;
        }

        Ok(project)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .strata directory path
    pub fn strata_dir(&self) -> PathBuf {
        self.root.join(".strata")
    }

    /// Returns the model directory path
    pub fn model_dir(&self) -> PathBuf {
        self.strata_dir().join("model")
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the changeset store
    pub fn changeset_store(&self) -> ChangesetStore {
        ChangesetStore::for_project(&self.root)
    }

    /// Returns the model store
    pub fn model_store(&self) -> YamlModelStore {
        YamlModelStore::for_project(&self.root)
    }

    /// Returns the lock space
    pub fn locks(&self) -> LockSpace {
        LockSpace::new(self.strata_dir().join("locks"))
    }

    /// Loads the live model
    pub fn load_model(&self) -> Result<Model> {
        self.model_store()
            .load_model()
            .context("Failed to load model")
    }

    /// Returns a staging area configured from the project settings
    pub fn staging_area(&self) -> StagingArea {
        StagingArea::new(
            self.changeset_store(),
            self.locks(),
            Arc::new(self.model_store()),
        )
        .with_config(self.config.project.changesets)
    }
}
