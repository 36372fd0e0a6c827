//! Atomic commit of a changeset into the live model
//!
//! Commit either applies every change and persists every touched layer, or
//! leaves the model exactly as it was. Changes are folded into a working copy
//! first, so apply and validation failures never touch the live model. The
//! touched layers are locked before the working copy is built, and any of them
//! that another commit has persisted in the meantime are reloaded, so a stale
//! `Model` never overwrites a newer layer file. Just before the swap, the
//! in-memory handle and on-disk bytes of every touched layer are backed up; a
//! persistence failure after the swap restores both.

use std::sync::Arc;

use serde::Serialize;

use super::manager::{snapshot_of, StagingArea};
use super::projection::fold_changes;
use crate::domain::{ChangesetId, ChangesetStatus, Layer, Model};
use crate::error::{Result, StagingError};
use crate::storage::{ChangesetConfig, ModelStore};

/// Commit switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    /// Validate the resulting model before applying it
    pub validate: bool,

    /// Commit despite validation errors or a drifted base
    pub force: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            validate: true,
            force: false,
        }
    }
}

impl CommitOptions {
    pub fn from_config(config: &ChangesetConfig) -> Self {
        Self {
            validate: config.validate_on_commit,
            force: false,
        }
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub changeset: ChangesetId,

    /// Number of changes applied
    pub committed: usize,

    /// Layers written, sorted
    pub layers: Vec<String>,
}

/// Pre-commit state of one layer
struct LayerBackup {
    name: String,
    handle: Option<Arc<Layer>>,
    bytes: Option<Vec<u8>>,
}

impl LayerBackup {
    fn capture(model: &Model, store: &dyn ModelStore, names: &[String]) -> Result<Vec<Self>> {
        names
            .iter()
            .map(|name| {
                Ok(Self {
                    name: name.clone(),
                    handle: model.layer_handle(name),
                    bytes: store.read_layer_bytes(name)?,
                })
            })
            .collect()
    }

    /// Puts every layer back, continuing past failures and returning the first
    fn restore_all(backups: Vec<Self>, model: &mut Model, store: &dyn ModelStore) -> Result<()> {
        let mut first_error = None;
        for backup in backups {
            model.restore_layer(&backup.name, backup.handle);
            if let Err(e) = store.restore_layer_bytes(&backup.name, backup.bytes.as_deref()) {
                tracing::error!(layer = %backup.name, error = %e, "failed to restore layer");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl StagingArea {
    /// Commits with the configured policy
    pub fn commit_default(&self, model: &mut Model, id: &ChangesetId) -> Result<CommitOutcome> {
        self.commit(model, id, CommitOptions::from_config(&self.config))
    }

    /// Applies a changeset to `model` and persists the touched layers
    ///
    /// # Errors
    ///
    /// - [`StagingError::NotFound`] if the changeset does not exist
    /// - [`StagingError::Conflict`] if it is already committed
    /// - [`StagingError::Drifted`] if the model, including any touched layer
    ///   persisted since `model` was loaded, moved since the changeset was
    ///   created and the base must be clean, unless `force` is set
    /// - [`StagingError::Apply`] if a change does not fit the model
    /// - [`StagingError::ValidationFailed`] if validation fails, unless `force`
    ///   is set
    /// - any I/O error from persisting layers or the changeset, after the model
    ///   and layer files have been restored
    pub fn commit(
        &self,
        model: &mut Model,
        id: &ChangesetId,
        options: CommitOptions,
    ) -> Result<CommitOutcome> {
        let _guard = self.locks.changeset(id.as_str())?;
        let mut changeset = self.get(id)?;

        if changeset.status != ChangesetStatus::Staged {
            return Err(StagingError::Conflict {
                id: id.clone(),
                operation: "commit",
                reason: format!("changeset is already {}", changeset.status),
            });
        }

        // Layer locks come before the drift check: another commit may have
        // written these layers since `model` was loaded
        let layers: Vec<String> = changeset.affected_layers().into_iter().collect();
        let _layer_guards = self.locks.layers(layers.iter().map(String::as_str))?;

        let mut working = model.clone();
        let moved = self.catch_up(&mut working, &layers)?;
        if !moved.is_empty() {
            tracing::warn!(
                changeset = %id,
                layers = ?moved,
                "persisted layers changed since the model was loaded"
            );
        }

        let current = snapshot_of(&working)?;
        if current != changeset.base_snapshot {
            if self.config.require_clean_base && !options.force {
                return Err(StagingError::Drifted {
                    id: id.clone(),
                    expected: changeset.base_snapshot.clone(),
                    current,
                });
            }
            tracing::warn!(
                changeset = %id,
                expected = %changeset.base_snapshot.short(),
                current = %current.short(),
                "committing onto a drifted model"
            );
        }

        let applied = fold_changes(&mut working, &changeset)?;

        if options.validate {
            let report = self.validator.validate(&working);
            if !report.is_valid() {
                if !options.force {
                    return Err(StagingError::ValidationFailed {
                        id: id.clone(),
                        errors: report.errors,
                    });
                }
                tracing::warn!(
                    changeset = %id,
                    errors = report.errors.len(),
                    "committing despite validation errors"
                );
            }
        }

        let backups = LayerBackup::capture(model, self.model_store.as_ref(), &layers)?;

        for name in &layers {
            model.restore_layer(name, working.layer_handle(name));
        }
        drop(working);

        let persisted = self.persist_layers(model, &layers).and_then(|()| {
            changeset.status = ChangesetStatus::Committed;
            self.store.save(&mut changeset)
        });

        if let Err(err) = persisted {
            tracing::warn!(changeset = %id, error = %err, "commit failed, rolling back");
            if let Err(restore_err) =
                LayerBackup::restore_all(backups, model, self.model_store.as_ref())
            {
                tracing::error!(
                    changeset = %id,
                    error = %restore_err,
                    "rollback incomplete"
                );
            }
            return Err(err);
        }

        for name in &layers {
            if let Some(layer) = model.layer_mut(name) {
                layer.mark_clean();
            }
        }

        tracing::info!(
            changeset = %id,
            changes = applied,
            layers = ?layers,
            "committed changeset"
        );
        Ok(CommitOutcome {
            changeset: id.clone(),
            committed: applied,
            layers,
        })
    }

    /// Replaces layers of `working` that are behind their persisted version
    ///
    /// A layer is behind when it is missing from `working`, or clean but
    /// different from the file. Dirty layers hold the caller's own edits and
    /// are kept. Returns the names of replaced layers.
    fn catch_up(&self, working: &mut Model, names: &[String]) -> Result<Vec<String>> {
        let mut moved = Vec::new();
        for name in names {
            let Some(persisted) = self.model_store.load_layer(name)? else {
                continue;
            };
            let behind = match working.layer(name) {
                Some(layer) => !layer.is_dirty() && !layer.same_content(&persisted),
                None => true,
            };
            if behind {
                working.insert_layer(persisted);
                moved.push(name.clone());
            }
        }
        Ok(moved)
    }

    fn persist_layers(&self, model: &Model, names: &[String]) -> Result<()> {
        for name in names {
            if let Some(layer) = model.layer(name) {
                if layer.is_dirty() {
                    self.model_store.save_layer(layer)?;
                }
            }
        }
        Ok(())
    }
}
