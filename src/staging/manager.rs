//! Staging area: changeset lifecycle on top of storage
//!
//! Every read-modify-write of a changeset runs under that changeset's lock,
//! so concurrent `stage`/`unstage` calls (threads or processes) see each
//! other's writes and sequence numbers stay dense. Operations on different
//! changesets never wait on each other.

use std::sync::Arc;

use super::projection::{ProjectedModel, ProjectionEngine};
use super::validate::{ReferenceValidator, Validator};
use crate::domain::{Change, Changeset, ChangesetId, Model};
use crate::error::{Result, StagingError};
use crate::snapshot::{capture_snapshot, detect_drift, diff_models, DriftReport, ModelDiff, Snapshot};
use crate::storage::{ChangesetConfig, ChangesetStore, LockSpace, ModelStore};

/// Entry point for staging operations
pub struct StagingArea {
    pub(super) store: ChangesetStore,
    pub(super) locks: LockSpace,
    pub(super) model_store: Arc<dyn ModelStore>,
    pub(super) validator: Arc<dyn Validator>,
    pub(super) config: ChangesetConfig,
}

impl StagingArea {
    /// Creates a staging area with the reference validator and default policy
    pub fn new(store: ChangesetStore, locks: LockSpace, model_store: Arc<dyn ModelStore>) -> Self {
        Self {
            store,
            locks,
            model_store,
            validator: Arc::new(ReferenceValidator),
            config: ChangesetConfig::default(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_config(mut self, config: ChangesetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &ChangesetStore {
        &self.store
    }

    pub fn config(&self) -> &ChangesetConfig {
        &self.config
    }

    /// Creates a changeset whose ID is the slug of `name`
    ///
    /// The model's current snapshot becomes the changeset's base.
    pub fn create(&self, model: &Model, name: &str, description: &str) -> Result<Changeset> {
        let id = ChangesetId::from_name(name)?;
        let base = snapshot_of(model)?;
        let changeset = self.store.create(id, name, description, base)?;

        tracing::info!(
            changeset = %changeset.id,
            base = %changeset.base_snapshot.short(),
            "created changeset"
        );
        Ok(changeset)
    }

    pub fn load(&self, id: &ChangesetId) -> Result<Option<Changeset>> {
        self.store.load(id)
    }

    /// Loads a changeset that must exist
    pub fn get(&self, id: &ChangesetId) -> Result<Changeset> {
        self.store
            .load(id)?
            .ok_or_else(|| StagingError::NotFound(id.clone()))
    }

    pub fn list(&self) -> Result<Vec<Changeset>> {
        self.store.list()
    }

    /// Deletes a changeset, returning false if it was already gone
    ///
    /// Clears the active marker when it names the deleted changeset.
    pub fn delete(&self, id: &ChangesetId) -> Result<bool> {
        let _guard = self.locks.changeset(id.as_str())?;

        let deleted = self.store.delete(id)?;
        if self.store.read_active()?.as_ref() == Some(id) {
            self.store.clear_active()?;
        }

        if deleted {
            tracing::info!(changeset = %id, "deleted changeset");
        } else {
            tracing::debug!(changeset = %id, "changeset already gone");
        }
        Ok(deleted)
    }

    /// Marks a staged changeset as the default target for staging
    ///
    /// Runs under the changeset's lock, so a racing [`delete`](Self::delete)
    /// either happens first (and this fails with `NotFound`) or clears the
    /// marker afterwards.
    pub fn set_active(&self, id: &ChangesetId) -> Result<()> {
        let _guard = self.locks.changeset(id.as_str())?;
        let changeset = self.get(id)?;
        if !changeset.status.is_open() {
            return Err(StagingError::Conflict {
                id: id.clone(),
                operation: "activate",
                reason: format!("changeset is {}", changeset.status),
            });
        }

        self.store.write_active(id)?;
        tracing::info!(changeset = %id, "activated changeset");
        Ok(())
    }

    /// Removes the active marker, returning false if none was set
    pub fn clear_active(&self) -> Result<bool> {
        let cleared = self.store.clear_active()?;
        if cleared {
            tracing::info!("cleared active changeset");
        }
        Ok(cleared)
    }

    pub fn active(&self) -> Result<Option<ChangesetId>> {
        self.store.read_active()
    }

    /// Picks `explicit` if given, otherwise the active changeset
    pub fn resolve(&self, explicit: Option<&ChangesetId>) -> Result<ChangesetId> {
        match explicit {
            Some(id) => Ok(id.clone()),
            None => self.active()?.ok_or(StagingError::NoActiveChangeset),
        }
    }

    /// Appends a change with the next sequence number
    ///
    /// Returns the change as recorded.
    pub fn stage(&self, id: &ChangesetId, change: Change) -> Result<Change> {
        change
            .check_shape()
            .map_err(|reason| StagingError::InvalidChange {
                id: id.clone(),
                reason,
            })?;

        let _guard = self.locks.changeset(id.as_str())?;
        let mut changeset = self.open_for_edit(id, "stage")?;

        let staged = changeset.push(change).clone();
        self.store.save(&mut changeset)?;

        tracing::info!(
            changeset = %id,
            sequence = staged.sequence_number,
            element = %staged.element_id,
            layer = %staged.layer_name,
            kind = %staged.change_type,
            "staged change"
        );
        Ok(staged)
    }

    /// Removes every change for `element_id` and renumbers the rest
    ///
    /// Returns the number of changes removed. Removing nothing is not an error.
    pub fn unstage(&self, id: &ChangesetId, element_id: &str) -> Result<usize> {
        let _guard = self.locks.changeset(id.as_str())?;
        let mut changeset = self.open_for_edit(id, "unstage")?;

        let removed = changeset.remove_element(element_id);
        if removed > 0 {
            self.store.save(&mut changeset)?;
        }

        tracing::info!(
            changeset = %id,
            element = %element_id,
            removed,
            remaining = changeset.changes.len(),
            "unstaged element"
        );
        Ok(removed)
    }

    /// Projects a changeset onto `model` without touching either
    pub fn project(&self, model: &Model, id: &ChangesetId) -> Result<ProjectedModel> {
        ProjectionEngine::new(self.store.clone()).project_model(model, id)
    }

    /// Element-level difference between `model` and its projection
    pub fn diff(&self, model: &Model, id: &ChangesetId) -> Result<ModelDiff> {
        let projected = self.project(model, id)?;
        Ok(diff_models(model, &projected))
    }

    /// Compares a changeset's base snapshot with `model`
    pub fn drift(&self, model: &Model, id: &ChangesetId) -> Result<DriftReport> {
        let changeset = self.get(id)?;
        let report = detect_drift(&changeset.base_snapshot, model)
            .map_err(|e| StagingError::serialization("model snapshot", e))?;

        if report.has_drift {
            tracing::warn!(
                changeset = %id,
                expected = %report.expected.short(),
                current = %report.current.short(),
                "model drifted from changeset base"
            );
        }
        Ok(report)
    }

    fn open_for_edit(&self, id: &ChangesetId, operation: &'static str) -> Result<Changeset> {
        let changeset = self.get(id)?;
        if !changeset.status.is_open() {
            return Err(StagingError::Conflict {
                id: id.clone(),
                operation,
                reason: format!("changeset is {}", changeset.status),
            });
        }
        Ok(changeset)
    }
}

pub(super) fn snapshot_of(model: &Model) -> Result<Snapshot> {
    capture_snapshot(model).map_err(|e| StagingError::serialization("model snapshot", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChangeType, ChangesetStatus, Element, Layer, Manifest};
    use crate::storage::YamlModelStore;
    use std::thread;
    use tempfile::TempDir;

    fn area(dir: &TempDir) -> StagingArea {
        let root = dir.path().join(".strata");
        StagingArea::new(
            ChangesetStore::new(root.join("changesets")),
            LockSpace::new(root.join("locks")),
            Arc::new(YamlModelStore::new(root.join("model"))),
        )
    }

    fn model() -> Model {
        let mut model = Model::new(Manifest::new("shop", "1.0.0"));
        model.insert_layer(Layer::with_elements(
            "business",
            [Element::new("b-1", "actor", "Customer")],
        ));
        model
    }

    fn add(id: &str) -> Change {
        Change::add("business", Element::new(id, "process", id))
    }

    #[test]
    fn create_slugifies_and_captures_base() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let model = model();

        let cs = area.create(&model, "  Feature X!! ", "first cut").unwrap();
        assert_eq!(cs.id.as_str(), "feature-x");
        assert_eq!(cs.name, "  Feature X!! ");
        assert_eq!(cs.base_snapshot, capture_snapshot(&model).unwrap());
        assert_eq!(cs.status, ChangesetStatus::Staged);
    }

    #[test]
    fn colliding_slug_is_rejected() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);

        area.create(&model(), "Feature X", "").unwrap();
        let err = area.create(&model(), "feature   x", "").unwrap_err();
        assert!(matches!(err, StagingError::AlreadyExists(id) if id.as_str() == "feature-x"));
    }

    #[test]
    fn name_without_slug_characters_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = area(&dir).create(&model(), "!!!", "").unwrap_err();
        assert!(matches!(err, StagingError::InvalidId(_)));
    }

    #[test]
    fn stage_assigns_sequence_numbers() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let cs = area.create(&model(), "feature-x", "").unwrap();

        let first = area.stage(&cs.id, add("b-2")).unwrap();
        let second = area.stage(&cs.id, add("b-3")).unwrap();
        assert_eq!(first.sequence_number, 0);
        assert_eq!(second.sequence_number, 1);

        let loaded = area.get(&cs.id).unwrap();
        assert_eq!(loaded.stats.additions, 2);
        assert_eq!(loaded.changes[1].change_type, ChangeType::Add);
    }

    #[test]
    fn stage_rejects_malformed_change() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let cs = area.create(&model(), "feature-x", "").unwrap();

        let mut change = add("b-2");
        change.after = None;
        assert!(matches!(
            area.stage(&cs.id, change),
            Err(StagingError::InvalidChange { .. })
        ));
        assert!(area.get(&cs.id).unwrap().is_empty());
    }

    #[test]
    fn stage_into_missing_changeset_fails() {
        let dir = TempDir::new().unwrap();
        let id = ChangesetId::from_name("ghost").unwrap();
        assert!(matches!(
            area(&dir).stage(&id, add("b-2")),
            Err(StagingError::NotFound(_))
        ));
    }

    #[test]
    fn unstage_resequences() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let cs = area.create(&model(), "feature-x", "").unwrap();

        for id in ["b-2", "b-3", "b-4"] {
            area.stage(&cs.id, add(id)).unwrap();
        }
        assert_eq!(area.unstage(&cs.id, "b-3").unwrap(), 1);
        assert_eq!(area.unstage(&cs.id, "b-9").unwrap(), 0);

        let loaded = area.get(&cs.id).unwrap();
        let seqs: Vec<_> = loaded
            .changes
            .iter()
            .map(|c| (c.sequence_number, c.element_id.as_str()))
            .collect();
        assert_eq!(seqs, vec![(0, "b-2"), (1, "b-4")]);
    }

    #[test]
    fn concurrent_stage_from_threads() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let cs = area.create(&model(), "feature-x", "").unwrap();

        thread::scope(|s| {
            for i in 0..8 {
                let area = &area;
                let id = &cs.id;
                s.spawn(move || area.stage(id, add(&format!("e-{i}"))).unwrap());
            }
        });

        let mut seqs: Vec<u32> = area
            .get(&cs.id)
            .unwrap()
            .changes
            .iter()
            .map(|c| c.sequence_number)
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn active_marker_lifecycle() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let cs = area.create(&model(), "feature-x", "").unwrap();

        assert!(matches!(area.resolve(None), Err(StagingError::NoActiveChangeset)));

        area.set_active(&cs.id).unwrap();
        assert_eq!(area.resolve(None).unwrap(), cs.id);

        let other = ChangesetId::from_name("other").unwrap();
        assert_eq!(area.resolve(Some(&other)).unwrap(), other);

        assert!(area.clear_active().unwrap());
        assert!(!area.clear_active().unwrap());
        assert_eq!(area.active().unwrap(), None);
    }

    #[test]
    fn activating_missing_changeset_fails() {
        let dir = TempDir::new().unwrap();
        let id = ChangesetId::from_name("ghost").unwrap();
        assert!(matches!(
            area(&dir).set_active(&id),
            Err(StagingError::NotFound(_))
        ));
    }

    #[test]
    fn delete_clears_matching_active_marker() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let keep = area.create(&model(), "keep", "").unwrap();
        let gone = area.create(&model(), "gone", "").unwrap();

        area.set_active(&gone.id).unwrap();
        assert!(area.delete(&gone.id).unwrap());
        assert!(!area.delete(&gone.id).unwrap());
        assert_eq!(area.active().unwrap(), None);
        assert!(area.load(&keep.id).unwrap().is_some());

        area.set_active(&keep.id).unwrap();
        area.delete(&gone.id).unwrap();
        assert_eq!(area.active().unwrap(), Some(keep.id));
    }

    #[test]
    fn drift_and_diff() {
        let dir = TempDir::new().unwrap();
        let area = area(&dir);
        let mut model = model();
        let cs = area.create(&model, "feature-x", "").unwrap();
        area.stage(&cs.id, add("b-2")).unwrap();

        assert!(!area.drift(&model, &cs.id).unwrap().has_drift);

        let diff = area.diff(&model, &cs.id).unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].element_id, "b-2");

        model
            .layer_mut("business")
            .unwrap()
            .add(Element::new("b-7", "actor", "Clerk"))
            .unwrap();
        assert!(area.drift(&model, &cs.id).unwrap().has_drift);
    }
}
