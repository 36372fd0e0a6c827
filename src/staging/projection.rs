//! Virtual projection of a changeset onto a model
//!
//! A projection is the model as it would look after committing a changeset,
//! built without touching the input model or the disk. The base model is
//! cloned (pointer copies only) and changes are folded in ascending sequence
//! order. Only layers a change touches are copied; every other layer stays
//! shared with the base.

use std::collections::BTreeSet;
use std::ops::Deref;
use std::time::Instant;

use crate::domain::{Change, ChangeType, Changeset, ChangesetId, Layer, Model, ModelError};
use crate::error::{Result, StagingError};
use crate::storage::ChangesetStore;

/// Applies one change to a model
///
/// Adds create the target layer if needed and fail on an existing ID.
/// Updates and deletes require both the layer and the element to exist.
pub fn apply_change(model: &mut Model, change: &Change) -> std::result::Result<(), ModelError> {
    let missing_payload = || ModelError::MissingPayload {
        layer: change.layer_name.clone(),
        id: change.element_id.clone(),
    };

    match change.change_type {
        ChangeType::Add => {
            let element = change.after.clone().ok_or_else(missing_payload)?;
            model.layer_or_insert(&change.layer_name).add(element)
        }
        ChangeType::Update => {
            let element = change.after.clone().ok_or_else(missing_payload)?;
            existing_layer(model, &change.layer_name)?.replace(element)
        }
        ChangeType::Delete => existing_layer(model, &change.layer_name)?
            .remove(&change.element_id)
            .map(|_| ()),
    }
}

fn existing_layer<'a>(
    model: &'a mut Model,
    name: &str,
) -> std::result::Result<&'a mut Layer, ModelError> {
    model
        .layer_mut(name)
        .ok_or_else(|| ModelError::LayerNotFound(name.to_string()))
}

/// Folds every change of `changeset` into `model`, in sequence order
///
/// Stops at the first change that cannot be applied. `model` is left
/// partially updated in that case, so callers fold into a working copy.
pub fn fold_changes(model: &mut Model, changeset: &Changeset) -> Result<usize> {
    let ordered = changeset.ordered_changes();
    for change in &ordered {
        apply_change(model, change).map_err(|source| StagingError::Apply {
            id: changeset.id.clone(),
            sequence: change.sequence_number,
            source,
        })?;
    }
    Ok(ordered.len())
}

/// A model with a changeset applied, never persisted
#[derive(Debug, Clone)]
pub struct ProjectedModel {
    model: Model,
    changeset: ChangesetId,
    applied: usize,
    touched_layers: BTreeSet<String>,
}

impl ProjectedModel {
    /// Projects `changeset` onto `base` without modifying `base`
    pub fn build(base: &Model, changeset: &Changeset) -> Result<Self> {
        let mut model = base.clone();
        let applied = fold_changes(&mut model, changeset)?;

        Ok(Self {
            model,
            changeset: changeset.id.clone(),
            applied,
            touched_layers: changeset.affected_layers(),
        })
    }

    pub fn changeset(&self) -> &ChangesetId {
        &self.changeset
    }

    /// Number of changes folded in
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Layers that differ in allocation from the base model
    pub fn touched_layers(&self) -> &BTreeSet<String> {
        &self.touched_layers
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }
}

impl Deref for ProjectedModel {
    type Target = Model;

    fn deref(&self) -> &Model {
        &self.model
    }
}

/// Loads changesets and projects them onto a model
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    store: ChangesetStore,
}

impl ProjectionEngine {
    pub fn new(store: ChangesetStore) -> Self {
        Self { store }
    }

    /// Projects the changeset `id` onto `model`
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::NotFound`] if the changeset does not exist, or
    /// [`StagingError::Apply`] if a change does not fit the model.
    pub fn project_model(&self, model: &Model, id: &ChangesetId) -> Result<ProjectedModel> {
        let changeset = self
            .store
            .load(id)?
            .ok_or_else(|| StagingError::NotFound(id.clone()))?;

        let started = Instant::now();
        let projected = ProjectedModel::build(model, &changeset)?;

        tracing::debug!(
            changeset = %id,
            changes = projected.applied(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "projected changeset"
        );
        Ok(projected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Element, Manifest};
    use crate::snapshot::capture_snapshot;

    fn base() -> Model {
        let mut model = Model::new(Manifest::new("shop", "1.0.0"));
        model.insert_layer(Layer::with_elements(
            "business",
            [Element::new("b-1", "actor", "Customer")],
        ));
        model.insert_layer(Layer::with_elements(
            "application",
            [Element::new("a-1", "service", "Orders")],
        ));
        model
    }

    fn changeset(model: &Model, changes: Vec<Change>) -> Changeset {
        let id = ChangesetId::from_name("feature-x").unwrap();
        let mut cs = Changeset::new(id, "Feature X", "", capture_snapshot(model).unwrap());
        for change in changes {
            cs.push(change);
        }
        cs
    }

    #[test]
    fn later_changes_see_earlier_ones() {
        let base = base();
        let cs = changeset(
            &base,
            vec![
                Change::add("business", Element::new("b-2", "process", "Checkout")),
                Change::update(
                    "business",
                    Element::new("b-2", "process", "Checkout"),
                    Element::new("b-2", "process", "Fast Checkout"),
                ),
                Change::add("technology", Element::new("t-1", "node", "VM")),
                Change::delete("technology", Element::new("t-1", "node", "VM")),
            ],
        );

        let projected = ProjectedModel::build(&base, &cs).unwrap();
        assert_eq!(projected.applied(), 4);
        assert_eq!(
            projected.layer("business").unwrap().get("b-2").unwrap().name,
            "Fast Checkout"
        );
        assert!(projected.layer("technology").unwrap().is_empty());
    }

    #[test]
    fn base_is_untouched_and_unrelated_layers_shared() {
        let base = base();
        let before = capture_snapshot(&base).unwrap();
        let cs = changeset(
            &base,
            vec![Change::add("business", Element::new("b-2", "process", "Checkout"))],
        );

        let projected = ProjectedModel::build(&base, &cs).unwrap();

        assert_eq!(capture_snapshot(&base).unwrap(), before);
        assert!(base.layer("business").unwrap().get("b-2").is_none());
        assert!(projected.shares_layer(&base, "application"));
        assert!(!projected.shares_layer(&base, "business"));
        assert_eq!(
            projected.touched_layers().iter().collect::<Vec<_>>(),
            vec!["business"]
        );
    }

    #[test]
    fn folds_in_sequence_order_not_storage_order() {
        let base = base();
        let mut cs = changeset(
            &base,
            vec![
                Change::add("business", Element::new("b-2", "process", "Checkout")),
                Change::delete("business", Element::new("b-2", "process", "Checkout")),
            ],
        );
        cs.changes.reverse();

        let projected = ProjectedModel::build(&base, &cs).unwrap();
        assert!(!projected.layer("business").unwrap().contains("b-2"));
    }

    #[test]
    fn failing_change_names_its_sequence() {
        let base = base();
        let cs = changeset(
            &base,
            vec![
                Change::add("business", Element::new("b-2", "process", "Checkout")),
                Change::delete("business", Element::new("b-9", "actor", "Ghost")),
            ],
        );

        let err = ProjectedModel::build(&base, &cs).unwrap_err();
        match err {
            StagingError::Apply { sequence, source, .. } => {
                assert_eq!(sequence, 1);
                assert!(matches!(source, ModelError::ElementNotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn update_in_missing_layer_fails() {
        let mut model = base();
        let change = Change::update(
            "strategy",
            Element::new("s-1", "goal", "Grow"),
            Element::new("s-1", "goal", "Grow faster"),
        );
        assert_eq!(
            apply_change(&mut model, &change),
            Err(ModelError::LayerNotFound("strategy".to_string()))
        );
    }

    #[test]
    fn add_of_existing_element_fails() {
        let mut model = base();
        let change = Change::add("business", Element::new("b-1", "actor", "Customer"));
        assert!(matches!(
            apply_change(&mut model, &change),
            Err(ModelError::DuplicateElement { .. })
        ));
    }

    #[test]
    fn engine_loads_from_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ChangesetStore::new(dir.path().join("changesets"));
        let engine = ProjectionEngine::new(store.clone());
        let model = base();

        let missing = ChangesetId::from_name("nope").unwrap();
        assert!(matches!(
            engine.project_model(&model, &missing),
            Err(StagingError::NotFound(_))
        ));

        let mut cs = store
            .create(
                ChangesetId::from_name("feature-x").unwrap(),
                "Feature X",
                "",
                capture_snapshot(&model).unwrap(),
            )
            .unwrap();
        cs.push(Change::add("business", Element::new("b-2", "actor", "Clerk")));
        store.save(&mut cs).unwrap();

        let projected = engine.project_model(&model, &cs.id).unwrap();
        assert_eq!(projected.applied(), 1);
        assert!(projected.layer("business").unwrap().get("b-2").is_some());
        assert!(model.layer("business").unwrap().get("b-2").is_none());
    }
}
