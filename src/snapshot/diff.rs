//! Structural diff between two materialized models
//!
//! Unlike drift detection this needs both models in memory, and in return it
//! names every added, removed and modified element. Layers that are shared
//! between the two models (same allocation) are skipped without comparing
//! their elements, which keeps diffs of projections cheap.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::domain::{Layer, Model};

/// One element-level difference
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ElementDelta {
    pub layer: String,
    pub element_id: String,
}

/// Element-level differences between two models, each list sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelDiff {
    pub added: Vec<ElementDelta>,
    pub removed: Vec<ElementDelta>,
    pub modified: Vec<ElementDelta>,
    pub manifest_changed: bool,
}

impl ModelDiff {
    pub fn is_empty(&self) -> bool {
        !self.manifest_changed
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
    }

    /// Number of element-level differences
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Compares `before` with `after`
pub fn diff_models(before: &Model, after: &Model) -> ModelDiff {
    let mut diff = ModelDiff {
        manifest_changed: before.manifest != after.manifest,
        ..ModelDiff::default()
    };

    let names: BTreeSet<&str> = before
        .layer_names()
        .into_iter()
        .chain(after.layer_names())
        .collect();

    for name in names {
        if before.shares_layer(after, name) {
            continue;
        }

        match (before.layer(name), after.layer(name)) {
            (Some(old), Some(new)) => diff_layer(&mut diff, old, new),
            (Some(old), None) => diff.removed.extend(deltas(old)),
            (None, Some(new)) => diff.added.extend(deltas(new)),
            (None, None) => {}
        }
    }

    diff.added.sort();
    diff.removed.sort();
    diff.modified.sort();
    diff
}

fn deltas(layer: &Layer) -> impl Iterator<Item = ElementDelta> + '_ {
    layer.elements().map(|e| ElementDelta {
        layer: layer.name().to_string(),
        element_id: e.id.clone(),
    })
}

fn diff_layer(diff: &mut ModelDiff, old: &Layer, new: &Layer) {
    let delta = |id: &str| ElementDelta {
        layer: new.name().to_string(),
        element_id: id.to_string(),
    };

    for element in new.elements() {
        match old.get(&element.id) {
            None => diff.added.push(delta(&element.id)),
            Some(previous) => {
                if !new.shares_element(old, &element.id) && previous != element {
                    diff.modified.push(delta(&element.id));
                }
            }
        }
    }

    for element in old.elements() {
        if !new.contains(&element.id) {
            diff.removed.push(delta(&element.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Element, Manifest};

    fn base() -> Model {
        let mut model = Model::new(Manifest::new("shop", "1.0.0"));
        model.insert_layer(Layer::with_elements(
            "business",
            [Element::new("b-1", "actor", "Customer"), Element::new("b-2", "process", "Checkout")],
        ));
        model.insert_layer(Layer::with_elements(
            "application",
            [Element::new("a-1", "service", "Orders")],
        ));
        model
    }

    fn delta(layer: &str, id: &str) -> ElementDelta {
        ElementDelta {
            layer: layer.to_string(),
            element_id: id.to_string(),
        }
    }

    #[test]
    fn identical_models_have_empty_diff() {
        let model = base();
        let diff = diff_models(&model, &model.clone());
        assert!(diff.is_empty());
        assert_eq!(diff.len(), 0);
    }

    #[test]
    fn detects_add_remove_modify() {
        let before = base();
        let mut after = before.clone();

        let business = after.layer_mut("business").unwrap();
        business.add(Element::new("b-3", "actor", "Clerk")).unwrap();
        business.remove("b-1").unwrap();
        business
            .replace(Element::new("b-2", "process", "Fast Checkout"))
            .unwrap();

        let diff = diff_models(&before, &after);
        assert_eq!(diff.added, vec![delta("business", "b-3")]);
        assert_eq!(diff.removed, vec![delta("business", "b-1")]);
        assert_eq!(diff.modified, vec![delta("business", "b-2")]);
        assert!(!diff.manifest_changed);
    }

    #[test]
    fn rewrite_with_equal_content_is_not_a_modification() {
        let before = base();
        let mut after = before.clone();
        after
            .layer_mut("application")
            .unwrap()
            .replace(Element::new("a-1", "service", "Orders"))
            .unwrap();

        assert!(diff_models(&before, &after).is_empty());
    }

    #[test]
    fn whole_layers_added_and_removed() {
        let before = base();
        let mut after = Model::new(before.manifest.clone());
        after.insert_layer(Layer::with_elements(
            "technology",
            [Element::new("t-1", "node", "VM")],
        ));

        let diff = diff_models(&before, &after);
        assert_eq!(diff.added, vec![delta("technology", "t-1")]);
        assert_eq!(
            diff.removed,
            vec![
                delta("application", "a-1"),
                delta("business", "b-1"),
                delta("business", "b-2"),
            ]
        );
    }

    #[test]
    fn manifest_changes_are_flagged() {
        let before = base();
        let mut after = before.clone();
        after.manifest.version = "2.0.0".to_string();

        let diff = diff_models(&before, &after);
        assert!(diff.manifest_changed);
        assert!(!diff.is_empty());
        assert_eq!(diff.len(), 0);
    }
}
