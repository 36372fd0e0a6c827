//! Drift detection against a recorded snapshot
//!
//! A snapshot is only a digest, so a mismatch says *that* the model moved,
//! not *what* moved. On mismatch every layer and element of the current model
//! is reported as potentially affected. Use [`super::diff_models`] when two
//! materialized models are available and per-element detail is needed.

use serde::Serialize;

use super::digest::{capture_snapshot, Snapshot};
use crate::domain::Model;

/// Outcome of comparing an expected snapshot with a live model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub has_drift: bool,
    pub expected: Snapshot,
    pub current: Snapshot,

    /// Sorted layer names that may have changed
    pub affected_layers: Vec<String>,

    /// Sorted element IDs that may have changed
    pub affected_elements: Vec<String>,
}

/// Outcome of comparing two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotComparison {
    pub identical: bool,

    /// Human-readable description of the mismatch, if any
    pub difference: Option<String>,
}

/// Recomputes the model's snapshot and compares it with `expected`
///
/// # Errors
///
/// Returns an error if the model cannot be serialized for hashing.
pub fn detect_drift(expected: &Snapshot, current: &Model) -> Result<DriftReport, serde_json::Error> {
    let snapshot = capture_snapshot(current)?;

    if &snapshot == expected {
        return Ok(DriftReport {
            has_drift: false,
            expected: expected.clone(),
            current: snapshot,
            affected_layers: Vec::new(),
            affected_elements: Vec::new(),
        });
    }

    tracing::debug!(
        expected = %expected,
        current = %snapshot,
        "model drifted from snapshot"
    );

    let affected_layers: Vec<String> = current
        .layer_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut affected_elements: Vec<String> = current
        .layers()
        .flat_map(|layer| layer.elements().map(|e| e.id.clone()))
        .collect();
    affected_elements.sort();
    affected_elements.dedup();

    Ok(DriftReport {
        has_drift: true,
        expected: expected.clone(),
        current: snapshot,
        affected_layers,
        affected_elements,
    })
}

/// Compares two snapshots for equality
pub fn compare_snapshots(a: &Snapshot, b: &Snapshot) -> SnapshotComparison {
    if a == b {
        SnapshotComparison {
            identical: true,
            difference: None,
        }
    } else {
        SnapshotComparison {
            identical: false,
            difference: Some(format!(
                "snapshot {} differs from {}",
                a.short(),
                b.short()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Element, Layer, Manifest};

    fn model() -> Model {
        let mut model = Model::new(Manifest::new("shop", "1.0.0"));
        model.insert_layer(Layer::with_elements(
            "business",
            [Element::new("b-2", "process", "Checkout"), Element::new("b-1", "actor", "Customer")],
        ));
        model.insert_layer(Layer::with_elements(
            "application",
            [Element::new("a-1", "service", "Orders")],
        ));
        model
    }

    #[test]
    fn no_drift_on_unchanged_model() {
        let model = model();
        let snap = capture_snapshot(&model).unwrap();

        let report = detect_drift(&snap, &model).unwrap();
        assert!(!report.has_drift);
        assert!(report.affected_layers.is_empty());
        assert!(report.affected_elements.is_empty());
        assert_eq!(report.current, snap);
    }

    #[test]
    fn drift_reports_everything_conservatively() {
        let mut model = model();
        let snap = capture_snapshot(&model).unwrap();

        model
            .layer_mut("application")
            .unwrap()
            .add(Element::new("a-2", "service", "Billing"))
            .unwrap();

        let report = detect_drift(&snap, &model).unwrap();
        assert!(report.has_drift);
        assert_eq!(report.affected_layers, vec!["application", "business"]);
        assert_eq!(report.affected_elements, vec!["a-1", "a-2", "b-1", "b-2"]);
        assert_ne!(report.current, report.expected);
    }

    #[test]
    fn compare_identical_snapshots() {
        let snap = capture_snapshot(&model()).unwrap();
        let result = compare_snapshots(&snap, &snap.clone());
        assert!(result.identical);
        assert!(result.difference.is_none());
    }

    #[test]
    fn compare_different_snapshots() {
        let a = capture_snapshot(&model()).unwrap();
        let b = capture_snapshot(&Model::default()).unwrap();
        let result = compare_snapshots(&a, &b);
        assert!(!result.identical);
        assert!(result.difference.unwrap().contains(a.short()));
    }
}
