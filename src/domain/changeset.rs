//! Changeset domain model
//!
//! A changeset is a named, ordered log of proposed element edits. It is
//! isolated from the live model until committed. Each [`Change`] carries
//! full `before`/`after` copies of the element, never live references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;

use super::id::ChangesetId;
use super::model::Element;
use crate::snapshot::Snapshot;

/// Kind of edit recorded by a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Add => write!(f, "add"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
        }
    }
}

/// A single staged edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Dense, zero-based position within the changeset
    pub sequence_number: u32,

    #[serde(rename = "type")]
    pub change_type: ChangeType,

    pub element_id: String,

    pub layer_name: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Element>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Element>,
}

impl Change {
    fn new(
        change_type: ChangeType,
        layer: impl Into<String>,
        element_id: String,
        before: Option<Element>,
        after: Option<Element>,
    ) -> Self {
        Self {
            sequence_number: 0,
            change_type,
            element_id,
            layer_name: layer.into(),
            timestamp: Utc::now(),
            before,
            after,
        }
    }

    /// An addition of a new element
    pub fn add(layer: impl Into<String>, element: Element) -> Self {
        let id = element.id.clone();
        Self::new(ChangeType::Add, layer, id, None, Some(element))
    }

    /// A replacement of `before` with `after`
    pub fn update(layer: impl Into<String>, before: Element, after: Element) -> Self {
        let id = after.id.clone();
        Self::new(ChangeType::Update, layer, id, Some(before), Some(after))
    }

    /// A removal of an existing element
    pub fn delete(layer: impl Into<String>, before: Element) -> Self {
        let id = before.id.clone();
        Self::new(ChangeType::Delete, layer, id, Some(before), None)
    }

    /// Checks that the payloads match the change type
    ///
    /// add carries `after` only, delete carries `before` only, update carries
    /// both. Payload IDs must equal `element_id`, and the layer name must be
    /// usable as a file name.
    pub fn check_shape(&self) -> Result<(), String> {
        if !is_valid_layer_name(&self.layer_name) {
            return Err(format!(
                "invalid layer name '{}': use letters, digits, '-' or '_'",
                self.layer_name
            ));
        }
        if self.element_id.trim().is_empty() {
            return Err("element ID must not be empty".to_string());
        }

        let (needs_before, needs_after) = match self.change_type {
            ChangeType::Add => (false, true),
            ChangeType::Update => (true, true),
            ChangeType::Delete => (true, false),
        };

        if self.before.is_some() != needs_before {
            return Err(format!(
                "{} change {} a 'before' payload",
                self.change_type,
                if needs_before { "requires" } else { "must not carry" }
            ));
        }
        if self.after.is_some() != needs_after {
            return Err(format!(
                "{} change {} an 'after' payload",
                self.change_type,
                if needs_after { "requires" } else { "must not carry" }
            ));
        }

        for payload in self.before.iter().chain(self.after.iter()) {
            if payload.id != self.element_id {
                return Err(format!(
                    "payload element '{}' does not match element ID '{}'",
                    payload.id, self.element_id
                ));
            }
        }

        Ok(())
    }
}

/// Returns true if a layer name is safe to use as a file stem
pub fn is_valid_layer_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Lifecycle status of a changeset
///
/// On disk the statuses are recorded as `draft`, `committed` and `reverted`;
/// `applied`, `staged` and `discarded` are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangesetStatus {
    #[default]
    Staged,
    Committed,
    Discarded,
}

impl ChangesetStatus {
    /// The value written to `metadata.yaml`
    pub fn as_persisted(&self) -> &'static str {
        match self {
            ChangesetStatus::Staged => "draft",
            ChangesetStatus::Committed => "committed",
            ChangesetStatus::Discarded => "reverted",
        }
    }

    /// Returns true while the changeset can still be edited
    pub fn is_open(&self) -> bool {
        matches!(self, ChangesetStatus::Staged)
    }
}

impl std::fmt::Display for ChangesetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangesetStatus::Staged => write!(f, "staged"),
            ChangesetStatus::Committed => write!(f, "committed"),
            ChangesetStatus::Discarded => write!(f, "discarded"),
        }
    }
}

impl std::str::FromStr for ChangesetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" | "staged" => Ok(ChangesetStatus::Staged),
            "committed" | "applied" => Ok(ChangesetStatus::Committed),
            "reverted" | "discarded" => Ok(ChangesetStatus::Discarded),
            _ => Err(format!("Unknown changeset status: {}", s)),
        }
    }
}

impl Serialize for ChangesetStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_persisted())
    }
}

impl<'de> Deserialize<'de> for ChangesetStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Counts of changes by type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetStats {
    pub additions: u32,
    pub modifications: u32,
    pub deletions: u32,
}

impl ChangesetStats {
    /// Derives stats from a change log
    pub fn from_changes(changes: &[Change]) -> Self {
        let mut stats = Self::default();
        for change in changes {
            match change.change_type {
                ChangeType::Add => stats.additions += 1,
                ChangeType::Update => stats.modifications += 1,
                ChangeType::Delete => stats.deletions += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> u32 {
        self.additions + self.modifications + self.deletions
    }
}

/// A changeset: metadata plus its ordered change log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Changeset {
    pub id: ChangesetId,
    pub name: String,
    pub description: String,
    pub status: ChangesetStatus,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,

    /// Snapshot of the model when the changeset was created
    pub base_snapshot: Snapshot,

    pub stats: ChangesetStats,
    pub changes: Vec<Change>,
}

impl Changeset {
    /// Creates an empty staged changeset
    pub fn new(
        id: ChangesetId,
        name: impl Into<String>,
        description: impl Into<String>,
        base_snapshot: Snapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: description.into(),
            status: ChangesetStatus::Staged,
            created: now,
            modified: now,
            base_snapshot,
            stats: ChangesetStats::default(),
            changes: Vec::new(),
        }
    }

    /// Sequence number the next staged change will receive
    pub fn next_sequence(&self) -> u32 {
        self.changes
            .iter()
            .map(|c| c.sequence_number + 1)
            .max()
            .unwrap_or(0)
    }

    /// Appends a change, assigning it the next sequence number
    pub fn push(&mut self, mut change: Change) -> &Change {
        change.sequence_number = self.next_sequence();
        self.changes.push(change);
        self.refresh_stats();
        &self.changes[self.changes.len() - 1]
    }

    /// Removes every change for `element_id` and renumbers the rest densely
    ///
    /// Returns the number of changes removed.
    pub fn remove_element(&mut self, element_id: &str) -> usize {
        let before = self.changes.len();
        self.changes.retain(|c| c.element_id != element_id);
        let removed = before - self.changes.len();
        self.resequence();
        self.refresh_stats();
        removed
    }

    /// Sorts changes by sequence number and renumbers them from zero
    pub fn resequence(&mut self) {
        self.changes.sort_by_key(|c| c.sequence_number);
        for (index, change) in self.changes.iter_mut().enumerate() {
            change.sequence_number = index as u32;
        }
    }

    /// Recomputes stats from the change log
    pub fn refresh_stats(&mut self) {
        self.stats = ChangesetStats::from_changes(&self.changes);
    }

    /// Changes in ascending sequence order
    pub fn ordered_changes(&self) -> Vec<&Change> {
        let mut ordered: Vec<&Change> = self.changes.iter().collect();
        ordered.sort_by_key(|c| c.sequence_number);
        ordered
    }

    /// Names of every layer touched by a change, sorted
    pub fn affected_layers(&self) -> BTreeSet<String> {
        self.changes.iter().map(|c| c.layer_name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;

    fn make_changeset() -> Changeset {
        let id = ChangesetId::from_name("Feature X").unwrap();
        Changeset::new(id, "Feature X", "", Snapshot::from_digest([0u8; 32]))
    }

    fn element(id: &str) -> Element {
        Element::new(id, "service", id.to_uppercase())
    }

    #[test]
    fn push_assigns_dense_sequence() {
        let mut cs = make_changeset();
        for i in 0..4 {
            let seq = cs.push(Change::add("app", element(&format!("e{}", i)))).sequence_number;
            assert_eq!(seq, i);
        }
        assert_eq!(cs.next_sequence(), 4);
        assert_eq!(cs.stats.additions, 4);
    }

    #[test]
    fn push_ignores_caller_sequence() {
        let mut cs = make_changeset();
        let mut change = Change::add("app", element("e1"));
        change.sequence_number = 42;
        assert_eq!(cs.push(change).sequence_number, 0);
    }

    #[test]
    fn remove_element_resequences_in_order() {
        let mut cs = make_changeset();
        for i in 0..10 {
            cs.push(Change::add("app", element(&format!("e{}", i))));
        }

        for id in ["e1", "e3", "e4", "e7", "e9"] {
            assert_eq!(cs.remove_element(id), 1);
        }

        let seqs: Vec<u32> = cs.changes.iter().map(|c| c.sequence_number).collect();
        let ids: Vec<&str> = cs.changes.iter().map(|c| c.element_id.as_str()).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(ids, vec!["e0", "e2", "e5", "e6", "e8"]);
        assert_eq!(cs.stats.total(), 5);
    }

    #[test]
    fn remove_element_drops_every_change_for_it() {
        let mut cs = make_changeset();
        cs.push(Change::add("app", element("e1")));
        cs.push(Change::add("app", element("e2")));
        cs.push(Change::update("app", element("e1"), element("e1").with_property("v", 2)));

        assert_eq!(cs.remove_element("e1"), 2);
        assert_eq!(cs.changes.len(), 1);
        assert_eq!(cs.changes[0].sequence_number, 0);
        assert_eq!(cs.remove_element("missing"), 0);
    }

    #[test]
    fn stats_count_by_type() {
        let changes = vec![
            Change::add("app", element("e1")),
            Change::add("app", element("e2")),
            Change::update("app", element("e3"), element("e3")),
            Change::delete("app", element("e4")),
        ];

        let stats = ChangesetStats::from_changes(&changes);
        assert_eq!(
            stats,
            ChangesetStats {
                additions: 2,
                modifications: 1,
                deletions: 1
            }
        );
    }

    #[test]
    fn check_shape_accepts_constructors() {
        assert!(Change::add("app", element("e1")).check_shape().is_ok());
        assert!(Change::update("app", element("e1"), element("e1")).check_shape().is_ok());
        assert!(Change::delete("app", element("e1")).check_shape().is_ok());
    }

    #[test]
    fn check_shape_rejects_bad_payloads() {
        let mut change = Change::add("app", element("e1"));
        change.before = Some(element("e1"));
        assert!(change.check_shape().is_err());

        let mut change = Change::delete("app", element("e1"));
        change.before = None;
        assert!(change.check_shape().is_err());

        let mut change = Change::update("app", element("e1"), element("e1"));
        change.element_id = "e2".to_string();
        assert!(change.check_shape().is_err());

        assert!(Change::add("../etc", element("e1")).check_shape().is_err());
        assert!(Change::add("", element("e1")).check_shape().is_err());
    }

    #[test]
    fn status_persists_internal_names() {
        assert_eq!(
            serde_yaml::to_string(&ChangesetStatus::Staged).unwrap().trim(),
            "draft"
        );
        assert_eq!(
            serde_yaml::to_string(&ChangesetStatus::Discarded).unwrap().trim(),
            "reverted"
        );

        let applied: ChangesetStatus = serde_yaml::from_str("applied").unwrap();
        assert_eq!(applied, ChangesetStatus::Committed);
        assert_eq!(applied.to_string(), "committed");

        let draft: ChangesetStatus = serde_yaml::from_str("draft").unwrap();
        assert_eq!(draft.to_string(), "staged");

        assert!(serde_yaml::from_str::<ChangesetStatus>("bogus").is_err());
    }

    #[test]
    fn change_yaml_uses_camel_case() {
        let mut cs = make_changeset();
        cs.push(Change::add("app", element("e1")));

        let yaml = serde_yaml::to_string(&cs.changes).unwrap();
        assert!(yaml.contains("sequenceNumber: 0"));
        assert!(yaml.contains("elementId: e1"));
        assert!(yaml.contains("layerName: app"));
        assert!(yaml.contains("type: add"));
        assert!(!yaml.contains("before"));
    }

    #[test]
    fn affected_layers_are_unique_and_sorted() {
        let mut cs = make_changeset();
        cs.push(Change::add("technology", element("t1")));
        cs.push(Change::add("business", element("b1")));
        cs.push(Change::add("business", element("b2")));

        let layers: Vec<_> = cs.affected_layers().into_iter().collect();
        assert_eq!(layers, vec!["business", "technology"]);
    }
}
