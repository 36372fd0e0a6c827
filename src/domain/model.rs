//! Architecture model domain types
//!
//! A [`Model`] is a manifest plus a set of named layers. Layers and the
//! elements inside them are held behind [`Arc`], so cloning a model only
//! copies pointers. Mutating a layer through [`Model::layer_mut`] copies that
//! one layer on write and leaves every other layer shared with the original.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Element '{id}' already exists in layer '{layer}'")]
    DuplicateElement { layer: String, id: String },

    #[error("Element '{id}' not found in layer '{layer}'")]
    ElementNotFound { layer: String, id: String },

    #[error("Layer '{0}' not found")]
    LayerNotFound(String),

    #[error("Change to element '{id}' in layer '{layer}' carries no element payload")]
    MissingPayload { layer: String, id: String },
}

/// Free-form element properties, kept sorted by key
pub type Properties = BTreeMap<String, serde_json::Value>;

/// A typed outgoing reference to another element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Target element ID
    pub target: String,

    /// Reference type (e.g., "realizes", "serves")
    #[serde(rename = "type")]
    pub reference_type: String,
}

/// A typed relationship to another element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    /// Target element ID
    pub target: String,

    /// Relationship predicate (e.g., "depends-on", "composes")
    pub predicate: String,
}

/// A single model element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Unique identifier
    pub id: String,

    /// Element type (e.g., "service", "actor", "component")
    #[serde(rename = "type")]
    pub element_type: String,

    /// Human-readable name
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

impl Element {
    /// Creates a new element with no properties or links
    pub fn new(
        id: impl Into<String>,
        element_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            element_type: element_type.into(),
            name: name.into(),
            properties: Properties::new(),
            references: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Sets a property, returning the element for chaining
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds a reference, returning the element for chaining
    pub fn with_reference(mut self, target: impl Into<String>, reference_type: impl Into<String>) -> Self {
        self.references.push(Reference {
            target: target.into(),
            reference_type: reference_type.into(),
        });
        self
    }

    /// Adds a relationship, returning the element for chaining
    pub fn with_relationship(mut self, target: impl Into<String>, predicate: impl Into<String>) -> Self {
        self.relationships.push(Relationship {
            target: target.into(),
            predicate: predicate.into(),
        });
        self
    }

    /// Iterates over every element ID this element points at
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .map(|r| r.target.as_str())
            .chain(self.relationships.iter().map(|r| r.target.as_str()))
    }
}

/// A named, ordered collection of elements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layer {
    name: String,

    #[serde(default)]
    elements: Vec<Arc<Element>>,

    /// Set when the layer differs from what was last persisted
    #[serde(skip)]
    dirty: bool,
}

impl Layer {
    /// Creates an empty layer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
            dirty: false,
        }
    }

    /// Creates a layer from existing elements, in the given order
    pub fn with_elements(name: impl Into<String>, elements: impl IntoIterator<Item = Element>) -> Self {
        Self {
            name: name.into(),
            elements: elements.into_iter().map(Arc::new).collect(),
            dirty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterates over elements in layer order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.id == id)
    }

    /// Gets an element by ID
    pub fn get(&self, id: &str) -> Option<&Element> {
        self.position(id).map(|i| self.elements[i].as_ref())
    }

    /// Returns true if the layer holds an element with this ID
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Appends a new element; fails if the ID is already present
    pub fn add(&mut self, element: Element) -> Result<(), ModelError> {
        if self.contains(&element.id) {
            return Err(ModelError::DuplicateElement {
                layer: self.name.clone(),
                id: element.id,
            });
        }
        self.elements.push(Arc::new(element));
        self.dirty = true;
        Ok(())
    }

    /// Replaces an existing element in place, keeping its position
    pub fn replace(&mut self, element: Element) -> Result<(), ModelError> {
        let index = self
            .position(&element.id)
            .ok_or_else(|| ModelError::ElementNotFound {
                layer: self.name.clone(),
                id: element.id.clone(),
            })?;
        self.elements[index] = Arc::new(element);
        self.dirty = true;
        Ok(())
    }

    /// Removes an element by ID, returning it
    pub fn remove(&mut self, id: &str) -> Result<Element, ModelError> {
        let index = self.position(id).ok_or_else(|| ModelError::ElementNotFound {
            layer: self.name.clone(),
            id: id.to_string(),
        })?;
        let removed = self.elements.remove(index);
        self.dirty = true;
        Ok(Arc::unwrap_or_clone(removed))
    }

    /// Returns true if the layer has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Returns true if both layers hold equal elements in the same order
    ///
    /// The dirty flag is ignored.
    pub fn same_content(&self, other: &Layer) -> bool {
        self.name == other.name
            && self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
    }

    /// Returns true if both layers hold the very same element allocation for `id`
    pub fn shares_element(&self, other: &Layer, id: &str) -> bool {
        match (self.position(id), other.position(id)) {
            (Some(a), Some(b)) => Arc::ptr_eq(&self.elements[a], &other.elements[b]),
            _ => false,
        }
    }
}

/// Model manifest: identity and free-form metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// The root aggregate: manifest plus layers keyed by name
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub manifest: Manifest,
    layers: HashMap<String, Arc<Layer>>,
}

impl Model {
    /// Creates an empty model
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            layers: HashMap::new(),
        }
    }

    /// Inserts (or replaces) a layer
    pub fn insert_layer(&mut self, layer: Layer) {
        self.layers.insert(layer.name.clone(), Arc::new(layer));
    }

    /// Gets a layer by name
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name).map(|l| l.as_ref())
    }

    /// Gets a mutable layer, copying it first if it is shared
    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.get_mut(name).map(Arc::make_mut)
    }

    /// Gets a mutable layer, creating an empty one if missing
    pub fn layer_or_insert(&mut self, name: &str) -> &mut Layer {
        let layer = self
            .layers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Layer::new(name)));
        Arc::make_mut(layer)
    }

    /// Iterates over layers in arbitrary order
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values().map(|l| l.as_ref())
    }

    /// Returns layer names sorted lexicographically
    pub fn layer_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.layers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Total number of elements across all layers
    pub fn element_count(&self) -> usize {
        self.layers.values().map(|l| l.len()).sum()
    }

    /// Finds an element anywhere in the model
    pub fn find_element(&self, id: &str) -> Option<(&Layer, &Element)> {
        self.layers
            .values()
            .find_map(|layer| layer.get(id).map(|e| (layer.as_ref(), e)))
    }

    /// Returns true if `other` holds the very same allocation for layer `name`
    pub fn shares_layer(&self, other: &Model, name: &str) -> bool {
        match (self.layers.get(name), other.layers.get(name)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Returns a shared handle to a layer, used for cheap backups
    pub(crate) fn layer_handle(&self, name: &str) -> Option<Arc<Layer>> {
        self.layers.get(name).cloned()
    }

    /// Puts a previously taken handle back, or removes the layer if it did not exist
    pub(crate) fn restore_layer(&mut self, name: &str, handle: Option<Arc<Layer>>) {
        match handle {
            Some(layer) => {
                self.layers.insert(name.to_string(), layer);
            }
            None => {
                self.layers.remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> Model {
        let mut model = Model::new(Manifest::new("test", "1.0.0"));
        model.insert_layer(Layer::with_elements(
            "business",
            [
                Element::new("b-1", "actor", "Customer"),
                Element::new("b-2", "process", "Checkout"),
            ],
        ));
        model.insert_layer(Layer::with_elements(
            "application",
            [Element::new("a-1", "service", "Orders").with_reference("b-2", "serves")],
        ));
        model
    }

    #[test]
    fn layer_add_rejects_duplicates() {
        let mut layer = Layer::new("business");
        layer.add(Element::new("b-1", "actor", "Customer")).unwrap();

        let err = layer.add(Element::new("b-1", "actor", "Other")).unwrap_err();
        assert_eq!(
            err,
            ModelError::DuplicateElement {
                layer: "business".to_string(),
                id: "b-1".to_string()
            }
        );
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn layer_replace_keeps_position() {
        let mut layer = Layer::with_elements(
            "business",
            [
                Element::new("b-1", "actor", "Customer"),
                Element::new("b-2", "process", "Checkout"),
                Element::new("b-3", "process", "Refund"),
            ],
        );

        layer.replace(Element::new("b-2", "process", "Fast Checkout")).unwrap();

        let names: Vec<_> = layer.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Customer", "Fast Checkout", "Refund"]);
        assert!(layer.is_dirty());
    }

    #[test]
    fn same_content_ignores_dirty_flag() {
        let persisted = Layer::with_elements("business", [Element::new("b-1", "actor", "Customer")]);
        let mut edited = Layer::new("business");
        edited.add(Element::new("b-1", "actor", "Customer")).unwrap();

        assert!(edited.is_dirty());
        assert!(edited.same_content(&persisted));

        edited.add(Element::new("b-2", "actor", "Clerk")).unwrap();
        assert!(!edited.same_content(&persisted));
        assert!(!Layer::new("other").same_content(&Layer::new("business")));
    }

    #[test]
    fn layer_remove_missing_fails() {
        let mut layer = Layer::new("business");
        assert!(matches!(
            layer.remove("nope"),
            Err(ModelError::ElementNotFound { .. })
        ));
        assert!(!layer.is_dirty());
    }

    #[test]
    fn clone_shares_layers_until_written() {
        let original = sample_model();
        let mut copy = original.clone();

        assert!(copy.shares_layer(&original, "business"));
        assert!(copy.shares_layer(&original, "application"));

        copy.layer_mut("business")
            .unwrap()
            .add(Element::new("b-3", "actor", "Clerk"))
            .unwrap();

        assert!(!copy.shares_layer(&original, "business"));
        assert!(copy.shares_layer(&original, "application"));
        assert_eq!(original.layer("business").unwrap().len(), 2);
        assert_eq!(copy.layer("business").unwrap().len(), 3);

        // Untouched elements inside the copied layer are still shared
        let copied = copy.layer("business").unwrap();
        assert!(copied.shares_element(original.layer("business").unwrap(), "b-1"));
    }

    #[test]
    fn layer_names_sorted() {
        let model = sample_model();
        assert_eq!(model.layer_names(), vec!["application", "business"]);
    }

    #[test]
    fn find_element_across_layers() {
        let model = sample_model();
        let (layer, element) = model.find_element("a-1").unwrap();
        assert_eq!(layer.name(), "application");
        assert_eq!(element.name, "Orders");
        assert!(model.find_element("missing").is_none());
        assert_eq!(model.element_count(), 3);
    }

    #[test]
    fn element_targets_cover_links() {
        let element = Element::new("a-1", "service", "Orders")
            .with_reference("b-2", "serves")
            .with_relationship("a-2", "depends-on");

        let targets: Vec<_> = element.targets().collect();
        assert_eq!(targets, vec!["b-2", "a-2"]);
    }

    #[test]
    fn layer_yaml_roundtrip_skips_dirty_flag() {
        let mut layer = Layer::new("business");
        layer
            .add(Element::new("b-1", "actor", "Customer").with_property("owner", "sales"))
            .unwrap();

        let yaml = serde_yaml::to_string(&layer).unwrap();
        assert!(!yaml.contains("dirty"));

        let loaded: Layer = serde_yaml::from_str(&yaml).unwrap();
        assert!(!loaded.is_dirty());
        assert_eq!(loaded.get("b-1").unwrap().properties["owner"], "sales");
    }
}
