//! Model validation run before a commit is applied

use std::collections::HashMap;

use crate::domain::Model;

/// Outcome of validating a candidate model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks a candidate model
pub trait Validator: Send + Sync {
    fn validate(&self, model: &Model) -> ValidationReport;
}

/// Checks identity and link integrity
///
/// Element IDs must be unique across the whole model, and every reference or
/// relationship target must name an element that exists somewhere in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceValidator;

impl Validator for ReferenceValidator {
    fn validate(&self, model: &Model) -> ValidationReport {
        let mut errors = Vec::new();
        let mut seen: HashMap<&str, &str> = HashMap::new();

        for name in model.layer_names() {
            let Some(layer) = model.layer(name) else {
                continue;
            };
            for element in layer.elements() {
                if let Some(first) = seen.insert(&element.id, name) {
                    errors.push(format!(
                        "element '{}' appears in both '{}' and '{}'",
                        element.id, first, name
                    ));
                }
            }
        }

        for name in model.layer_names() {
            let Some(layer) = model.layer(name) else {
                continue;
            };
            for element in layer.elements() {
                for target in element.targets() {
                    if !seen.contains_key(target) {
                        errors.push(format!(
                            "element '{}' in '{}' points at missing element '{}'",
                            element.id, name, target
                        ));
                    }
                }
            }
        }

        ValidationReport { errors }
    }
}

/// Accepts every model
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(&self, _model: &Model) -> ValidationReport {
        ValidationReport::default()
    }
}
