//! Changeset identifiers
//!
//! Changeset IDs are lower-kebab-case slugs derived from the changeset name
//! (e.g., `"Feature X: API v2"` becomes `feature-x-api-v2`). The slug doubles
//! as the changeset's directory name, so only `[a-z0-9-]` is allowed and the
//! ID never starts or ends with a hyphen.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid changeset ID '{0}': expected lower-kebab-case ([a-z0-9-], no leading or trailing hyphen)")]
    InvalidChangesetId(String),

    #[error("Changeset name '{0}' does not contain any usable characters")]
    EmptySlug(String),
}

/// Derives a slug from a free-form name
///
/// Lower-cases, turns whitespace runs into hyphens, drops anything outside
/// `[a-z0-9-]`, collapses repeated hyphens and trims hyphens at both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        let mapped = if c.is_whitespace() { '-' } else { c };

        if mapped == '-' {
            if !last_hyphen {
                slug.push('-');
                last_hyphen = true;
            }
        } else if mapped.is_ascii_lowercase() || mapped.is_ascii_digit() {
            slug.push(mapped);
            last_hyphen = false;
        }
    }

    slug.trim_matches('-').to_string()
}

/// Changeset ID in lower-kebab-case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChangesetId(String);

impl ChangesetId {
    /// Derives an ID from a changeset name
    pub fn from_name(name: &str) -> Result<Self, IdError> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(IdError::EmptySlug(name.to_string()));
        }
        Ok(Self(slug))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangesetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChangesetId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = !s.is_empty()
            && !s.starts_with('-')
            && !s.ends_with('-')
            && !s.contains("--")
            && s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

        if !valid {
            return Err(IdError::InvalidChangesetId(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ChangesetId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChangesetId> for String {
    fn from(id: ChangesetId) -> Self {
        id.0
    }
}

impl AsRef<str> for ChangesetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
