//! Deterministic model snapshots
//!
//! A snapshot is `sha256:<hex>` over a canonical serialization of the model:
//! the manifest as JSON first, then every layer in lexicographic name order,
//! each with its elements in lexicographic ID order. Map iteration order and
//! insertion history never reach the hasher.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{Element, Manifest, Model};

const PREFIX: &str = "sha256:";

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("Invalid snapshot '{0}': expected 'sha256:' followed by 64 hex characters")]
    Invalid(String),
}

/// An opaque content hash of a model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Snapshot(String);

impl Snapshot {
    /// Wraps a raw SHA-256 digest
    pub fn from_digest(digest: impl AsRef<[u8]>) -> Self {
        Self(format!("{}{}", PREFIX, hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex portion without the algorithm prefix
    pub fn hex(&self) -> &str {
        &self.0[PREFIX.len()..]
    }

    /// Shortened form for display (first 12 hex characters)
    pub fn short(&self) -> &str {
        &self.hex()[..12]
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Snapshot {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = s
            .strip_prefix(PREFIX)
            .is_some_and(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()));

        if !valid {
            return Err(SnapshotError::Invalid(s.to_string()));
        }

        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Snapshot {
    type Error = SnapshotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Snapshot> for String {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.0
    }
}

/// Feeds serialized bytes straight into the hasher
struct HashWriter(Sha256);

impl Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct CanonicalLayer<'a> {
    name: &'a str,
    elements: Vec<&'a Element>,
}

/// Computes the snapshot of a model
///
/// # Errors
///
/// Returns an error only if an element property cannot be serialized to JSON.
pub fn capture_snapshot(model: &Model) -> Result<Snapshot, serde_json::Error> {
    let mut writer = HashWriter(Sha256::new());

    write_manifest(&mut writer, &model.manifest)?;

    for name in model.layer_names() {
        let Some(layer) = model.layer(name) else {
            continue;
        };

        let mut elements: Vec<&Element> = layer.elements().collect();
        elements.sort_by(|a, b| a.id.cmp(&b.id));

        writer.0.update(b"\n");
        serde_json::to_writer(&mut writer, &CanonicalLayer { name, elements })?;
    }

    Ok(Snapshot::from_digest(writer.0.finalize()))
}

fn write_manifest(writer: &mut HashWriter, manifest: &Manifest) -> Result<(), serde_json::Error> {
    serde_json::to_writer(writer, manifest)
}
