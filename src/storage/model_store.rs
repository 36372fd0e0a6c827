//! Model persistence
//!
//! The staging core reads and writes the live model only through
//! [`ModelStore`]. [`YamlModelStore`] keeps the manifest in
//! `.strata/model/manifest.yaml` and one YAML file per layer in
//! `.strata/model/layers/<name>.yaml`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::atomic::atomic_write;
use crate::domain::{is_valid_layer_name, Layer, Manifest, Model};
use crate::error::{Result, StagingError};

/// Loader/persister for the live model
pub trait ModelStore: Send + Sync {
    /// Loads the full model
    fn load_model(&self) -> Result<Model>;

    /// Persists the manifest
    fn save_manifest(&self, manifest: &Manifest) -> Result<()>;

    /// Loads one persisted layer, `None` if it has never been written
    fn load_layer(&self, name: &str) -> Result<Option<Layer>>;

    /// Persists one layer
    fn save_layer(&self, layer: &Layer) -> Result<()>;

    /// Raw persisted bytes of a layer, `None` if it has never been written
    fn read_layer_bytes(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Puts back bytes taken with [`read_layer_bytes`](Self::read_layer_bytes)
    ///
    /// `None` removes the persisted layer.
    fn restore_layer_bytes(&self, name: &str, bytes: Option<&[u8]>) -> Result<()>;
}

/// YAML file-backed model store
#[derive(Debug, Clone)]
pub struct YamlModelStore {
    dir: PathBuf,
}

impl YamlModelStore {
    /// Creates a store rooted at the given model directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".strata").join("model"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.yaml")
    }

    fn layers_dir(&self) -> PathBuf {
        self.dir.join("layers")
    }

    /// Returns the file path of a layer
    pub fn layer_path(&self, name: &str) -> PathBuf {
        self.layers_dir().join(format!("{}.yaml", name))
    }

    fn read_manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Manifest::default()),
            Err(e) => return Err(StagingError::io("read manifest", path, e)),
        };

        serde_yaml::from_str(&content).map_err(|e| StagingError::Model {
            path,
            reason: e.to_string(),
        })
    }

    fn read_layer(&self, path: &Path) -> Result<Layer> {
        let content =
            fs::read_to_string(path).map_err(|e| StagingError::io("read layer", path, e))?;

        serde_yaml::from_str(&content).map_err(|e| StagingError::Model {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl ModelStore for YamlModelStore {
    fn load_model(&self) -> Result<Model> {
        let mut model = Model::new(self.read_manifest()?);

        let layers_dir = self.layers_dir();
        let entries = match fs::read_dir(&layers_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(model),
            Err(e) => return Err(StagingError::io("list layers", layers_dir, e)),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "yaml") {
                let layer = self.read_layer(&path)?;
                let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
                if stem.as_deref() != Some(layer.name()) {
                    return Err(StagingError::Model {
                        path,
                        reason: format!("file holds layer '{}'", layer.name()),
                    });
                }
                model.insert_layer(layer);
            }
        }

        tracing::debug!(
            layers = model.layer_count(),
            elements = model.element_count(),
            "model loaded"
        );
        Ok(model)
    }

    fn load_layer(&self, name: &str) -> Result<Option<Layer>> {
        let path = self.layer_path(name);
        if !path.is_file() {
            return Ok(None);
        }

        let layer = self.read_layer(&path)?;
        if layer.name() != name {
            return Err(StagingError::Model {
                path,
                reason: format!("file holds layer '{}'", layer.name()),
            });
        }
        Ok(Some(layer))
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let yaml = serde_yaml::to_string(manifest)
            .map_err(|e| StagingError::serialization("manifest", e))?;
        atomic_write(&self.manifest_path(), yaml.as_bytes(), "write manifest")
    }

    fn save_layer(&self, layer: &Layer) -> Result<()> {
        if !is_valid_layer_name(layer.name()) {
            return Err(StagingError::serialization(
                format!("layer '{}'", layer.name()),
                "layer name is not usable as a file name",
            ));
        }

        let yaml = serde_yaml::to_string(layer)
            .map_err(|e| StagingError::serialization(format!("layer '{}'", layer.name()), e))?;
        atomic_write(&self.layer_path(layer.name()), yaml.as_bytes(), "write layer")
    }

    fn read_layer_bytes(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.layer_path(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StagingError::io("back up layer", path, e)),
        }
    }

    fn restore_layer_bytes(&self, name: &str, bytes: Option<&[u8]>) -> Result<()> {
        let path = self.layer_path(name);
        match bytes {
            Some(bytes) => atomic_write(&path, bytes, "restore layer"),
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StagingError::io("restore layer", path, e)),
            },
        }
    }
}
