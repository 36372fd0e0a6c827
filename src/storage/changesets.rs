//! File-backed changeset storage
//!
//! Each changeset lives in `.strata/changesets/<id>/` as exactly two files:
//! `metadata.yaml` (identity, status, timestamps, base snapshot, stats) and
//! `changes.yaml` (the ordered change log). The active changeset is recorded
//! in `.strata/changesets/.active`.
//!
//! The store enforces structural consistency only. Serializing concurrent
//! read-modify-write cycles on one changeset is the caller's job (see
//! [`crate::staging::StagingArea`]).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::atomic::atomic_write;
use crate::domain::{Change, Changeset, ChangesetId, ChangesetStats, ChangesetStatus};
use crate::error::{Result, StagingError};
use crate::snapshot::Snapshot;

const METADATA_FILE: &str = "metadata.yaml";
const CHANGES_FILE: &str = "changes.yaml";
const ACTIVE_FILE: &str = ".active";

/// On-disk shape of `metadata.yaml`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataDocument {
    id: ChangesetId,
    name: String,
    #[serde(default)]
    description: String,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    status: ChangesetStatus,
    base_snapshot: Snapshot,
    #[serde(default)]
    stats: ChangesetStats,
}

impl From<&Changeset> for MetadataDocument {
    fn from(cs: &Changeset) -> Self {
        Self {
            id: cs.id.clone(),
            name: cs.name.clone(),
            description: cs.description.clone(),
            created: cs.created,
            modified: cs.modified,
            status: cs.status,
            base_snapshot: cs.base_snapshot.clone(),
            stats: cs.stats,
        }
    }
}

impl MetadataDocument {
    fn into_changeset(self, changes: Vec<Change>) -> Changeset {
        Changeset {
            id: self.id,
            name: self.name,
            description: self.description,
            status: self.status,
            created: self.created,
            modified: self.modified,
            base_snapshot: self.base_snapshot,
            stats: self.stats,
            changes,
        }
    }
}

/// Store for changesets under a single directory
#[derive(Debug, Clone)]
pub struct ChangesetStore {
    dir: PathBuf,
}

impl ChangesetStore {
    /// Creates a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".strata").join("changesets"))
    }

    /// Returns the directory holding all changesets
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the directory of one changeset
    pub fn changeset_dir(&self, id: &ChangesetId) -> PathBuf {
        self.dir.join(id.as_str())
    }

    /// Returns true if a directory exists for the ID
    pub fn exists(&self, id: &ChangesetId) -> bool {
        self.changeset_dir(id).is_dir()
    }

    /// Creates a new, empty changeset
    ///
    /// Fails with [`StagingError::AlreadyExists`] if the ID is taken.
    /// Directory creation is the claim on the ID, so two racing creates of
    /// the same ID cannot both succeed.
    pub fn create(
        &self,
        id: ChangesetId,
        name: &str,
        description: &str,
        base_snapshot: Snapshot,
    ) -> Result<Changeset> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| StagingError::io("create changesets dir", &self.dir, e))?;

        let dir = self.changeset_dir(&id);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StagingError::AlreadyExists(id));
            }
            Err(e) => return Err(StagingError::io("create changeset dir", &dir, e)),
        }

        let changeset = Changeset::new(id, name, description, base_snapshot);
        if let Err(e) = self.write_files(&changeset) {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }

        tracing::debug!(changeset = %changeset.id, "changeset files created");
        Ok(changeset)
    }

    /// Loads a changeset, or `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::Corrupt`] if either file is missing or
    /// unparseable while the directory exists.
    pub fn load(&self, id: &ChangesetId) -> Result<Option<Changeset>> {
        let dir = self.changeset_dir(id);

        let Some(metadata) = self.read_file(&dir, METADATA_FILE, id)? else {
            return Ok(None);
        };
        let Some(changes) = self.read_file(&dir, CHANGES_FILE, id)? else {
            return Ok(None);
        };

        let doc: MetadataDocument = parse_yaml(&metadata, &dir.join(METADATA_FILE), id)?;
        let changes: Vec<Change> = parse_yaml(&changes, &dir.join(CHANGES_FILE), id)?;

        if &doc.id != id {
            return Err(StagingError::Corrupt {
                id: id.to_string(),
                path: dir.join(METADATA_FILE),
                reason: format!("metadata names changeset '{}'", doc.id),
            });
        }

        Ok(Some(doc.into_changeset(changes)))
    }

    /// Reads one changeset file; `None` if the changeset directory is gone
    fn read_file(&self, dir: &Path, file: &str, id: &ChangesetId) -> Result<Option<String>> {
        let path = dir.join(file);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if dir.is_dir() {
                    Err(StagingError::Corrupt {
                        id: id.to_string(),
                        path,
                        reason: format!("missing {}", file),
                    })
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(StagingError::io("read changeset", path, e)),
        }
    }

    /// Persists a changeset, recomputing stats and bumping `modified`
    pub fn save(&self, changeset: &mut Changeset) -> Result<()> {
        let dir = self.changeset_dir(&changeset.id);
        if !dir.is_dir() {
            return Err(StagingError::NotFound(changeset.id.clone()));
        }

        changeset.refresh_stats();
        changeset.modified = Utc::now();
        self.write_files(changeset)
    }

    fn write_files(&self, changeset: &Changeset) -> Result<()> {
        let dir = self.changeset_dir(&changeset.id);

        let changes = serde_yaml::to_string(&changeset.changes)
            .map_err(|e| StagingError::serialization("change log", e))?;
        let metadata = serde_yaml::to_string(&MetadataDocument::from(changeset))
            .map_err(|e| StagingError::serialization("changeset metadata", e))?;

        // Change log first: metadata stats never run ahead of the log they describe
        atomic_write(&dir.join(CHANGES_FILE), changes.as_bytes(), "write change log")?;
        atomic_write(&dir.join(METADATA_FILE), metadata.as_bytes(), "write metadata")?;
        Ok(())
    }

    /// Removes a changeset entirely
    ///
    /// Returns `false` if it was already gone. The directory is first renamed
    /// to a hidden tombstone, so when several callers race exactly one wins
    /// the rename and the others see "already gone".
    pub fn delete(&self, id: &ChangesetId) -> Result<bool> {
        let dir = self.changeset_dir(id);
        let tombstone = self.dir.join(format!(
            ".deleting-{}-{}-{}",
            id,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        match fs::rename(&dir, &tombstone) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StagingError::io("delete changeset", &dir, e)),
        }

        fs::remove_dir_all(&tombstone)
            .map_err(|e| StagingError::io("delete changeset", &tombstone, e))?;

        tracing::debug!(changeset = %id, "changeset files removed");
        Ok(true)
    }

    /// Loads every changeset, skipping records that cannot be read
    ///
    /// Returns changesets sorted by creation time, then ID.
    pub fn list(&self) -> Result<Vec<Changeset>> {
        let (changesets, failures) = self.scan()?;
        for failure in &failures {
            tracing::warn!(error = %failure, "skipping unreadable changeset");
        }
        Ok(changesets)
    }

    /// Like [`list`](Self::list), but also returns per-changeset failures
    pub fn scan(&self) -> Result<(Vec<Changeset>, Vec<StagingError>)> {
        let mut changesets = Vec::new();
        let mut failures = Vec::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((changesets, failures)),
            Err(e) => return Err(StagingError::io("list changesets", &self.dir, e)),
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }

            let id: ChangesetId = match name.parse() {
                Ok(id) => id,
                Err(_) => {
                    failures.push(StagingError::Corrupt {
                        id: name,
                        path: entry.path(),
                        reason: "directory name is not a valid changeset ID".to_string(),
                    });
                    continue;
                }
            };

            match self.load(&id) {
                Ok(Some(changeset)) => changesets.push(changeset),
                Ok(None) => {}
                Err(e) => failures.push(e),
            }
        }

        changesets.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok((changesets, failures))
    }

    /// Reads the active-changeset marker
    pub fn read_active(&self) -> Result<Option<ChangesetId>> {
        let path = self.dir.join(ACTIVE_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StagingError::io("read active marker", path, e)),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        trimmed.parse().map(Some).map_err(|_| StagingError::Corrupt {
            id: trimmed.to_string(),
            path,
            reason: "active marker does not hold a valid changeset ID".to_string(),
        })
    }

    /// Writes the active-changeset marker
    pub fn write_active(&self, id: &ChangesetId) -> Result<()> {
        let content = format!("{}\n", id);
        atomic_write(&self.dir.join(ACTIVE_FILE), content.as_bytes(), "write active marker")
    }

    /// Removes the active-changeset marker; returns `false` if none was set
    pub fn clear_active(&self) -> Result<bool> {
        let path = self.dir.join(ACTIVE_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StagingError::io("clear active marker", path, e)),
        }
    }
}

fn parse_yaml<T: serde::de::DeserializeOwned>(content: &str, path: &Path, id: &ChangesetId) -> Result<T> {
    serde_yaml::from_str(content).map_err(|e| StagingError::Corrupt {
        id: id.to_string(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
