//! Errors raised by the staging core
//!
//! Every variant names the changeset, path or phase involved so callers can
//! act on the message without inspecting internals. [`StagingError::kind`]
//! gives a coarse classification with a stable code.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::{ChangesetId, IdError, ModelError};
use crate::snapshot::Snapshot;

/// Result alias for staging operations
pub type Result<T> = std::result::Result<T, StagingError>;

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    ValidationFailed,
    IoFailure,
    CorruptRecord,
    InvalidInput,
}

impl ErrorKind {
    /// Stable code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "ERR_NOT_FOUND",
            ErrorKind::Conflict => "ERR_CONFLICT",
            ErrorKind::ValidationFailed => "ERR_VALIDATION_FAILED",
            ErrorKind::IoFailure => "ERR_IO",
            ErrorKind::CorruptRecord => "ERR_CORRUPT_RECORD",
            ErrorKind::InvalidInput => "ERR_INVALID_INPUT",
        }
    }
}

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Changeset '{0}' not found")]
    NotFound(ChangesetId),

    #[error("No active changeset. Pass a changeset ID or run 'strata changeset activate <id>'.")]
    NoActiveChangeset,

    #[error("Changeset '{0}' already exists")]
    AlreadyExists(ChangesetId),

    #[error("Cannot {operation} changeset '{id}': {reason}")]
    Conflict {
        id: ChangesetId,
        operation: &'static str,
        reason: String,
    },

    #[error("Model has drifted since changeset '{id}' was created (base {}, current {}); commit with force to override", .expected.short(), .current.short())]
    Drifted {
        id: ChangesetId,
        expected: Snapshot,
        current: Snapshot,
    },

    #[error("Validation failed for changeset '{id}': {}", .errors.join("; "))]
    ValidationFailed { id: ChangesetId, errors: Vec<String> },

    #[error("I/O failure during {phase} at {}: {source}", .path.display())]
    Io {
        phase: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record for changeset '{id}' at {}: {reason}", .path.display())]
    Corrupt {
        id: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Invalid change for changeset '{id}': {reason}")]
    InvalidChange { id: ChangesetId, reason: String },

    #[error("Cannot apply change #{sequence} of changeset '{id}': {source}")]
    Apply {
        id: ChangesetId,
        sequence: u32,
        #[source]
        source: ModelError,
    },

    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("Failed to serialize {what}: {reason}")]
    Serialization { what: String, reason: String },

    #[error("Failed to read model at {}: {reason}", .path.display())]
    Model { path: PathBuf, reason: String },
}

impl StagingError {
    /// Wraps an I/O error with the phase and path it happened at
    pub fn io(phase: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StagingError::Io {
            phase,
            path: path.into(),
            source,
        }
    }

    pub fn serialization(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StagingError::Serialization {
            what: what.into(),
            reason: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StagingError::NotFound(_) | StagingError::NoActiveChangeset => ErrorKind::NotFound,
            StagingError::AlreadyExists(_)
            | StagingError::Conflict { .. }
            | StagingError::Drifted { .. } => ErrorKind::Conflict,
            StagingError::ValidationFailed { .. } | StagingError::Apply { .. } => {
                ErrorKind::ValidationFailed
            }
            StagingError::Io { .. } => ErrorKind::IoFailure,
            StagingError::Corrupt { .. } | StagingError::Model { .. } => ErrorKind::CorruptRecord,
            StagingError::InvalidChange { .. }
            | StagingError::InvalidId(_)
            | StagingError::Serialization { .. } => ErrorKind::InvalidInput,
        }
    }

    /// Stable code of this error's kind
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}
