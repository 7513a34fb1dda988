//! Error types for the nbmerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`PipelineError`] enum unifies them into the per-file taxonomy
//! the batch runner reports on.

use std::path::PathBuf;

use thiserror::Error;

use crate::git::Stage;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Everything that can stop one file's resolve pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fewer than two revisions exist for the path; nothing to merge.
    #[error("'{path}' is not in conflict ({stages} revision(s) in the index)")]
    NotAConflict { path: PathBuf, stages: usize },

    /// One revision failed to parse or validate.
    #[error("{side} revision of '{path}' is not a valid notebook: {source}")]
    InvalidDocument {
        path: PathBuf,
        side: Stage,
        #[source]
        source: DocumentError,
    },

    /// Major format versions differ across the revisions.
    #[error("cannot merge '{path}': {side} revision has format version {found}, expected {expected}")]
    UnmergeableVersion {
        path: PathBuf,
        side: Stage,
        found: i64,
        expected: i64,
    },

    /// The repository or its object store could not be read.
    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// The output path exists and overwriting was not confirmed.
    #[error("refusing to overwrite '{}' (overwrite not confirmed)", .0.display())]
    WriteBlocked(PathBuf),

    /// Any other write failure (permissions, disk full, ...).
    #[error(transparent)]
    Write(WriteError),

    /// The worker resolving this path panicked.
    #[error("internal error while resolving '{path}': {message}")]
    WorkerPanicked { path: PathBuf, message: String },
}

/// How a per-file error counts in the batch summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Nothing to do for this file.
    Skipped,
    /// This file failed; siblings continue.
    Failed,
    /// The whole run must stop.
    Fatal,
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotAConflict { .. } => ErrorClass::Skipped,
            Self::RepositoryUnavailable(_) => ErrorClass::Fatal,
            Self::InvalidDocument { .. }
            | Self::UnmergeableVersion { .. }
            | Self::WriteBlocked(_)
            | Self::Write(_)
            | Self::WorkerPanicked { .. } => ErrorClass::Failed,
        }
    }

    /// Short label for tables and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotAConflict { .. } => "not_a_conflict",
            Self::InvalidDocument { .. } => "invalid_document",
            Self::UnmergeableVersion { .. } => "unmergeable_version",
            Self::RepositoryUnavailable(_) => "repository_unavailable",
            Self::WriteBlocked(_) => "write_blocked",
            Self::Write(_) => "write_failed",
            Self::WorkerPanicked { .. } => "worker_panicked",
        }
    }
}

impl From<LocateError> for PipelineError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::NotAConflict { path, stages } => Self::NotAConflict { path, stages },
            other => Self::RepositoryUnavailable(other.to_string()),
        }
    }
}

impl From<WriteError> for PipelineError {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Blocked(path) => Self::WriteBlocked(path),
            other => Self::Write(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Document errors
// ---------------------------------------------------------------------------

/// Errors from parsing and validating notebook bytes.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The bytes are not UTF-8.
    #[error("document is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// The bytes are not well-formed JSON.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON is well-formed but violates the notebook schema.
    #[error("{location}: {reason}")]
    Schema { location: String, reason: String },
}

impl DocumentError {
    pub(crate) fn schema(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Locator errors
// ---------------------------------------------------------------------------

/// Errors from the repository capability.
#[derive(Debug, Error)]
pub enum LocateError {
    /// The path has fewer than two populated stages.
    #[error("'{path}' is not in conflict ({stages} revision(s) in the index)")]
    NotAConflict { path: PathBuf, stages: usize },

    /// The repository path does not exist or is not a git work tree.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// The repository handle was poisoned by a panicking worker.
    #[error("repository handle poisoned")]
    Poisoned,
}

// ---------------------------------------------------------------------------
// Writer errors
// ---------------------------------------------------------------------------

/// Errors from serialising and persisting a merged document.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Destination exists and overwrite was not confirmed.
    #[error("refusing to overwrite '{}'", .0.display())]
    Blocked(PathBuf),

    /// Serialisation failure.
    #[error("failed to serialise notebook: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Generic I/O wrapper.
    #[error("write I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = PipelineError::NotAConflict {
            path: "a.ipynb".into(),
            stages: 1,
        };
        assert_eq!(
            err.to_string(),
            "'a.ipynb' is not in conflict (1 revision(s) in the index)"
        );

        let err = PipelineError::InvalidDocument {
            path: "nb.ipynb".into(),
            side: Stage::Theirs,
            source: DocumentError::schema("cells[2].cell_type", "unknown cell type 'foo'"),
        };
        assert!(err.to_string().contains("theirs revision of 'nb.ipynb'"));
        assert!(err.to_string().contains("cells[2].cell_type"));

        let err = ConfigError::InvalidValue {
            field: "output.suffix".into(),
            detail: "must not be empty".into(),
        };
        assert!(err.to_string().contains("output.suffix"));
    }

    #[test]
    fn test_error_classes() {
        let skipped = PipelineError::NotAConflict {
            path: "a".into(),
            stages: 0,
        };
        assert_eq!(skipped.class(), ErrorClass::Skipped);
        assert_eq!(
            PipelineError::WriteBlocked("x".into()).class(),
            ErrorClass::Failed
        );
        assert_eq!(
            PipelineError::RepositoryUnavailable("gone".into()).class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_locate_error_conversion() {
        let err: PipelineError = LocateError::NotAConflict {
            path: "a".into(),
            stages: 1,
        }
        .into();
        assert!(matches!(err, PipelineError::NotAConflict { .. }));

        let err: PipelineError = LocateError::RepositoryNotFound("/nope".into()).into();
        assert!(matches!(err, PipelineError::RepositoryUnavailable(_)));
    }

    #[test]
    fn test_write_error_conversion() {
        let err: PipelineError = WriteError::Blocked("out.ipynb".into()).into();
        assert!(matches!(err, PipelineError::WriteBlocked(_)));
    }
}
