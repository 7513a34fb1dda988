//! nbmerge core library.
//!
//! This crate provides the components for resolving git merge conflicts in
//! notebooks at cell granularity: the notebook model, the cell sequence
//! differ, metadata merging and conflict composition, repository access,
//! canonical output, configuration, and the batch pipeline tying them
//! together.

pub mod config;
pub mod diff;
pub mod errors;
pub mod git;
pub mod merge;
pub mod notebook;
pub mod pipeline;
pub mod render;
pub mod writer;

// Re-exports for convenience.
pub use config::NbmergeConfig;
pub use diff::{diff, EditKind, EditOp, EditScript, EquivalenceConfig};
pub use errors::{ConfigError, DocumentError, ErrorClass, LocateError, PipelineError, WriteError};
pub use git::{GitRepository, InMemoryRevisions, RevisionSet, RevisionSource, Stage};
pub use merge::{compose, merge_metadata, CellPolicy, ConflictLabels, MetadataSide};
pub use notebook::{Cell, CellKind, Document};
pub use pipeline::{
    resolve_file, run_batch, BatchReport, BatchSettings, CancelFlag, FileOutcome, FileReport,
    PathSelector, ResolveOptions,
};
pub use writer::{write_document, OutputTarget};
