//! The per-file resolve pipeline and the batch runner around it.
//!
//! locate → parse → diff → merge metadata → compose → write.

pub mod batch;
pub mod select;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

pub use batch::{run_batch, BatchReport, BatchSettings, CancelFlag, FileOutcome, FileReport, ProgressFn};
pub use select::PathSelector;

use crate::config::NbmergeConfig;
use crate::diff::{diff, EditScript, EquivalenceConfig};
use crate::errors::PipelineError;
use crate::git::{RevisionSet, RevisionSource, Stage};
use crate::merge::{merge_metadata, CellPolicy, Composer, MetadataSide};
use crate::notebook::Document;
use crate::writer::{write_document, OutputTarget};

/// Everything that shapes how one file is merged and written.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub cells: CellPolicy,
    pub metadata: MetadataSide,
    pub equivalence: EquivalenceConfig,
    pub output: OutputTarget,
    /// Stage conflict-free in-place results after the batch.
    pub stage_resolved: bool,
}

impl ResolveOptions {
    pub fn from_config(config: &NbmergeConfig) -> Self {
        Self {
            cells: config.resolve.cells,
            metadata: config.resolve.metadata,
            equivalence: config.equivalence(),
            output: config.output_target(),
            stage_resolved: config.output.stage_resolved,
        }
    }
}

/// A file that was merged and written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Path written, absolute or relative to the current directory.
    pub written: PathBuf,
    /// Conflict blocks left in the merged cells.
    pub conflict_blocks: usize,
    /// Whether the source file itself was replaced.
    pub in_place: bool,
}

/// Parse the revision at `stage`; an absent stage is an empty document.
pub fn stage_document(set: &RevisionSet, stage: Stage) -> Result<Option<Document>, PipelineError> {
    let Some(bytes) = set.get(stage) else {
        return Ok(None);
    };
    Document::parse(bytes)
        .map(Some)
        .map_err(|source| PipelineError::InvalidDocument {
            path: set.path.clone(),
            side: stage,
            source,
        })
}

/// Merge the revisions in `set` into a single document.
pub fn merge_revisions(set: &RevisionSet, options: &ResolveOptions) -> Result<Document, PipelineError> {
    let base = stage_document(set, Stage::Base)?;
    let ours = stage_document(set, Stage::Ours)?;
    let theirs = stage_document(set, Stage::Theirs)?;
    debug!(
        base = base.is_some(),
        ours = ours.is_some(),
        theirs = theirs.is_some(),
        "parsed revisions"
    );

    check_versions(set, [(Stage::Ours, &ours), (Stage::Theirs, &theirs), (Stage::Base, &base)])?;

    // A side deleted in the conflict contributes nothing, and never wins
    // the metadata.
    let prefer_ours = match (&ours, &theirs) {
        (None, _) => false,
        (_, None) => true,
        _ => options.metadata.prefers_ours(),
    };
    let ours = ours.unwrap_or_default();
    let theirs = theirs.unwrap_or_default();

    let script = diff(&ours.cells, &theirs.cells, &options.equivalence);
    let composer = Composer::new(set.labels.clone());
    let cells = composer.compose(&ours.cells, &theirs.cells, &script, options.cells);

    let winner = if prefer_ours { &ours } else { &theirs };
    let merged = Document {
        format_version: winner.format_version,
        version_keys: winner.version_keys,
        metadata: merge_metadata(&ours.metadata, &theirs.metadata, prefer_ours),
        cells,
    };
    info!(
        path = %set.path.display(),
        changes = script.change_count(),
        cells = merged.cells.len(),
        policy = %options.cells,
        "merged revisions"
    );
    Ok(merged)
}

/// Every present revision must share the major version of the first one.
fn check_versions(set: &RevisionSet, docs: [(Stage, &Option<Document>); 3]) -> Result<(), PipelineError> {
    let mut present = docs.into_iter().filter_map(|(stage, doc)| doc.as_ref().map(|d| (stage, d)));
    let Some((_, reference)) = present.next() else {
        return Ok(());
    };
    for (stage, doc) in present {
        if !reference.compatible(doc) {
            return Err(PipelineError::UnmergeableVersion {
                path: set.path.clone(),
                side: stage,
                found: doc.format_version.major,
                expected: reference.format_version.major,
            });
        }
    }
    Ok(())
}

/// Locate, merge and write one conflicted path.
pub fn resolve_file(
    source: &dyn RevisionSource,
    path: &Path,
    options: &ResolveOptions,
) -> Result<Resolved, PipelineError> {
    info!(path = %path.display(), "resolving conflicted notebook");
    let set = source.conflict_stages(path)?;
    let merged = merge_revisions(&set, options)?;
    let written = write_document(&merged, &source.workdir().join(path), &options.output)?;
    Ok(Resolved {
        written,
        conflict_blocks: merged.conflict_blocks(),
        in_place: options.output.overwrite,
    })
}

/// Diff two stages of a conflicted path without writing anything.
pub fn diff_stages(
    source: &dyn RevisionSource,
    path: &Path,
    from: Stage,
    to: Stage,
    equivalence: &EquivalenceConfig,
) -> Result<(Document, Document, EditScript), PipelineError> {
    let set = source.conflict_stages(path)?;
    let a = stage_document(&set, from)?.unwrap_or_default();
    let b = stage_document(&set, to)?.unwrap_or_default();
    let script = diff(&a.cells, &b.cells, equivalence);
    Ok((a, b, script))
}
