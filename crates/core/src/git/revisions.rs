//! Conflict stages and the repository capability.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::errors::LocateError;
use crate::merge::ConflictLabels;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Provenance of one revision of a conflicted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Common ancestor (index stage 1).
    Base,
    /// Current branch (index stage 2).
    Ours,
    /// Branch being merged in (index stage 3).
    Theirs,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Base, Stage::Ours, Stage::Theirs];

    /// Git index stage number.
    pub fn number(&self) -> i32 {
        match self {
            Self::Base => 1,
            Self::Ours => 2,
            Self::Theirs => 3,
        }
    }

    pub fn from_number(n: i32) -> Option<Self> {
        match n {
            1 => Some(Self::Base),
            2 => Some(Self::Ours),
            3 => Some(Self::Theirs),
            _ => None,
        }
    }

    fn slot(&self) -> usize {
        (self.number() - 1) as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Self::Base),
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            other => Err(format!(
                "invalid stage '{other}': use 'base', 'ours' or 'theirs'"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// RevisionSet
// ---------------------------------------------------------------------------

/// Raw bytes of up to three revisions of one path, plus revision labels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RevisionSet {
    pub path: PathBuf,
    stages: [Option<Vec<u8>>; 3],
    pub labels: ConflictLabels,
}

impl RevisionSet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_stage(mut self, stage: Stage, bytes: impl Into<Vec<u8>>) -> Self {
        self.stages[stage.slot()] = Some(bytes.into());
        self
    }

    pub fn with_labels(mut self, labels: ConflictLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn get(&self, stage: Stage) -> Option<&[u8]> {
        self.stages[stage.slot()].as_deref()
    }

    /// Number of stages with content.
    pub fn populated(&self) -> usize {
        self.stages.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_conflict(&self) -> bool {
        self.populated() >= 2
    }

    /// Pass the set through if it describes a genuine conflict.
    pub fn ensure_conflict(self) -> Result<Self, LocateError> {
        if self.is_conflict() {
            Ok(self)
        } else {
            Err(LocateError::NotAConflict {
                stages: self.populated(),
                path: self.path,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Read access to conflicted revisions, plus index staging.
///
/// Paths are relative to [`RevisionSource::workdir`]. Implementations are
/// shared across batch workers, so they must be `Send + Sync`.
pub trait RevisionSource: Send + Sync {
    /// Every path recorded as unmerged in the index.
    fn conflicted_paths(&self) -> Result<Vec<PathBuf>, LocateError>;

    /// Fetch the revisions of `path`. Fails with `NotAConflict` when fewer
    /// than two stages exist.
    fn conflict_stages(&self, path: &Path) -> Result<RevisionSet, LocateError>;

    /// Stage `paths` from the work tree, clearing their conflict entries.
    fn mark_resolved(&self, paths: &[PathBuf]) -> Result<(), LocateError>;

    /// Root of the work tree.
    fn workdir(&self) -> &Path;
}

/// In-memory [`RevisionSource`] for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryRevisions {
    workdir: PathBuf,
    sets: Mutex<BTreeMap<PathBuf, RevisionSet>>,
    resolved: Mutex<BTreeSet<PathBuf>>,
    unavailable: AtomicBool,
}

impl InMemoryRevisions {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            ..Self::default()
        }
    }

    pub fn insert(&self, set: RevisionSet) {
        if let Ok(mut sets) = self.sets.lock() {
            sets.insert(set.path.clone(), set);
        }
    }

    /// Make every subsequent read fail as if the object store vanished.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Paths passed to [`RevisionSource::mark_resolved`] so far.
    pub fn resolved(&self) -> Vec<PathBuf> {
        self.resolved
            .lock()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), LocateError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LocateError::RepositoryNotFound(
                self.workdir.display().to_string(),
            ));
        }
        Ok(())
    }
}

impl RevisionSource for InMemoryRevisions {
    fn conflicted_paths(&self) -> Result<Vec<PathBuf>, LocateError> {
        self.check_available()?;
        let sets = self.sets.lock().map_err(|_| LocateError::Poisoned)?;
        Ok(sets.keys().cloned().collect())
    }

    fn conflict_stages(&self, path: &Path) -> Result<RevisionSet, LocateError> {
        self.check_available()?;
        let sets = self.sets.lock().map_err(|_| LocateError::Poisoned)?;
        match sets.get(path) {
            Some(set) => set.clone().ensure_conflict(),
            None => Err(LocateError::NotAConflict {
                path: path.to_path_buf(),
                stages: 0,
            }),
        }
    }

    fn mark_resolved(&self, paths: &[PathBuf]) -> Result<(), LocateError> {
        self.check_available()?;
        let mut sets = self.sets.lock().map_err(|_| LocateError::Poisoned)?;
        let mut resolved = self.resolved.lock().map_err(|_| LocateError::Poisoned)?;
        for path in paths {
            sets.remove(path);
            resolved.insert(path.clone());
        }
        Ok(())
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }
}
