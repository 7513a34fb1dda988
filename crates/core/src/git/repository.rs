//! [`RevisionSource`] over a local git repository via `git2`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use git2::{Oid, Repository};
use tracing::{debug, info, instrument};

use super::revisions::{RevisionSet, RevisionSource, Stage};
use crate::errors::LocateError;
use crate::merge::ConflictLabels;

/// Refs naming the incoming side, in lookup order.
const THEIR_HEADS: &[&str] = &["MERGE_HEAD", "CHERRY_PICK_HEAD", "REVERT_HEAD", "REBASE_HEAD"];

/// Blob ids of the three stages of one conflicted path.
type StageOids = [Option<Oid>; 3];

struct Inner {
    repo: Repository,
    conflicts: BTreeMap<PathBuf, StageOids>,
}

/// A git work tree opened for conflict resolution.
///
/// The index conflicts are snapshotted when the repository is opened.
/// `git2::Repository` is `Send` but not `Sync`, so the handle sits behind a
/// mutex and workers take turns reading blobs.
pub struct GitRepository {
    inner: Mutex<Inner>,
    workdir: PathBuf,
    labels: ConflictLabels,
}

impl GitRepository {
    /// Open the repository whose work tree is exactly `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LocateError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| LocateError::RepositoryNotFound(path.display().to_string()))?;
        Self::from_repo(repo)
    }

    /// Find the repository containing `path`, searching parent directories.
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, LocateError> {
        let path = path.as_ref();
        info!(path = %path.display(), "discovering git repository");
        let repo = Repository::discover(path)
            .map_err(|_| LocateError::RepositoryNotFound(path.display().to_string()))?;
        Self::from_repo(repo)
    }

    fn from_repo(repo: Repository) -> Result<Self, LocateError> {
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                LocateError::RepositoryNotFound(format!("{} (bare repository)", repo.path().display()))
            })?;

        let conflicts = read_conflicts(&repo)?;
        let labels = ConflictLabels {
            ours: revision_label(&repo, &["HEAD"]).unwrap_or_else(|| "ours".into()),
            theirs: revision_label(&repo, THEIR_HEADS).unwrap_or_else(|| "theirs".into()),
        };
        info!(
            workdir = %workdir.display(),
            conflicts = conflicts.len(),
            ours = %labels.ours,
            theirs = %labels.theirs,
            "repository opened"
        );

        Ok(Self {
            inner: Mutex::new(Inner { repo, conflicts }),
            workdir,
            labels,
        })
    }

    pub fn labels(&self) -> &ConflictLabels {
        &self.labels
    }
}

/// Work-tree root of the repository containing `path`, if any.
///
/// Used to bound configuration discovery without snapshotting the index.
pub fn discover_workdir<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    Repository::discover(path.as_ref())
        .ok()
        .and_then(|repo| repo.workdir().map(Path::to_path_buf))
}

impl RevisionSource for GitRepository {
    fn conflicted_paths(&self) -> Result<Vec<PathBuf>, LocateError> {
        let inner = self.inner.lock().map_err(|_| LocateError::Poisoned)?;
        Ok(inner.conflicts.keys().cloned().collect())
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    fn conflict_stages(&self, path: &Path) -> Result<RevisionSet, LocateError> {
        let inner = self.inner.lock().map_err(|_| LocateError::Poisoned)?;
        let Some(oids) = inner.conflicts.get(path) else {
            return Err(LocateError::NotAConflict {
                path: path.to_path_buf(),
                stages: 0,
            });
        };

        let mut set = RevisionSet::new(path).with_labels(self.labels.clone());
        for stage in Stage::ALL {
            if let Some(oid) = oids[(stage.number() - 1) as usize] {
                let blob = inner.repo.find_blob(oid)?;
                debug!(%stage, %oid, bytes = blob.content().len(), "read stage blob");
                set = set.with_stage(stage, blob.content());
            }
        }
        set.ensure_conflict()
    }

    fn mark_resolved(&self, paths: &[PathBuf]) -> Result<(), LocateError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().map_err(|_| LocateError::Poisoned)?;
        let mut index = inner.repo.index()?;
        for path in paths {
            // Adding the work-tree file replaces the stage 1-3 entries.
            index.add_path(path)?;
            debug!(path = %path.display(), "staged resolved file");
        }
        index.write()?;
        for path in paths {
            inner.conflicts.remove(path);
        }
        info!(count = paths.len(), "marked files resolved");
        Ok(())
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }
}

fn read_conflicts(repo: &Repository) -> Result<BTreeMap<PathBuf, StageOids>, LocateError> {
    let index = repo.index()?;
    let mut conflicts = BTreeMap::new();
    if !index.has_conflicts() {
        return Ok(conflicts);
    }

    for conflict in index.conflicts()? {
        let conflict = conflict?;
        let entries = [conflict.ancestor, conflict.our, conflict.their];
        let Some(path) = entries
            .iter()
            .flatten()
            .next()
            .map(|e| PathBuf::from(String::from_utf8_lossy(&e.path).into_owned()))
        else {
            continue;
        };
        let oids = entries.map(|e| e.map(|e| e.id));
        conflicts.insert(path, oids);
    }
    Ok(conflicts)
}

/// `<short id> <summary>` of the first ref in `refs` that resolves.
fn revision_label(repo: &Repository, refs: &[&str]) -> Option<String> {
    for name in refs {
        let commit = match repo.revparse_single(name).and_then(|o| o.peel_to_commit()) {
            Ok(commit) => commit,
            Err(_) => continue,
        };
        let id = commit.id().to_string();
        let short = id.get(..7).unwrap_or(&id);
        return Some(match commit.summary() {
            Some(summary) if !summary.is_empty() => format!("{short} {summary}"),
            _ => short.to_string(),
        });
    }
    debug!(refs = ?refs, "no revision found for conflict label");
    None
}
