//! Bounded parallel resolution of many conflicted paths.
//!
//! Each file runs on a tokio blocking thread, gated by a semaphore sized to
//! the worker count. Results come back to the calling task, which alone
//! owns the [`BatchReport`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use super::{resolve_file, ResolveOptions, Resolved};
use crate::errors::{ErrorClass, PipelineError};
use crate::git::RevisionSource;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation shared between the signal handler and the
/// batch. Checked before each file starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What happened to one file.
#[derive(Debug)]
pub enum FileOutcome {
    Resolved {
        resolved: Resolved,
        /// Conflict entries were cleared in the index.
        staged: bool,
    },
    Skipped(PipelineError),
    Failed(PipelineError),
    /// Never started because the run was cancelled or hit a fatal error.
    Cancelled,
}

#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

impl FileReport {
    fn from_result(path: PathBuf, result: Result<Resolved, PipelineError>) -> Self {
        let outcome = match result {
            Ok(resolved) => FileOutcome::Resolved {
                resolved,
                staged: false,
            },
            Err(e) if e.class() == ErrorClass::Skipped => FileOutcome::Skipped(e),
            Err(e) => FileOutcome::Failed(e),
        };
        Self { path, outcome }
    }

    /// Short status word for tables and progress output.
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            FileOutcome::Resolved { resolved, .. } if resolved.conflict_blocks > 0 => "annotated",
            FileOutcome::Resolved { .. } => "resolved",
            FileOutcome::Skipped(_) => "skipped",
            FileOutcome::Failed(_) => "failed",
            FileOutcome::Cancelled => "cancelled",
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per selected path, in selection order.
    pub files: Vec<FileReport>,
    /// Set when the run stopped on a fatal error.
    pub fatal: Option<String>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }

    pub fn resolved(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Resolved { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Cancelled))
    }

    pub fn staged(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Resolved { staged: true, .. }))
    }

    /// Every file was resolved or skipped and nothing fatal happened.
    pub fn is_success(&self) -> bool {
        self.fatal.is_none() && self.resolved() + self.skipped() == self.files.len()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Callback invoked by the collector as each file finishes.
pub type ProgressFn = Box<dyn Fn(&FileReport) + Send + Sync>;

/// Knobs for [`run_batch`].
#[derive(Default)]
pub struct BatchSettings {
    /// Maximum files in flight; 0 is treated as 1.
    pub workers: usize,
    pub cancel: CancelFlag,
    pub progress: Option<ProgressFn>,
}

/// Resolve `paths` with at most `settings.workers` files in flight.
///
/// Per-file failures are recorded and never stop siblings. A fatal error
/// stops scheduling; files not yet started are reported as cancelled.
/// Staging of resolved files happens once, after every worker finished.
pub async fn run_batch(
    source: Arc<dyn RevisionSource>,
    paths: Vec<PathBuf>,
    options: Arc<ResolveOptions>,
    settings: BatchSettings,
) -> BatchReport {
    let workers = settings.workers.max(1);
    info!(files = paths.len(), workers, "starting batch");

    let semaphore = Arc::new(Semaphore::new(workers));
    let halt = CancelFlag::new();
    let mut tasks = JoinSet::new();
    let mut collector = Collector {
        slots: Vec::with_capacity(paths.len()),
        fatal: None,
        progress: settings.progress,
    };

    let names = paths.clone();
    for (idx, path) in paths.into_iter().enumerate() {
        collector.slots.push(None);

        // Keep collecting finished files while waiting for a free worker.
        let permit = loop {
            tokio::select! {
                permit = semaphore.clone().acquire_owned() => break permit.ok(),
                Some(joined) = tasks.join_next() => collector.record(joined),
            }
        };
        let Some(permit) = permit else {
            collector.slots[idx] = Some(cancelled(path));
            continue;
        };
        if settings.cancel.is_cancelled() || halt.is_cancelled() {
            collector.slots[idx] = Some(cancelled(path));
            continue;
        }

        let source = Arc::clone(&source);
        let options = Arc::clone(&options);
        let halt = halt.clone();
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                resolve_file(source.as_ref(), &path, &options)
            }))
            .unwrap_or_else(|payload| {
                Err(PipelineError::WorkerPanicked {
                    path: path.clone(),
                    message: panic_message(payload.as_ref()),
                })
            });
            if let Err(e) = &result {
                if e.class() == ErrorClass::Fatal {
                    halt.cancel();
                }
            }
            (idx, FileReport::from_result(path, result))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        collector.record(joined);
    }

    // A slot is only empty if its task was lost; it still gets an entry.
    let mut report = BatchReport {
        files: collector
            .slots
            .into_iter()
            .zip(names)
            .map(|(slot, path)| slot.unwrap_or_else(|| cancelled(path)))
            .collect(),
        fatal: collector.fatal,
    };

    if options.stage_resolved && options.output.overwrite && report.fatal.is_none() {
        stage_clean_files(source, &mut report).await;
    }

    info!(
        resolved = report.resolved(),
        skipped = report.skipped(),
        failed = report.failed(),
        cancelled = report.cancelled(),
        staged = report.staged(),
        "batch finished"
    );
    report
}

/// Single owner of per-file results while the batch runs.
struct Collector {
    slots: Vec<Option<FileReport>>,
    fatal: Option<String>,
    progress: Option<ProgressFn>,
}

impl Collector {
    fn record(&mut self, joined: Result<(usize, FileReport), JoinError>) {
        match joined {
            Ok((idx, file)) => {
                log_outcome(&file);
                if let FileOutcome::Failed(e) = &file.outcome {
                    if e.class() == ErrorClass::Fatal && self.fatal.is_none() {
                        self.fatal = Some(e.to_string());
                    }
                }
                if let Some(progress) = &self.progress {
                    progress(&file);
                }
                self.slots[idx] = Some(file);
            }
            Err(e) => {
                error!(error = %e, "worker task failed");
                if self.fatal.is_none() {
                    self.fatal = Some(format!("worker task failed: {e}"));
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn cancelled(path: PathBuf) -> FileReport {
    FileReport {
        path,
        outcome: FileOutcome::Cancelled,
    }
}

fn log_outcome(file: &FileReport) {
    match &file.outcome {
        FileOutcome::Resolved { resolved, .. } => info!(
            path = %file.path.display(),
            written = %resolved.written.display(),
            conflict_blocks = resolved.conflict_blocks,
            "file resolved"
        ),
        FileOutcome::Skipped(e) => info!(path = %file.path.display(), reason = %e, "file skipped"),
        FileOutcome::Failed(e) => warn!(
            path = %file.path.display(),
            kind = e.label(),
            error = %e,
            "file failed"
        ),
        FileOutcome::Cancelled => {}
    }
}

/// Mark in-place results without conflict blocks as resolved in the index.
async fn stage_clean_files(source: Arc<dyn RevisionSource>, report: &mut BatchReport) {
    let clean: Vec<PathBuf> = report
        .files
        .iter()
        .filter(|f| {
            matches!(&f.outcome, FileOutcome::Resolved { resolved, .. }
                if resolved.in_place && resolved.conflict_blocks == 0)
        })
        .map(|f| f.path.clone())
        .collect();
    if clean.is_empty() {
        return;
    }

    let to_stage = clean.clone();
    let result = tokio::task::spawn_blocking(move || source.mark_resolved(&to_stage)).await;
    match result {
        Ok(Ok(())) => {
            for file in &mut report.files {
                if let FileOutcome::Resolved { staged, .. } = &mut file.outcome {
                    if clean.contains(&file.path) {
                        *staged = true;
                    }
                }
            }
        }
        Ok(Err(e)) => {
            let e = PipelineError::from(e);
            error!(error = %e, "failed to stage resolved files");
            report.fatal = Some(e.to_string());
        }
        Err(e) => {
            error!(error = %e, "staging task failed");
            report.fatal = Some(format!("staging task failed: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LocateError;
    use crate::git::{InMemoryRevisions, RevisionSet, Stage};
    use std::path::Path;
    use crate::notebook::{Cell, Document};
    use crate::writer::{to_canonical_bytes, OutputTarget};
    use std::sync::atomic::AtomicUsize;

    fn notebook(cells: Vec<Cell>) -> Vec<u8> {
        let mut doc = Document::empty();
        doc.cells = cells;
        to_canonical_bytes(&doc).unwrap()
    }

    fn conflict(path: &str, ours: &str, theirs: &str) -> RevisionSet {
        RevisionSet::new(path)
            .with_stage(Stage::Ours, notebook(vec![Cell::markdown(ours)]))
            .with_stage(Stage::Theirs, notebook(vec![Cell::markdown(theirs)]))
    }

    fn in_place() -> Arc<ResolveOptions> {
        Arc::new(ResolveOptions {
            output: OutputTarget::in_place(),
            stage_resolved: true,
            ..ResolveOptions::default()
        })
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(InMemoryRevisions::new(dir.path()));
        source.insert(conflict("a.ipynb", "x", "y"));
        source.insert(
            RevisionSet::new("b.ipynb")
                .with_stage(Stage::Ours, notebook(vec![]))
                .with_stage(Stage::Theirs, b"[".to_vec()),
        );

        let paths = vec![PathBuf::from("a.ipynb"), PathBuf::from("b.ipynb"), PathBuf::from("c.ipynb")];
        let report = run_batch(
            source,
            paths,
            Arc::new(ResolveOptions::default()),
            BatchSettings {
                workers: 2,
                ..BatchSettings::default()
            },
        )
        .await;

        assert_eq!(report.files.len(), 3);
        assert_eq!(report.files[0].status(), "annotated");
        assert_eq!(report.files[1].status(), "failed");
        assert_eq!(report.files[2].status(), "skipped");
        assert_eq!((report.resolved(), report.failed(), report.skipped()), (1, 1, 1));
        assert!(!report.is_success());
        assert!(report.fatal.is_none());
    }

    #[tokio::test]
    async fn test_clean_in_place_results_are_staged() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(InMemoryRevisions::new(dir.path()));
        let same = Cell::markdown("same");
        source.insert(
            RevisionSet::new("clean.ipynb")
                .with_stage(Stage::Ours, notebook(vec![same.clone()]))
                .with_stage(Stage::Theirs, notebook(vec![same])),
        );
        source.insert(conflict("dirty.ipynb", "x", "y"));

        let report = run_batch(
            source.clone(),
            vec![PathBuf::from("clean.ipynb"), PathBuf::from("dirty.ipynb")],
            in_place(),
            BatchSettings::default(),
        )
        .await;

        assert!(report.is_success());
        assert_eq!(report.staged(), 1);
        assert_eq!(source.resolved(), vec![PathBuf::from("clean.ipynb")]);
        assert!(dir.path().join("clean.ipynb").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(InMemoryRevisions::new(dir.path()));
        source.insert(conflict("a.ipynb", "x", "y"));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = run_batch(
            source,
            vec![PathBuf::from("a.ipynb")],
            Arc::new(ResolveOptions::default()),
            BatchSettings {
                cancel,
                ..BatchSettings::default()
            },
        )
        .await;
        assert_eq!(report.cancelled(), 1);
        assert!(!report.is_success());
        assert!(!dir.path().join("a_resolved.ipynb").exists());
    }

    #[tokio::test]
    async fn test_unavailable_repository_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(InMemoryRevisions::new(dir.path()));
        source.insert(conflict("a.ipynb", "x", "y"));
        source.insert(conflict("b.ipynb", "x", "y"));
        source.set_unavailable(true);

        let report = run_batch(
            source,
            vec![PathBuf::from("a.ipynb"), PathBuf::from("b.ipynb")],
            Arc::new(ResolveOptions::default()),
            BatchSettings {
                workers: 1,
                ..BatchSettings::default()
            },
        )
        .await;
        assert!(report.fatal.is_some());
        assert!(!report.is_success());
        assert_eq!(report.failed(), 1);
        assert_eq!(report.cancelled(), 1);
    }

    /// Delegates to an in-memory source but panics on one path.
    struct PanicsOn {
        inner: InMemoryRevisions,
        path: PathBuf,
    }

    impl RevisionSource for PanicsOn {
        fn conflicted_paths(&self) -> Result<Vec<PathBuf>, LocateError> {
            self.inner.conflicted_paths()
        }

        fn conflict_stages(&self, path: &Path) -> Result<RevisionSet, LocateError> {
            if path == self.path {
                panic!("corrupt object store");
            }
            self.inner.conflict_stages(path)
        }

        fn mark_resolved(&self, paths: &[PathBuf]) -> Result<(), LocateError> {
            self.inner.mark_resolved(paths)
        }

        fn workdir(&self) -> &Path {
            self.inner.workdir()
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_keeps_its_entry() {
        let dir = tempfile::tempdir().unwrap();
        let inner = InMemoryRevisions::new(dir.path());
        inner.insert(conflict("a.ipynb", "x", "y"));
        inner.insert(conflict("boom.ipynb", "x", "y"));
        inner.insert(conflict("c.ipynb", "x", "z"));
        let source = Arc::new(PanicsOn {
            inner,
            path: PathBuf::from("boom.ipynb"),
        });

        let paths = vec![
            PathBuf::from("a.ipynb"),
            PathBuf::from("boom.ipynb"),
            PathBuf::from("c.ipynb"),
        ];
        let report = run_batch(
            source,
            paths.clone(),
            Arc::new(ResolveOptions::default()),
            BatchSettings {
                workers: 2,
                ..BatchSettings::default()
            },
        )
        .await;

        assert_eq!(report.files.iter().map(|f| f.path.clone()).collect::<Vec<_>>(), paths);
        assert!(matches!(
            &report.files[1].outcome,
            FileOutcome::Failed(PipelineError::WorkerPanicked { message, .. })
                if message == "corrupt object store"
        ));
        assert_eq!((report.resolved(), report.failed()), (2, 1));
        assert!(report.fatal.is_none());
    }

    #[tokio::test]
    async fn test_progress_called_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(InMemoryRevisions::new(dir.path()));
        source.insert(conflict("a.ipynb", "x", "y"));
        source.insert(conflict("b.ipynb", "x", "z"));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let report = run_batch(
            source,
            vec![PathBuf::from("a.ipynb"), PathBuf::from("b.ipynb")],
            Arc::new(ResolveOptions::default()),
            BatchSettings {
                workers: 4,
                progress: Some(Box::new(move |_: &FileReport| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
                ..BatchSettings::default()
            },
        )
        .await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(report.resolved(), 2);
    }
}
