//! `nbmerge fix`: resolve every selected conflicted notebook.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use nbmerge_core::config::NbmergeConfig;
use nbmerge_core::pipeline::ProgressFn;
use nbmerge_core::{
    run_batch, BatchReport, BatchSettings, CellPolicy, FileOutcome, FileReport, GitRepository,
    MetadataSide, PathSelector, ResolveOptions, RevisionSource,
};

use crate::{signals, style, workdir_relative};

#[derive(Args, Debug)]
pub struct FixArgs {
    /// Notebooks, directories or globs to resolve (default: every conflicted notebook).
    paths: Vec<PathBuf>,

    /// Glob of paths to leave alone; may be repeated.
    #[arg(long = "ignore", value_name = "GLOB")]
    ignore: Vec<String>,

    /// How differing cells are settled: ours, theirs or annotate.
    #[arg(long, value_name = "POLICY")]
    cells: Option<CellPolicy>,

    /// Side whose notebook metadata is kept: ours or theirs.
    #[arg(long, value_name = "SIDE")]
    metadata: Option<MetadataSide>,

    /// Cell field or metadata key ignored when matching cells; may be repeated.
    #[arg(long = "ignore-field", value_name = "NAME")]
    ignore_fields: Vec<String>,

    /// Replace the conflicted files instead of writing alongside them.
    #[arg(long, conflicts_with_all = ["prefix", "suffix"])]
    in_place: bool,

    /// Prefix for the output file name.
    #[arg(long)]
    prefix: Option<String>,

    /// Suffix for the output file name, before the extension.
    #[arg(long)]
    suffix: Option<String>,

    /// Overwrite without asking.
    #[arg(short, long)]
    yes: bool,

    /// Leave conflict-free results unstaged.
    #[arg(long)]
    no_stage: bool,

    /// Files resolved concurrently (0 = number of cores).
    #[arg(short, long)]
    workers: Option<usize>,
}

impl FixArgs {
    /// Layer the command-line flags over the loaded configuration.
    fn apply(&self, config: &mut NbmergeConfig) {
        if let Some(cells) = self.cells {
            config.resolve.cells = cells;
        }
        if let Some(metadata) = self.metadata {
            config.resolve.metadata = metadata;
        }
        if !self.ignore_fields.is_empty() {
            config.resolve.ignore_fields = self.ignore_fields.clone();
        }
        config.paths.exclude.extend(self.ignore.iter().cloned());

        if self.in_place {
            config.output.overwrite = true;
        }
        if let Some(prefix) = &self.prefix {
            config.output.overwrite = false;
            config.output.prefix = prefix.clone();
        }
        if let Some(suffix) = &self.suffix {
            config.output.overwrite = false;
            config.output.suffix = suffix.clone();
        }
        if self.no_stage {
            config.output.stage_resolved = false;
        }
        if let Some(workers) = self.workers {
            config.batch.workers = workers;
        }
    }
}

pub async fn run_fix(
    args: FixArgs,
    mut config: NbmergeConfig,
    repo_dir: &Path,
    verbose: bool,
) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid options")?;

    let repo = GitRepository::discover(repo_dir).context("failed to open git repository")?;
    let workdir = repo.workdir().to_path_buf();

    // Paths on the command line replace the configured include globs.
    let include = if args.paths.is_empty() {
        config.paths.include.clone()
    } else {
        args.paths
            .iter()
            .map(|p| workdir_relative(p, &workdir).map(|r| r.to_string_lossy().into_owned()))
            .collect::<Result<Vec<_>>>()?
    };
    let selector = PathSelector::new(&include, &config.paths.exclude, &workdir);

    let conflicted = repo
        .conflicted_paths()
        .context("failed to read conflicts from the index")?;
    if conflicted.is_empty() {
        anyhow::bail!("no conflicts found");
    }
    let selected = selector.select(&conflicted);
    if selected.is_empty() {
        anyhow::bail!(
            "no conflicts found in the selected notebooks ({} conflicted path(s) in the index)",
            conflicted.len()
        );
    }

    let options = ResolveOptions::from_config(&config);

    println!();
    println!(
        "{}",
        style::header(&format!("Resolving {} conflicted notebook(s)", selected.len()))
    );
    println!(
        "{}",
        style::dim(&format!(
            "  ours: {}  |  theirs: {}",
            repo.labels().ours,
            repo.labels().theirs
        ))
    );
    println!();

    if options.output.overwrite && !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Overwrite {} notebook(s) in place?",
                selected.len()
            ))
            .default(false)
            .interact()
            .context("failed to read confirmation (pass --yes to skip it)")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let bar = ProgressBar::new(selected.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );
    let progress = progress_callback(bar.clone(), verbose);

    let settings = BatchSettings {
        workers: config.workers(),
        cancel: signals::cancel_on_signal(),
        progress: Some(progress),
    };
    info!(files = selected.len(), workers = settings.workers, "resolving");

    let source: Arc<dyn RevisionSource> = Arc::new(repo);
    let report = run_batch(source, selected, Arc::new(options), settings).await;
    bar.finish_and_clear();

    print_report(&report, verbose);

    if let Some(fatal) = &report.fatal {
        anyhow::bail!("aborted: {}", fatal);
    }
    if !report.is_success() {
        anyhow::bail!(
            "{} of {} notebook(s) were not resolved",
            report.failed() + report.cancelled(),
            report.files.len()
        );
    }
    Ok(())
}

fn progress_callback(bar: ProgressBar, verbose: bool) -> ProgressFn {
    Box::new(move |report: &FileReport| {
        if verbose {
            bar.println(format!("{:>10} {}", report.status(), report.path.display()));
        }
        bar.set_message(report.path.display().to_string());
        bar.inc(1);
    })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_report(report: &BatchReport, verbose: bool) {
    if verbose {
        print_table(report);
    }

    for file in &report.files {
        let path = file.path.display();
        match &file.outcome {
            FileOutcome::Resolved { resolved, .. } if resolved.conflict_blocks > 0 => {
                println!(
                    "{}",
                    style::warn(&format!(
                        "{}: {} conflict block(s) left in {}",
                        path,
                        resolved.conflict_blocks,
                        resolved.written.display()
                    ))
                );
            }
            FileOutcome::Failed(e) => {
                println!("{}", style::error(&format!("{}: {}", path, e)));
            }
            FileOutcome::Skipped(e) if verbose => {
                println!("{}", style::dim(&format!("{}: skipped, {}", path, e)));
            }
            _ => {}
        }
    }

    if report.cancelled() > 0 {
        println!(
            "{}",
            style::warn(&format!("{} notebook(s) were not started", report.cancelled()))
        );
    }

    println!();
    println!("{}", style::header("Summary"));
    println!("  Resolved  : {}", report.resolved());
    println!("  Staged    : {}", report.staged());
    println!("  Skipped   : {}", report.skipped());
    println!("  Failed    : {}", report.failed());
    println!("  Cancelled : {}", report.cancelled());
    println!();

    if report.is_success() {
        println!("{}", style::success("All selected notebooks processed"));
        println!();
    }
}

fn print_table(report: &BatchReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["File", "Status", "Output", "Blocks", "Detail"]);

    for file in &report.files {
        let (output, blocks, detail) = match &file.outcome {
            FileOutcome::Resolved { resolved, staged } => (
                resolved.written.display().to_string(),
                resolved.conflict_blocks.to_string(),
                if *staged { "staged".to_string() } else { String::new() },
            ),
            FileOutcome::Skipped(e) | FileOutcome::Failed(e) => {
                ("—".to_string(), "—".to_string(), e.to_string())
            }
            FileOutcome::Cancelled => ("—".to_string(), "—".to_string(), String::new()),
        };
        table.add_row(vec![
            Cell::new(file.path.display()),
            Cell::new(file.status()),
            Cell::new(&output),
            Cell::new(&blocks),
            Cell::new(&detail),
        ]);
    }

    println!("{}", table);
    println!();
}
