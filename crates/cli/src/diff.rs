//! `nbmerge diff`: cell-level diff of two notebooks or two conflict revisions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use nbmerge_core::config::NbmergeConfig;
use nbmerge_core::pipeline::diff_stages;
use nbmerge_core::render::render_lines;
use nbmerge_core::{diff, Document, EditScript, EquivalenceConfig, GitRepository, RevisionSource, Stage};

use crate::{style, workdir_relative};

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Two notebooks to compare: OLD NEW.
    #[arg(value_name = "NOTEBOOK")]
    files: Vec<PathBuf>,

    /// Compare two revisions of a conflicted notebook instead.
    #[arg(long, value_name = "PATH", conflicts_with = "files")]
    conflict: Option<PathBuf>,

    /// Revision to diff from with --conflict: base, ours or theirs.
    #[arg(long, default_value_t = Stage::Ours)]
    from: Stage,

    /// Revision to diff to with --conflict.
    #[arg(long, default_value_t = Stage::Theirs)]
    to: Stage,

    /// Cell field or metadata key ignored when matching cells; may be repeated.
    #[arg(long = "ignore-field", value_name = "NAME")]
    ignore_fields: Vec<String>,

    /// Print the edit script as JSON.
    #[arg(long)]
    json: bool,
}

struct Comparison {
    a: Document,
    b: Document,
    script: EditScript,
    a_label: String,
    b_label: String,
}

pub fn run_diff(args: DiffArgs, config: &NbmergeConfig, repo_dir: &Path) -> Result<()> {
    let equiv = if args.ignore_fields.is_empty() {
        config.equivalence()
    } else {
        EquivalenceConfig::ignoring(args.ignore_fields.iter().map(String::as_str))
    };

    let cmp = match &args.conflict {
        Some(path) => compare_revisions(path, args.from, args.to, &equiv, repo_dir)?,
        None => match args.files.as_slice() {
            [old, new] => compare_files(old, new, &equiv)?,
            _ => anyhow::bail!("expected two notebooks (OLD NEW) or --conflict PATH"),
        },
    };

    if args.json {
        let json = serde_json::to_string_pretty(&cmp.script).context("failed to serialize edit script")?;
        println!("{}", json);
        return Ok(());
    }

    for line in render_lines(&cmp.a.cells, &cmp.b.cells, &cmp.script, &cmp.a_label, &cmp.b_label) {
        println!("{}", style::diff_line(line.kind, &line.text));
    }
    if cmp.a.metadata != cmp.b.metadata {
        println!("{}", style::dim("  notebook metadata differs"));
    }
    Ok(())
}

fn compare_files(old: &Path, new: &Path, equiv: &EquivalenceConfig) -> Result<Comparison> {
    let a = read_notebook(old)?;
    let b = read_notebook(new)?;
    let script = diff(&a.cells, &b.cells, equiv);
    Ok(Comparison {
        a,
        b,
        script,
        a_label: old.display().to_string(),
        b_label: new.display().to_string(),
    })
}

fn read_notebook(path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Document::parse(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn compare_revisions(
    path: &Path,
    from: Stage,
    to: Stage,
    equiv: &EquivalenceConfig,
    repo_dir: &Path,
) -> Result<Comparison> {
    let repo = GitRepository::discover(repo_dir).context("failed to open git repository")?;
    let relative = workdir_relative(path, repo.workdir())?;
    let (a, b, script) = diff_stages(&repo, &relative, from, to, equiv)?;

    let label = |stage: Stage| match stage {
        Stage::Base => format!("{} (base)", relative.display()),
        Stage::Ours => format!("{} (ours: {})", relative.display(), repo.labels().ours),
        Stage::Theirs => format!("{} (theirs: {})", relative.display(), repo.labels().theirs),
    };
    Ok(Comparison {
        a_label: label(from),
        b_label: label(to),
        a,
        b,
        script,
    })
}
