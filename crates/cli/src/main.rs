//! nbmerge command-line tool.
//!
//! Resolves git merge conflicts in notebooks at cell granularity, shows
//! structural diffs between notebook revisions, and generates / validates
//! configuration files.

mod diff;
mod fix;
mod signals;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nbmerge_core::config::{find_config_file, user_config_file, NbmergeConfig};
use nbmerge_core::git::discover_workdir;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// nbmerge command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "nbmerge",
    version,
    about = "Resolve git merge conflicts in notebooks cell by cell"
)]
struct Cli {
    /// Path to the TOML configuration file (discovered when omitted).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory inside the repository to work in.
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    repo: PathBuf,

    /// Debug logging and per-file detail.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve conflicted notebooks in the repository.
    Fix(fix::FixArgs),

    /// Show a cell-level diff between two notebooks or two conflict revisions.
    Diff(diff::DiffArgs),

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./nbmerge.toml")]
        output: PathBuf,

        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Init and validate report configuration problems themselves.
    let config = match cli.command {
        Commands::Init { .. } | Commands::Validate => Ok(NbmergeConfig::default()),
        _ => load_config(cli.config.as_deref(), &cli.repo),
    };
    let log_level = config
        .as_ref()
        .map(|c| c.logging.log_level.clone())
        .unwrap_or_else(|_| "warn".into());
    init_logging(cli.verbose, &log_level);

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins, then `--verbose`, then the configured level.
fn init_logging(verbose: bool, configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { configured })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli, config: NbmergeConfig) -> Result<()> {
    match cli.command {
        Commands::Fix(args) => fix::run_fix(args, config, &cli.repo, cli.verbose).await,
        Commands::Diff(args) => diff::run_diff(args, &config, &cli.repo),
        Commands::Init { output, force } => cmd_init(&output, force),
        Commands::Validate => cmd_validate(cli.config.as_deref(), &cli.repo),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(explicit: Option<&Path>, repo_dir: &Path) -> Result<NbmergeConfig> {
    if let Some(path) = explicit {
        let config =
            NbmergeConfig::load_from_file(path).context("failed to load configuration file")?;
        config.validate().context("invalid configuration")?;
        return Ok(config);
    }

    let start = search_start(repo_dir);
    let stop = discover_workdir(&start);
    let (config, _) = NbmergeConfig::discover(&start, stop.as_deref())
        .context("failed to load configuration file")?;
    Ok(config)
}

fn search_start(repo_dir: &Path) -> PathBuf {
    repo_dir
        .canonicalize()
        .unwrap_or_else(|_| repo_dir.to_path_buf())
}

/// Convert a path given on the command line into a work-tree relative path.
///
/// Paths that do not exist (glob patterns) are joined onto the current
/// directory without being canonicalized.
pub(crate) fn workdir_relative(path: &Path, workdir: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let absolute = cwd.join(path);
    let absolute = absolute.canonicalize().unwrap_or(absolute);
    let root = workdir
        .canonicalize()
        .unwrap_or_else(|_| workdir.to_path_buf());

    match absolute.strip_prefix(&root) {
        Ok(relative) => Ok(relative.to_path_buf()),
        Err(_) => anyhow::bail!(
            "{} is outside the repository at {}",
            path.display(),
            workdir.display()
        ),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "file already exists: {}. Use a different path or pass --force.",
            output.display()
        );
    }

    std::fs::write(output, NbmergeConfig::default_template())
        .context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the policies under [resolve] and the globs under [paths]");
    println!(
        "  2. Validate with: nbmerge validate --config {}",
        output.display()
    );
    println!("  3. During a merge, run: nbmerge fix");

    Ok(())
}

fn cmd_validate(explicit: Option<&Path>, repo_dir: &Path) -> Result<()> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let start = search_start(repo_dir);
            let stop = discover_workdir(&start);
            find_config_file(&start, stop.as_deref(), user_config_file())
        }
    };

    let config = match &path {
        Some(path) => {
            println!("Validating configuration: {}", path.display());
            println!();
            let config =
                NbmergeConfig::load_from_file(path).context("failed to parse configuration")?;
            println!("  [OK] TOML structure is valid");
            config
        }
        None => {
            println!("No configuration file found");
            println!();
            println!("  [OK] Built-in defaults apply");
            NbmergeConfig::default()
        }
    };

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let output = config.output_target();
    println!();
    println!("Configuration summary:");
    println!("  Cell policy     : {}", config.resolve.cells);
    println!("  Metadata from   : {}", config.resolve.metadata);
    println!("  Ignored fields  : {}", list_or(&config.resolve.ignore_fields, "(none)"));
    println!("  Include         : {}", list_or(&config.paths.include, "(all conflicted notebooks)"));
    println!("  Exclude         : {}", list_or(&config.paths.exclude, "(none)"));
    println!(
        "  Output          : {}",
        if output.overwrite {
            "in place".to_string()
        } else {
            output.destination(Path::new("NAME.ipynb")).display().to_string()
        }
    );
    println!(
        "  Stage resolved  : {}",
        if config.output.stage_resolved { "yes" } else { "no" }
    );
    println!("  Workers         : {}", config.workers());
    println!("  Log level       : {}", config.logging.log_level);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn list_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_workdir_relative() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("nb")).unwrap();

        let inside = workdir_relative(&root.join("nb"), &root).unwrap();
        assert_eq!(inside, PathBuf::from("nb"));

        let glob = workdir_relative(&root.join("nb/*.ipynb"), &root).unwrap();
        assert_eq!(glob, PathBuf::from("nb/*.ipynb"));

        assert!(workdir_relative(Path::new("/"), &root).is_err());
    }

    #[test]
    fn test_init_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nbmerge.toml");

        cmd_init(&path, false).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, NbmergeConfig::default_template());

        assert!(cmd_init(&path, false).is_err());
        cmd_init(&path, true).unwrap();
    }
}
