//! TOML-based configuration for nbmerge.
//!
//! Every section is optional; a missing file behaves exactly like an empty
//! one. Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diff::{EquivalenceConfig, DEFAULT_IGNORED_FIELDS};
use crate::errors::ConfigError;
use crate::merge::{CellPolicy, MetadataSide};
use crate::writer::OutputTarget;

/// File name searched for in the work tree.
pub const CONFIG_FILE_NAME: &str = "nbmerge.toml";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from `nbmerge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NbmergeConfig {
    /// Merge policies.
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Which conflicted paths to process.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Where merged notebooks are written.
    #[serde(default)]
    pub output: OutputConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Resolve
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveConfig {
    /// `ours`, `theirs` or `annotate` (default).
    #[serde(default)]
    pub cells: CellPolicy,

    /// Side whose notebook metadata is kept (default `ours`).
    #[serde(default)]
    pub metadata: MetadataSide,

    /// Cell fields and metadata keys ignored when matching cells.
    #[serde(default = "default_ignore_fields")]
    pub ignore_fields: Vec<String>,
}

fn default_ignore_fields() -> Vec<String> {
    DEFAULT_IGNORED_FIELDS.iter().map(|s| s.to_string()).collect()
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            cells: CellPolicy::default(),
            metadata: MetadataSide::default(),
            ignore_fields: default_ignore_fields(),
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Globs relative to the work tree; empty means every conflicted notebook.
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Replace conflicted files in place.
    #[serde(default)]
    pub overwrite: bool,

    #[serde(default)]
    pub prefix: String,

    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// Stage conflict-free in-place results in the index.
    #[serde(default = "default_true")]
    pub stage_resolved: bool,
}

fn default_suffix() -> String {
    "_resolved".into()
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            overwrite: false,
            prefix: String::new(),
            suffix: default_suffix(),
            stage_resolved: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Batch & logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Worker count; 0 uses the number of available cores.
    #[serde(default)]
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl NbmergeConfig {
    /// Load an [`NbmergeConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: NbmergeConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Find and load the configuration that applies to `start`.
    ///
    /// Looks for `nbmerge.toml` in `start` and each parent up to and
    /// including `stop` (the work-tree root), then the user config file.
    /// Returns defaults and `None` when nothing is found.
    pub fn discover(start: &Path, stop: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match find_config_file(start, stop, user_config_file()) {
            Some(path) => {
                let config = Self::load_from_file(&path)?;
                config.validate()?;
                Ok((config, Some(path)))
            }
            None => {
                debug!("no configuration file found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolve.ignore_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "resolve.ignore_fields".into(),
                detail: "field names must not be empty".into(),
            });
        }
        for (field, patterns) in [
            ("paths.include", &self.paths.include),
            ("paths.exclude", &self.paths.exclude),
        ] {
            if patterns.iter().any(|p| p.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "glob patterns must not be empty".into(),
                });
            }
        }
        for (field, value) in [
            ("output.prefix", &self.output.prefix),
            ("output.suffix", &self.output.suffix),
        ] {
            if value.contains('/') || value.contains('\\') {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "must not contain path separators".into(),
                });
            }
        }
        if !self.output.overwrite && self.output.prefix.is_empty() && self.output.suffix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output.suffix".into(),
                detail: "prefix and suffix are both empty while overwrite is false, \
                         so output would replace the source"
                    .into(),
            });
        }
        if !LOG_LEVELS.contains(&self.logging.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.log_level".into(),
                detail: format!(
                    "'{}' is not one of {}",
                    self.logging.log_level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        Ok(())
    }

    pub fn equivalence(&self) -> EquivalenceConfig {
        EquivalenceConfig::ignoring(self.resolve.ignore_fields.iter().cloned())
    }

    pub fn output_target(&self) -> OutputTarget {
        OutputTarget {
            overwrite: self.output.overwrite,
            prefix: self.output.prefix.clone(),
            suffix: self.output.suffix.clone(),
        }
    }

    /// Configured worker count, with 0 resolved to the available cores.
    pub fn workers(&self) -> usize {
        match self.batch.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# nbmerge configuration
# Place this file at the root of your repository as nbmerge.toml.

[resolve]
# How to resolve disagreeing cells: "annotate", "ours" or "theirs".
cells = "annotate"
# Whose notebook metadata to keep: "ours" or "theirs".
metadata = "ours"
# Fields ignored when deciding whether two cells are the same.
ignore_fields = ["id", "execution_count"]

[paths]
# include = ["notebooks/**"]   # default: every conflicted notebook
# exclude = ["**/scratch/**"]

[output]
# Replace the conflicted file instead of writing {prefix}{stem}{suffix}.ipynb.
overwrite = false
prefix = ""
suffix = "_resolved"
# Stage conflict-free in-place results, like `git add`.
stage_resolved = true

[batch]
workers = 0          # 0 = number of cores

[logging]
log_level = "warn"   # RUST_LOG and --verbose take precedence
"#
    }
}

/// Per-user fallback, e.g. `~/.config/nbmerge/config.toml` on Linux.
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nbmerge").join("config.toml"))
}

/// Nearest `nbmerge.toml` from `start` upward, stopping at `stop`, else
/// `user` if that file exists.
pub fn find_config_file(start: &Path, stop: Option<&Path>, user: Option<PathBuf>) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "found configuration file");
            return Some(candidate);
        }
        if stop.is_some_and(|s| s == dir) {
            break;
        }
    }
    user.filter(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[resolve]
cells = "theirs"
metadata = "theirs"
ignore_fields = ["id", "execution_count", "outputs"]

[paths]
include = ["analysis/**"]
exclude = ["**/scratch/**"]

[output]
overwrite = true
stage_resolved = false

[batch]
workers = 3

[logging]
log_level = "debug"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: NbmergeConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.resolve.cells, CellPolicy::KeepTheirs);
        assert_eq!(config.resolve.metadata, MetadataSide::Theirs);
        assert!(config.equivalence().ignores("outputs"));
        assert_eq!(config.paths.include, vec!["analysis/**"]);
        assert!(config.output.overwrite);
        assert!(!config.output.stage_resolved);
        assert_eq!(config.workers(), 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config: NbmergeConfig = toml::from_str("").unwrap();
        assert_eq!(config, NbmergeConfig::default());
        assert_eq!(config.resolve.cells, CellPolicy::Annotate);
        assert_eq!(config.resolve.metadata, MetadataSide::Ours);
        assert_eq!(config.resolve.ignore_fields, vec!["id", "execution_count"]);
        assert_eq!(config.output.suffix, "_resolved");
        assert!(config.output.stage_resolved);
        assert_eq!(config.logging.log_level, "warn");
        assert!(config.workers() >= 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = NbmergeConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.logging.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = NbmergeConfig::load_from_file("/nonexistent/nbmerge.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[output]\noverwrit = true\n").unwrap();
        let result = NbmergeConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_rejects_empty_ignore_field() {
        let mut config = NbmergeConfig::default();
        config.resolve.ignore_fields.push(String::new());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "resolve.ignore_fields"
        ));
    }

    #[test]
    fn test_validate_rejects_output_equal_to_source() {
        let mut config = NbmergeConfig::default();
        config.output.suffix = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "output.suffix"
        ));
        config.output.overwrite = true;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = NbmergeConfig::default();
        config.logging.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_find_config_walks_up_to_stop() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_config_file(&nested, Some(root.path()), None), None);

        let path = root.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "").unwrap();
        assert_eq!(find_config_file(&nested, Some(root.path()), None), Some(path));
    }

    #[test]
    fn test_find_config_falls_back_to_user_file() {
        let root = tempfile::tempdir().unwrap();
        let user = root.path().join("user.toml");
        std::fs::write(&user, "").unwrap();
        let work = root.path().join("work");
        std::fs::create_dir(&work).unwrap();
        assert_eq!(
            find_config_file(&work, Some(&work), Some(user.clone())),
            Some(user)
        );
    }

    #[test]
    fn test_default_template_is_valid() {
        let config: NbmergeConfig = toml::from_str(NbmergeConfig::default_template())
            .expect("default template should be valid TOML");
        config.validate().unwrap();
        assert_eq!(config, NbmergeConfig::default());
    }
}
