//! Choosing which conflicted paths to resolve.

use std::path::{Path, PathBuf};

use glob_match::glob_match;
use tracing::debug;

const NOTEBOOK_EXTENSION: &str = "ipynb";

/// Include/exclude globs over work-tree relative paths.
#[derive(Debug, Clone, Default)]
pub struct PathSelector {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl PathSelector {
    /// Build a selector. Include entries naming a directory under `workdir`
    /// expand to every path below it.
    pub fn new(include: &[String], exclude: &[String], workdir: &Path) -> Self {
        let include = include
            .iter()
            .map(|p| {
                let p = normalize_pattern(p);
                if p.is_empty() || p == "." {
                    // The work-tree root itself.
                    "**".to_string()
                } else if workdir.join(&p).is_dir() {
                    format!("{p}/**")
                } else {
                    p
                }
            })
            .collect();
        let exclude = exclude.iter().map(|p| normalize_pattern(p)).collect();
        Self { include, exclude }
    }

    pub fn matches(&self, path: &Path) -> bool {
        if path.extension().and_then(|e| e.to_str()) != Some(NOTEBOOK_EXTENSION) {
            return false;
        }
        let path = to_slash(path);
        let included = self.include.is_empty() || self.include.iter().any(|p| glob_match(p, &path));
        let excluded = self.exclude.iter().any(|p| glob_match(p, &path));
        included && !excluded
    }

    /// Filter `conflicted` down to the selected notebooks, keeping order.
    pub fn select(&self, conflicted: &[PathBuf]) -> Vec<PathBuf> {
        let selected: Vec<PathBuf> = conflicted.iter().filter(|p| self.matches(p)).cloned().collect();
        debug!(
            conflicted = conflicted.len(),
            selected = selected.len(),
            "selected conflicted notebooks"
        );
        selected
    }
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn normalize_pattern(pattern: &str) -> String {
    let p = pattern.trim().replace('\\', "/");
    let p = p.strip_prefix("./").unwrap_or(&p);
    p.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_root_directory_selects_everything() {
        let selector = PathSelector::new(&[".".into()], &[], Path::new("/nonexistent"));
        let got = selector.select(&paths(&["a.ipynb", "x/b.ipynb"]));
        assert_eq!(got, paths(&["a.ipynb", "x/b.ipynb"]));
    }

    #[test]
    fn test_default_selects_every_notebook() {
        let selector = PathSelector::default();
        let got = selector.select(&paths(&["a.ipynb", "src/lib.rs", "x/b.ipynb"]));
        assert_eq!(got, paths(&["a.ipynb", "x/b.ipynb"]));
    }

    #[test]
    fn test_include_and_exclude() {
        let selector = PathSelector::new(
            &["analysis/**".into()],
            &["**/scratch/**".into()],
            Path::new("/nonexistent"),
        );
        let got = selector.select(&paths(&[
            "analysis/a.ipynb",
            "analysis/scratch/b.ipynb",
            "other/c.ipynb",
        ]));
        assert_eq!(got, paths(&["analysis/a.ipynb"]));
    }

    #[test]
    fn test_directory_argument_expands() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nbs")).unwrap();
        let selector = PathSelector::new(&["./nbs/".into()], &[], dir.path());
        assert!(selector.matches(Path::new("nbs/deep/x.ipynb")));
        assert!(!selector.matches(Path::new("other/x.ipynb")));
    }

    #[test]
    fn test_exact_file_argument() {
        let selector = PathSelector::new(&["nb.ipynb".into()], &[], Path::new("/nonexistent"));
        assert!(selector.matches(Path::new("nb.ipynb")));
        assert!(!selector.matches(Path::new("nb2.ipynb")));
    }
}
