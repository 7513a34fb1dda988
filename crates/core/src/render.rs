//! Plain-text rendering of cell edit scripts.
//!
//! Output is a list of typed lines so front-ends can style them; [`render`]
//! joins them into a string for plain output.

use crate::diff::{EditKind, EditScript};
use crate::notebook::Cell;

/// Role of a rendered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Header,
    Unchanged,
    Inserted,
    Deleted,
    /// A span header for replaced cells.
    Replaced,
    /// Line inside a unified diff of replaced sources.
    Patch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub kind: LineKind,
    pub text: String,
}

impl RenderedLine {
    fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Render `script` (from `a` to `b`) as typed lines.
pub fn render_lines(
    a: &[Cell],
    b: &[Cell],
    script: &EditScript,
    a_label: &str,
    b_label: &str,
) -> Vec<RenderedLine> {
    let mut lines = vec![
        RenderedLine::new(LineKind::Header, format!("--- {a_label}")),
        RenderedLine::new(LineKind::Header, format!("+++ {b_label}")),
    ];

    for op in script {
        match op.kind {
            EditKind::Equal => lines.push(RenderedLine::new(
                LineKind::Unchanged,
                format!("  {} unchanged cell(s) [{}..{}]", op.a.len(), op.a.start, op.a.end),
            )),
            EditKind::Insert => {
                for i in op.b.clone() {
                    lines.push(RenderedLine::new(LineKind::Inserted, format!("+ {}", summary(i, &b[i]))));
                }
            }
            EditKind::Delete => {
                for i in op.a.clone() {
                    lines.push(RenderedLine::new(LineKind::Deleted, format!("- {}", summary(i, &a[i]))));
                }
            }
            EditKind::Replace => {
                lines.push(RenderedLine::new(
                    LineKind::Replaced,
                    format!(
                        "~ cells [{}..{}] replaced by [{}..{}]",
                        op.a.start, op.a.end, op.b.start, op.b.end
                    ),
                ));
                let old = joined_sources(&a[op.a.clone()]);
                let new = joined_sources(&b[op.b.clone()]);
                let patch = diffy::create_patch(&old, &new).to_string();
                for line in patch.lines() {
                    lines.push(RenderedLine::new(LineKind::Patch, format!("    {line}")));
                }
            }
        }
    }

    if script.is_identity() {
        lines.push(RenderedLine::new(LineKind::Unchanged, "  (no cell changes)"));
    }
    lines
}

/// Render `script` as a single string.
pub fn render(a: &[Cell], b: &[Cell], script: &EditScript, a_label: &str, b_label: &str) -> String {
    let mut out = String::new();
    for line in render_lines(a, b, script, a_label, b_label) {
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

fn summary(index: usize, cell: &Cell) -> String {
    format!("[{index}] {}: {}", cell.kind(), cell.source().first_line())
}

fn joined_sources(cells: &[Cell]) -> String {
    let mut out = String::new();
    for cell in cells {
        out.push_str(&format!("# [{}]\n", cell.kind()));
        let text = cell.source().text();
        out.push_str(&text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{diff, EquivalenceConfig};

    #[test]
    fn test_render_insert_delete_and_replace() {
        let a = vec![Cell::markdown("intro"), Cell::code("x = 1"), Cell::markdown("gone")];
        let b = vec![Cell::markdown("intro"), Cell::code("x = 2"), Cell::markdown("gone"), Cell::raw("new")];
        let script = diff(&a, &b, &EquivalenceConfig::default());
        let text = render(&a, &b, &script, "old.ipynb", "new.ipynb");

        assert!(text.starts_with("--- old.ipynb\n+++ new.ipynb\n"));
        assert!(text.contains("~ cells [1..2] replaced by [1..2]"));
        assert!(text.contains("-x = 1"));
        assert!(text.contains("+x = 2"));
        assert!(text.contains("+ [3] raw: new"));
    }

    #[test]
    fn test_render_identical() {
        let a = vec![Cell::markdown("same")];
        let script = diff(&a, &a, &EquivalenceConfig::default());
        let lines = render_lines(&a, &a, &script, "a", "b");
        assert!(lines.iter().all(|l| l.kind != LineKind::Inserted && l.kind != LineKind::Deleted));
        assert_eq!(lines.last().map(|l| l.text.as_str()), Some("  (no cell changes)"));
    }

    #[test]
    fn test_render_delete_lists_cells() {
        let a = vec![Cell::markdown("keep"), Cell::code("drop()\nmore")];
        let b = vec![Cell::markdown("keep")];
        let script = diff(&a, &b, &EquivalenceConfig::default());
        let lines = render_lines(&a, &b, &script, "a", "b");
        assert!(lines
            .iter()
            .any(|l| l.kind == LineKind::Deleted && l.text == "- [1] code: drop()"));
    }
}
