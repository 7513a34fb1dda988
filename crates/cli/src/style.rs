//! Shared styling utilities for the CLI.

use console::Style;

use nbmerge_core::render::LineKind;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Style one line of a rendered cell diff.
pub fn diff_line(kind: LineKind, text: &str) -> String {
    let style = match kind {
        LineKind::Header => Style::new().bold(),
        LineKind::Unchanged => Style::new().dim(),
        LineKind::Inserted => Style::new().green(),
        LineKind::Deleted => Style::new().red(),
        LineKind::Replaced => Style::new().yellow().bold(),
        LineKind::Patch => patch_style(text),
    };
    style.apply_to(text).to_string()
}

// Patch lines carry a four-space indent before the unified diff marker.
fn patch_style(text: &str) -> Style {
    match text.strip_prefix("    ").unwrap_or(text).chars().next() {
        Some('@') => Style::new().cyan(),
        Some('+') => Style::new().green(),
        Some('-') => Style::new().red(),
        _ => Style::new(),
    }
}
