//! Conflict composer.
//!
//! Turns an ours→theirs edit script into a single cell sequence. Under the
//! annotate policy every disagreement becomes a conflict block bounded by
//! ordinary markdown cells, so the result is still a valid notebook.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::diff::{EditKind, EditScript};
use crate::notebook::Cell;

/// Metadata key identifying boundary cells.
pub const MARKER_KEY: &str = "merge_conflict";
/// Metadata key holding the revision label on start/end boundaries.
pub const REVISION_KEY: &str = "revision";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// How to resolve cell-level disagreements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellPolicy {
    /// Keep our cells verbatim.
    #[serde(rename = "ours")]
    KeepOurs,
    /// Keep their cells verbatim.
    #[serde(rename = "theirs")]
    KeepTheirs,
    /// Keep both, with conflict blocks around every disagreement.
    #[default]
    #[serde(rename = "annotate")]
    Annotate,
}

impl fmt::Display for CellPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepOurs => write!(f, "ours"),
            Self::KeepTheirs => write!(f, "theirs"),
            Self::Annotate => write!(f, "annotate"),
        }
    }
}

impl FromStr for CellPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ours" => Ok(Self::KeepOurs),
            "theirs" => Ok(Self::KeepTheirs),
            "annotate" => Ok(Self::Annotate),
            other => Err(format!(
                "invalid cell policy '{other}': use 'ours', 'theirs' or 'annotate'"
            )),
        }
    }
}

/// Revision names written into boundary cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictLabels {
    pub ours: String,
    pub theirs: String,
}

impl Default for ConflictLabels {
    fn default() -> Self {
        Self {
            ours: "ours".into(),
            theirs: "theirs".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Boundary cells
// ---------------------------------------------------------------------------

/// Role of a boundary cell within a conflict block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    Separator,
    End,
}

impl Boundary {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Separator => "separator",
            Self::End => "end",
        }
    }

    /// Recognise a boundary cell produced by [`boundary_cell`].
    pub fn of(cell: &Cell) -> Option<Self> {
        if !matches!(cell, Cell::Markdown(_)) {
            return None;
        }
        match cell.metadata().get(MARKER_KEY).and_then(Value::as_str)? {
            "start" => Some(Self::Start),
            "separator" => Some(Self::Separator),
            "end" => Some(Self::End),
            _ => None,
        }
    }
}

/// Build a markdown boundary cell. The markers live in the source text only.
pub fn boundary_cell(boundary: Boundary, label: &str) -> Cell {
    let source = match boundary {
        Boundary::Start => format!("`<<<<<<< {label}`"),
        Boundary::Separator => "`=======`".to_string(),
        Boundary::End => format!("`>>>>>>> {label}`"),
    };
    let cell = Cell::markdown(source).with_metadata(MARKER_KEY, Value::from(boundary.as_str()));
    match boundary {
        Boundary::Separator => cell,
        _ => cell.with_metadata(REVISION_KEY, Value::from(label)),
    }
}

/// Count conflict blocks by their start boundaries.
pub fn count_conflict_blocks(cells: &[Cell]) -> usize {
    cells
        .iter()
        .filter(|c| Boundary::of(c) == Some(Boundary::Start))
        .count()
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// Compose with the default `ours` / `theirs` labels.
pub fn compose(ours: &[Cell], theirs: &[Cell], script: &EditScript, policy: CellPolicy) -> Vec<Cell> {
    Composer::default().compose(ours, theirs, script, policy)
}

/// Composer carrying the labels to write into boundary cells.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    labels: ConflictLabels,
}

impl Composer {
    pub fn new(labels: ConflictLabels) -> Self {
        Self { labels }
    }

    /// Merge `ours` and `theirs` given the script `diff(ours, theirs)`.
    pub fn compose(
        &self,
        ours: &[Cell],
        theirs: &[Cell],
        script: &EditScript,
        policy: CellPolicy,
    ) -> Vec<Cell> {
        match policy {
            CellPolicy::KeepOurs => return ours.to_vec(),
            CellPolicy::KeepTheirs => return theirs.to_vec(),
            CellPolicy::Annotate => {}
        }

        // A script computed for other sequences cannot be trusted to index
        // these; treat everything as one disagreement instead.
        let whole;
        let script = if script.fits(ours.len(), theirs.len()) {
            script
        } else {
            warn!(
                script_a = script.len_a(),
                script_b = script.len_b(),
                ours = ours.len(),
                theirs = theirs.len(),
                "edit script does not match the cell sequences"
            );
            whole = EditScript::whole(ours.len(), theirs.len());
            &whole
        };

        let mut out = Vec::with_capacity(ours.len().max(theirs.len()));
        let mut blocks = 0usize;
        for op in script {
            if op.kind == EditKind::Equal {
                out.extend_from_slice(&ours[op.a.clone()]);
                continue;
            }
            blocks += 1;
            out.push(boundary_cell(Boundary::Start, &self.labels.ours));
            out.extend(ours[op.a.clone()].iter().map(Cell::without_identity));
            out.push(boundary_cell(Boundary::Separator, ""));
            out.extend(theirs[op.b.clone()].iter().map(Cell::without_identity));
            out.push(boundary_cell(Boundary::End, &self.labels.theirs));
        }

        debug!(blocks, cells = out.len(), "composed annotated cells");
        out
    }
}
