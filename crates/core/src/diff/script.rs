//! Edit scripts over two cell sequences.

use std::fmt;
use std::ops::Range;

use serde::Serialize;

/// What an [`EditOp`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    /// Cells equivalent on both sides.
    Equal,
    /// Cells present only in B.
    Insert,
    /// Cells present only in A.
    Delete,
    /// A run of A cells replaced by a run of B cells.
    Replace,
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "equal"),
            Self::Insert => write!(f, "insert"),
            Self::Delete => write!(f, "delete"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// One operation, as half-open index ranges into A and B.
///
/// `Insert` has an empty `a` range positioned where the B cells go;
/// `Delete` has an empty `b` range. `Equal` ranges have equal length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOp {
    pub kind: EditKind,
    pub a: Range<usize>,
    pub b: Range<usize>,
}

impl EditOp {
    pub fn is_change(&self) -> bool {
        self.kind != EditKind::Equal
    }

    /// Index pairs `(a, b)` of an `Equal` run; empty for other kinds.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = if self.kind == EditKind::Equal {
            self.a.len()
        } else {
            0
        };
        (0..n).map(move |k| (self.a.start + k, self.b.start + k))
    }
}

/// Ordered operations turning sequence A into sequence B.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EditScript {
    ops: Vec<EditOp>,
    len_a: usize,
    len_b: usize,
}

impl EditScript {
    pub(crate) fn new(ops: Vec<EditOp>, len_a: usize, len_b: usize) -> Self {
        Self { ops, len_a, len_b }
    }

    /// One change covering both sequences entirely.
    pub(crate) fn whole(len_a: usize, len_b: usize) -> Self {
        let kind = match (len_a, len_b) {
            (0, 0) => return Self::new(Vec::new(), 0, 0),
            (0, _) => EditKind::Insert,
            (_, 0) => EditKind::Delete,
            _ => EditKind::Replace,
        };
        Self::new(
            vec![EditOp {
                kind,
                a: 0..len_a,
                b: 0..len_b,
            }],
            len_a,
            len_b,
        )
    }

    /// Whether this script was computed for sequences of these lengths.
    pub fn fits(&self, len_a: usize, len_b: usize) -> bool {
        self.len_a == len_a && self.len_b == len_b
    }

    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EditOp> {
        self.ops.iter()
    }

    pub fn len_a(&self) -> usize {
        self.len_a
    }

    pub fn len_b(&self) -> usize {
        self.len_b
    }

    /// Number of non-`Equal` operations.
    pub fn change_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_change()).count()
    }

    /// True when A and B are equivalent cell for cell.
    pub fn is_identity(&self) -> bool {
        self.change_count() == 0
    }
}

impl<'a> IntoIterator for &'a EditScript {
    type Item = &'a EditOp;
    type IntoIter = std::slice::Iter<'a, EditOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
