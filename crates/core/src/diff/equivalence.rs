//! Structural cell equivalence used by the differ.

use std::collections::BTreeSet;

use crate::notebook::{Cell, Metadata};

/// Field names ignored when no configuration says otherwise.
pub const DEFAULT_IGNORED_FIELDS: &[&str] = &["id", "execution_count"];

/// Which fields to disregard when deciding whether two cells match.
///
/// Names apply to a cell's auxiliary fields (`id`, `execution_count`,
/// `outputs`, unknown cell keys) and to keys of its `metadata`. The tag and
/// the source text are always compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivalenceConfig {
    ignore: BTreeSet<String>,
}

impl Default for EquivalenceConfig {
    fn default() -> Self {
        Self::ignoring(DEFAULT_IGNORED_FIELDS.iter().copied())
    }
}

impl EquivalenceConfig {
    pub fn ignoring<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignore: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Compare every field.
    pub fn strict() -> Self {
        Self {
            ignore: BTreeSet::new(),
        }
    }

    pub fn ignores(&self, field: &str) -> bool {
        self.ignore.contains(field)
    }

    pub fn ignored_fields(&self) -> impl Iterator<Item = &str> {
        self.ignore.iter().map(String::as_str)
    }

    pub fn equivalent(&self, a: &Cell, b: &Cell) -> bool {
        if a.kind() != b.kind() || a.source() != b.source() {
            return false;
        }
        if !self.ignores("id") && a.id() != b.id() {
            return false;
        }
        if !self.maps_equal(a.metadata(), b.metadata()) || !self.maps_equal(a.extra(), b.extra()) {
            return false;
        }
        match (a, b) {
            (Cell::Code(x), Cell::Code(y)) => {
                (self.ignores("outputs") || x.outputs == y.outputs)
                    && (self.ignores("execution_count") || x.execution_count == y.execution_count)
            }
            _ => true,
        }
    }

    fn maps_equal(&self, a: &Metadata, b: &Metadata) -> bool {
        // Map iteration is key-ordered, so positional comparison is exact.
        a.iter()
            .filter(|(k, _)| !self.ignores(k))
            .eq(b.iter().filter(|(k, _)| !self.ignores(k)))
    }
}
