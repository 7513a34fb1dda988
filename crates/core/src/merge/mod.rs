//! Merge stage: metadata selection and conflict composition.

pub mod composer;
pub mod metadata;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use composer::{
    boundary_cell, compose, count_conflict_blocks, Boundary, CellPolicy, Composer,
    ConflictLabels, MARKER_KEY, REVISION_KEY,
};
pub use metadata::merge_metadata;

/// Which side's notebook metadata wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSide {
    #[default]
    Ours,
    Theirs,
}

impl MetadataSide {
    pub fn prefers_ours(&self) -> bool {
        matches!(self, Self::Ours)
    }
}

impl fmt::Display for MetadataSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

impl FromStr for MetadataSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            other => Err(format!(
                "invalid metadata side '{other}': use 'ours' or 'theirs'"
            )),
        }
    }
}
