//! Notebook-level metadata merge.
//!
//! The chosen side's metadata is taken wholesale. Keys are never blended:
//! notebook metadata is tool-specific (kernel, language info, extensions)
//! and there is no general rule for combining two values of an unknown key.

use tracing::debug;

use crate::notebook::Metadata;

/// Return the preferred side's metadata unchanged.
pub fn merge_metadata(ours: &Metadata, theirs: &Metadata, prefer_ours: bool) -> Metadata {
    debug!(
        prefer_ours,
        ours_keys = ours.len(),
        theirs_keys = theirs.len(),
        "merging notebook metadata"
    );
    if prefer_ours {
        ours.clone()
    } else {
        theirs.clone()
    }
}
