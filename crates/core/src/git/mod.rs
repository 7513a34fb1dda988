//! Repository access: conflict stages, labels and index staging.

pub mod repository;
pub mod revisions;

pub use repository::{discover_workdir, GitRepository};
pub use revisions::{InMemoryRevisions, RevisionSet, RevisionSource, Stage};
