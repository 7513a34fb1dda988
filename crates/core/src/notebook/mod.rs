//! Notebook document model.
//!
//! Parsing validates the schema and nothing more: unknown metadata keys and
//! unknown cell keys are carried through untouched so that a conflict-free
//! notebook survives parse → write unchanged.

pub mod cell;
pub mod document;

pub use cell::{Cell, CellKind, CodeCell, Metadata, Source, TextCell};
pub use document::{compatible, parse, Document, FormatVersion, VersionKeys};
