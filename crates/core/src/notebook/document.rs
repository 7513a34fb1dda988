//! Top-level notebook document: version, metadata and ordered cells.

use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use super::cell::{Cell, Metadata};
use crate::errors::DocumentError;

/// Spelling of the version keys in the source file, reused on write so an
/// untouched notebook round-trips without renamed keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionKeys {
    /// `format_version_major` / `format_version_minor`.
    #[default]
    Canonical,
    /// `nbformat` / `nbformat_minor`, as written by the notebook ecosystem.
    Nbformat,
}

impl VersionKeys {
    fn names(&self) -> (&'static str, &'static str) {
        match self {
            Self::Canonical => ("format_version_major", "format_version_minor"),
            Self::Nbformat => ("nbformat", "nbformat_minor"),
        }
    }
}

/// Notebook format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatVersion {
    pub major: i64,
    pub minor: i64,
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self { major: 4, minor: 5 }
    }
}

/// A validated notebook.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub format_version: FormatVersion,
    pub version_keys: VersionKeys,
    pub metadata: Metadata,
    pub cells: Vec<Cell>,
}

impl Document {
    /// A notebook with no cells and no metadata. Stands in for a revision
    /// that does not exist on one side of a conflict.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse raw bytes into a validated document.
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = std::str::from_utf8(bytes)?;
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, DocumentError> {
        let obj = value
            .as_object()
            .ok_or_else(|| DocumentError::schema("$", "expected a JSON object"))?;

        let version_keys = detect_version_keys(obj)?;
        let (major_key, minor_key) = version_keys.names();
        let format_version = FormatVersion {
            major: required_int(obj, major_key)?,
            minor: required_int(obj, minor_key)?,
        };

        let metadata = obj
            .get("metadata")
            .ok_or_else(|| DocumentError::schema("$", "missing required key 'metadata'"))?
            .as_object()
            .cloned()
            .ok_or_else(|| DocumentError::schema("metadata", "expected an object"))?;

        let cells = obj
            .get("cells")
            .ok_or_else(|| DocumentError::schema("$", "missing required key 'cells'"))?
            .as_array()
            .ok_or_else(|| DocumentError::schema("cells", "expected an array"))?
            .iter()
            .enumerate()
            .map(|(i, v)| Cell::from_value(v, i))
            .collect::<Result<Vec<_>, _>>()?;

        for key in obj.keys() {
            let known = key == major_key || key == minor_key || key == "metadata" || key == "cells";
            if !known {
                return Err(DocumentError::schema(
                    key.as_str(),
                    "unknown top-level key",
                ));
            }
        }

        debug!(
            version = %format_version,
            cells = cells.len(),
            "parsed notebook"
        );

        Ok(Self {
            format_version,
            version_keys,
            metadata,
            cells,
        })
    }

    pub fn to_value(&self) -> Value {
        let (major_key, minor_key) = self.version_keys.names();
        let mut obj = Map::new();
        obj.insert(major_key.into(), Value::from(self.format_version.major));
        obj.insert(minor_key.into(), Value::from(self.format_version.minor));
        obj.insert("metadata".into(), Value::Object(self.metadata.clone()));
        obj.insert(
            "cells".into(),
            Value::Array(self.cells.iter().map(Cell::to_value).collect()),
        );
        Value::Object(obj)
    }

    /// Whether `other` can be merged with this document.
    pub fn compatible(&self, other: &Document) -> bool {
        compatible(self, other)
    }

    /// Number of conflict blocks left in this document's cells.
    pub fn conflict_blocks(&self) -> usize {
        crate::merge::count_conflict_blocks(&self.cells)
    }
}

/// Parse raw bytes into a validated document.
pub fn parse(bytes: &[u8]) -> Result<Document, DocumentError> {
    Document::parse(bytes)
}

/// Two documents can be merged unless their major format versions differ.
pub fn compatible(a: &Document, b: &Document) -> bool {
    a.format_version.major == b.format_version.major
}

fn detect_version_keys(obj: &Map<String, Value>) -> Result<VersionKeys, DocumentError> {
    let canonical = obj.contains_key("format_version_major") || obj.contains_key("format_version_minor");
    let nbformat = obj.contains_key("nbformat") || obj.contains_key("nbformat_minor");
    match (canonical, nbformat) {
        (true, true) => Err(DocumentError::schema(
            "$",
            "both 'format_version_*' and 'nbformat*' keys present",
        )),
        (false, true) => Ok(VersionKeys::Nbformat),
        // Neither present falls through to the canonical names so the
        // missing-key error mentions them.
        _ => Ok(VersionKeys::Canonical),
    }
}

fn required_int(obj: &Map<String, Value>, key: &str) -> Result<i64, DocumentError> {
    let value = obj
        .get(key)
        .ok_or_else(|| DocumentError::schema("$", format!("missing required key '{key}'")))?;
    value
        .as_i64()
        .ok_or_else(|| DocumentError::schema(key, format!("expected an integer, got {value}")))
}
