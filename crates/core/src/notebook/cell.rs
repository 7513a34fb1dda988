//! Notebook cells.
//!
//! A [`Cell`] is a closed sum over the three cell types. Only the code
//! variant carries `outputs` and `execution_count`, so a markdown cell with
//! outputs cannot be represented at all.

use std::borrow::Cow;
use std::fmt;

use serde_json::{Map, Value};

use crate::errors::DocumentError;

/// Schema-open mapping used for notebook and cell metadata.
pub type Metadata = Map<String, Value>;

// Keys the model owns; everything else on a cell object lands in `extra`.
const KNOWN_CELL_KEYS: &[&str] = &[
    "cell_type",
    "source",
    "metadata",
    "id",
    "outputs",
    "execution_count",
];

// ---------------------------------------------------------------------------
// Cell kind
// ---------------------------------------------------------------------------

/// The `cell_type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Markdown,
    Raw,
    Code,
}

impl CellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Raw => "raw",
            Self::Code => "code",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "markdown" => Some(Self::Markdown),
            "raw" => Some(Self::Raw),
            "code" => Some(Self::Code),
            _ => None,
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Cell source text, kept in whichever JSON shape it was read in.
///
/// Equality compares the joined text, so a single string and the equivalent
/// list of lines are the same source.
#[derive(Debug, Clone)]
pub enum Source {
    Text(String),
    Lines(Vec<String>),
}

impl Source {
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Lines(lines) => Cow::Owned(lines.concat()),
        }
    }

    /// First non-empty line, for one-line summaries.
    pub fn first_line(&self) -> String {
        self.text()
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .to_string()
    }

    fn from_value(value: &Value, location: &str) -> Result<Self, DocumentError> {
        match value {
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        DocumentError::schema(format!("{location}[{i}]"), "expected a string")
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Lines),
            _ => Err(DocumentError::schema(
                location,
                "expected a string or an array of strings",
            )),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Lines(lines) => Value::Array(lines.iter().cloned().map(Value::String).collect()),
        }
    }
}

impl Default for Source {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.text() == other.text()
    }
}

impl Eq for Source {}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

// ---------------------------------------------------------------------------
// Cell variants
// ---------------------------------------------------------------------------

/// Fields shared by markdown and raw cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextCell {
    pub source: Source,
    pub metadata: Metadata,
    pub id: Option<String>,
    /// Unknown cell keys (e.g. `attachments`), passed through verbatim.
    pub extra: Metadata,
}

/// An executable code cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeCell {
    pub source: Source,
    pub metadata: Metadata,
    pub id: Option<String>,
    pub outputs: Vec<Value>,
    pub execution_count: Option<i64>,
    pub extra: Metadata,
}

/// One notebook cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Markdown(TextCell),
    Raw(TextCell),
    Code(CodeCell),
}

impl Cell {
    pub fn markdown(source: impl Into<Source>) -> Self {
        Self::Markdown(TextCell {
            source: source.into(),
            ..TextCell::default()
        })
    }

    pub fn raw(source: impl Into<Source>) -> Self {
        Self::Raw(TextCell {
            source: source.into(),
            ..TextCell::default()
        })
    }

    pub fn code(source: impl Into<Source>) -> Self {
        Self::Code(CodeCell {
            source: source.into(),
            ..CodeCell::default()
        })
    }

    pub fn kind(&self) -> CellKind {
        match self {
            Self::Markdown(_) => CellKind::Markdown,
            Self::Raw(_) => CellKind::Raw,
            Self::Code(_) => CellKind::Code,
        }
    }

    pub fn source(&self) -> &Source {
        match self {
            Self::Markdown(c) | Self::Raw(c) => &c.source,
            Self::Code(c) => &c.source,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Markdown(c) | Self::Raw(c) => &c.metadata,
            Self::Code(c) => &c.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            Self::Markdown(c) | Self::Raw(c) => &mut c.metadata,
            Self::Code(c) => &mut c.metadata,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Markdown(c) | Self::Raw(c) => c.id.as_deref(),
            Self::Code(c) => c.id.as_deref(),
        }
    }

    pub fn extra(&self) -> &Metadata {
        match self {
            Self::Markdown(c) | Self::Raw(c) => &c.extra,
            Self::Code(c) => &c.extra,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = Some(id.into());
        match &mut self {
            Self::Markdown(c) | Self::Raw(c) => c.id = id,
            Self::Code(c) => c.id = id,
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata_mut().insert(key.into(), value);
        self
    }

    /// Copy of this cell with `id` and `execution_count` cleared, so the
    /// same cell can appear on both sides of a conflict block without two
    /// cells claiming one identity.
    pub fn without_identity(&self) -> Self {
        let mut cell = self.clone();
        match &mut cell {
            Self::Markdown(c) | Self::Raw(c) => c.id = None,
            Self::Code(c) => {
                c.id = None;
                c.execution_count = None;
            }
        }
        cell
    }

    /// Parse and validate `cells[index]`.
    pub(crate) fn from_value(value: &Value, index: usize) -> Result<Self, DocumentError> {
        let loc = format!("cells[{index}]");
        let obj = value
            .as_object()
            .ok_or_else(|| DocumentError::schema(&loc, "expected an object"))?;

        let tag = obj
            .get("cell_type")
            .ok_or_else(|| DocumentError::schema(&loc, "missing required key 'cell_type'"))?
            .as_str()
            .ok_or_else(|| DocumentError::schema(format!("{loc}.cell_type"), "expected a string"))?;
        let kind = CellKind::from_tag(tag).ok_or_else(|| {
            DocumentError::schema(
                format!("{loc}.cell_type"),
                format!("unknown cell type '{tag}' (expected markdown, raw or code)"),
            )
        })?;

        let source_value = obj
            .get("source")
            .ok_or_else(|| DocumentError::schema(&loc, "missing required key 'source'"))?;
        let source = Source::from_value(source_value, &format!("{loc}.source"))?;

        let metadata = obj
            .get("metadata")
            .ok_or_else(|| DocumentError::schema(&loc, "missing required key 'metadata'"))?
            .as_object()
            .cloned()
            .ok_or_else(|| DocumentError::schema(format!("{loc}.metadata"), "expected an object"))?;

        let id = match obj.get("id") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(DocumentError::schema(format!("{loc}.id"), "expected a string"))
            }
        };

        let extra: Metadata = obj
            .iter()
            .filter(|(k, _)| !KNOWN_CELL_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if kind != CellKind::Code {
            for key in ["outputs", "execution_count"] {
                if obj.contains_key(key) {
                    return Err(DocumentError::schema(
                        format!("{loc}.{key}"),
                        format!("only code cells may have '{key}', found on a {kind} cell"),
                    ));
                }
            }
            let cell = TextCell {
                source,
                metadata,
                id,
                extra,
            };
            return Ok(match kind {
                CellKind::Markdown => Self::Markdown(cell),
                _ => Self::Raw(cell),
            });
        }

        let outputs = obj
            .get("outputs")
            .ok_or_else(|| DocumentError::schema(&loc, "code cell is missing 'outputs'"))?
            .as_array()
            .cloned()
            .ok_or_else(|| DocumentError::schema(format!("{loc}.outputs"), "expected an array"))?;

        let execution_count = match obj.get("execution_count") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_i64().ok_or_else(|| {
                DocumentError::schema(
                    format!("{loc}.execution_count"),
                    format!("expected an integer or null, got {v}"),
                )
            })?),
        };

        Ok(Self::Code(CodeCell {
            source,
            metadata,
            id,
            outputs,
            execution_count,
            extra,
        }))
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut obj = self.extra().clone();
        obj.insert("cell_type".into(), Value::String(self.kind().as_str().into()));
        obj.insert("source".into(), self.source().to_value());
        obj.insert("metadata".into(), Value::Object(self.metadata().clone()));
        if let Some(id) = self.id() {
            obj.insert("id".into(), Value::String(id.to_string()));
        }
        if let Self::Code(c) = self {
            obj.insert("outputs".into(), Value::Array(c.outputs.clone()));
            obj.insert(
                "execution_count".into(),
                c.execution_count.map(Value::from).unwrap_or(Value::Null),
            );
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_equality_ignores_shape() {
        let text = Source::Text("a = 1\nb = 2".into());
        let lines = Source::Lines(vec!["a = 1\n".into(), "b = 2".into()]);
        assert_eq!(text, lines);
        assert_eq!(lines.first_line(), "a = 1");
    }

    #[test]
    fn test_parse_code_cell() {
        let v = json!({
            "cell_type": "code",
            "source": ["print(1)"],
            "metadata": {"tags": ["x"]},
            "id": "abc",
            "outputs": [],
            "execution_count": 3
        });
        let cell = Cell::from_value(&v, 0).unwrap();
        assert_eq!(cell.kind(), CellKind::Code);
        assert_eq!(cell.id(), Some("abc"));
        match &cell {
            Cell::Code(c) => assert_eq!(c.execution_count, Some(3)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cell.to_value(), v);
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let v = json!({
            "cell_type": "markdown",
            "source": "![img](attachment:a.png)",
            "metadata": {},
            "attachments": {"a.png": {"image/png": "AAAA"}}
        });
        let cell = Cell::from_value(&v, 0).unwrap();
        assert!(cell.extra().contains_key("attachments"));
        assert_eq!(cell.to_value(), v);
    }

    #[test]
    fn test_rejects_unknown_cell_type() {
        let v = json!({"cell_type": "heading", "source": "", "metadata": {}});
        let err = Cell::from_value(&v, 4).unwrap_err();
        assert!(err.to_string().starts_with("cells[4].cell_type"));
    }

    #[test]
    fn test_rejects_outputs_on_markdown() {
        let v = json!({"cell_type": "markdown", "source": "", "metadata": {}, "outputs": []});
        let err = Cell::from_value(&v, 0).unwrap_err();
        assert!(err.to_string().contains("only code cells"));
    }

    #[test]
    fn test_rejects_non_integer_execution_count() {
        let v = json!({
            "cell_type": "code", "source": "", "metadata": {},
            "outputs": [], "execution_count": "3"
        });
        let err = Cell::from_value(&v, 1).unwrap_err();
        assert!(err.to_string().starts_with("cells[1].execution_count"));
    }

    #[test]
    fn test_code_cell_requires_outputs() {
        let v = json!({"cell_type": "code", "source": "", "metadata": {}});
        assert!(Cell::from_value(&v, 0).is_err());
    }

    #[test]
    fn test_without_identity() {
        let cell = Cell::Code(CodeCell {
            source: "x".into(),
            id: Some("id-1".into()),
            execution_count: Some(7),
            ..CodeCell::default()
        });
        let stripped = cell.without_identity();
        assert_eq!(stripped.id(), None);
        match stripped {
            Cell::Code(c) => assert_eq!(c.execution_count, None),
            other => panic!("unexpected {other:?}"),
        }
    }
}
