//! Canonical serialisation and atomic output of merged notebooks.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::WriteError;
use crate::notebook::Document;

/// Canonical bytes: sorted keys, one-space indent, UTF-8 verbatim, and a
/// trailing newline.
pub fn to_canonical_bytes(doc: &Document) -> Result<Vec<u8>, WriteError> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b" "));
    doc.to_value().serialize(&mut ser)?;
    out.push(b'\n');
    Ok(out)
}

/// Where merged output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// Replace the source file.
    pub overwrite: bool,
    /// Prepended to the file stem for the alternate path.
    pub prefix: String,
    /// Appended to the file stem for the alternate path.
    pub suffix: String,
}

impl Default for OutputTarget {
    fn default() -> Self {
        Self {
            overwrite: false,
            prefix: String::new(),
            suffix: "_resolved".into(),
        }
    }
}

impl OutputTarget {
    pub fn in_place() -> Self {
        Self {
            overwrite: true,
            ..Self::default()
        }
    }

    /// Path the merged document for `source` is written to.
    pub fn destination(&self, source: &Path) -> PathBuf {
        if self.overwrite {
            source.to_path_buf()
        } else {
            alternate_path(source, &self.prefix, &self.suffix)
        }
    }
}

/// `{prefix}{stem}{suffix}{ext}` next to `source`.
pub fn alternate_path(source: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    source.with_file_name(format!("{prefix}{stem}{suffix}{ext}"))
}

/// Write `doc` for `source` according to `target`. Returns the path written.
///
/// The bytes go to a temporary file in the destination directory, which is
/// then renamed over the destination. Without overwrite an existing
/// destination is never replaced.
pub fn write_document(doc: &Document, source: &Path, target: &OutputTarget) -> Result<PathBuf, WriteError> {
    let dest = target.destination(source);
    if !target.overwrite && dest.exists() {
        return Err(WriteError::Blocked(dest));
    }

    let bytes = to_canonical_bytes(doc)?;
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let io_err = |source: std::io::Error| WriteError::Io {
        path: dest.clone(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    // Temp files are created private; keep the mode of the file being
    // replaced, else of the source notebook.
    if let Ok(meta) = std::fs::metadata(&dest).or_else(|_| std::fs::metadata(source)) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(io_err)?;
    }
    tmp.write_all(&bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    debug!(tmp = %tmp.path().display(), bytes = bytes.len(), "wrote temporary file");

    if target.overwrite {
        tmp.persist(&dest).map_err(|e| io_err(e.error))?;
    } else {
        tmp.persist_noclobber(&dest).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                WriteError::Blocked(dest.clone())
            } else {
                io_err(e.error)
            }
        })?;
    }

    info!(path = %dest.display(), "wrote merged notebook");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::Cell;
    use serde_json::json;

    fn doc() -> Document {
        let mut doc = Document::empty();
        doc.metadata.insert("zeta".into(), json!(1));
        doc.metadata.insert("alpha".into(), json!("é"));
        doc.cells.push(Cell::markdown("# Title"));
        doc
    }

    #[test]
    fn test_canonical_bytes_shape() {
        let bytes = to_canonical_bytes(&doc()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\n \"cells\": ["));
        assert!(text.contains("\"é\""));
        let alpha = text.find("\"alpha\"").unwrap();
        let zeta = text.find("\"zeta\"").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_round_trip_is_stable() {
        let once = to_canonical_bytes(&doc()).unwrap();
        let twice = to_canonical_bytes(&Document::parse(&once).unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_extreme_floats_round_trip() {
        let mut d = doc();
        d.metadata.insert("v".into(), json!(1.0715660391465826e-75));
        d.metadata.insert("w".into(), json!(2.2250738585072014e-308));
        let once = to_canonical_bytes(&d).unwrap();
        let twice = to_canonical_bytes(&Document::parse(&once).unwrap()).unwrap();
        assert_eq!(once, twice);
        assert!(String::from_utf8(once).unwrap().contains("1.0715660391465826e-75"));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("nb.ipynb");
        std::fs::write(&src, "original").unwrap();
        std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_document(&doc(), &src, &OutputTarget::in_place()).unwrap();
        assert_eq!(mode(&src), 0o644);

        let alternate = write_document(&doc(), &src, &OutputTarget::default()).unwrap();
        assert_eq!(mode(&alternate), 0o644);

        std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o755)).unwrap();
        write_document(&doc(), &src, &OutputTarget::in_place()).unwrap();
        assert_eq!(mode(&src), 0o755);
    }

    #[test]
    fn test_alternate_path() {
        let p = alternate_path(Path::new("dir/nb.ipynb"), "pre_", "_post");
        assert_eq!(p, PathBuf::from("dir/pre_nb_post.ipynb"));
        let p = alternate_path(Path::new("nb.ipynb"), "", "_resolved");
        assert_eq!(p, PathBuf::from("nb_resolved.ipynb"));
    }

    #[test]
    fn test_write_in_place_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("nb.ipynb");
        std::fs::write(&src, "garbage").unwrap();
        let written = write_document(&doc(), &src, &OutputTarget::in_place()).unwrap();
        assert_eq!(written, src);
        let parsed = Document::parse(&std::fs::read(&src).unwrap()).unwrap();
        assert_eq!(parsed, doc());
    }

    #[test]
    fn test_write_alternate_path_blocks_on_existing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("nb.ipynb");
        std::fs::write(&src, "original").unwrap();
        let target = OutputTarget::default();

        let written = write_document(&doc(), &src, &target).unwrap();
        assert_eq!(written, dir.path().join("nb_resolved.ipynb"));
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "original");

        let err = write_document(&doc(), &src, &target).unwrap_err();
        assert!(matches!(err, WriteError::Blocked(p) if p == written));
    }

    #[test]
    fn test_empty_affixes_without_overwrite_are_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("nb.ipynb");
        std::fs::write(&src, "original").unwrap();
        let target = OutputTarget {
            overwrite: false,
            prefix: String::new(),
            suffix: String::new(),
        };
        assert!(matches!(
            write_document(&doc(), &src, &target),
            Err(WriteError::Blocked(_))
        ));
    }
}
