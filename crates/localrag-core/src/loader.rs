//! Turns a file on disk into text plus provenance metadata.
//!
//! `.txt` and `.md` are read directly as UTF-8. Everything else goes through an
//! injected [`DocumentParser`]; without one the file is rejected.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::traits::DocumentParser;
use crate::types::{Meta, MetaValue};

const PLAIN_TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];

pub struct LoadedDocument {
    pub text: String,
    pub metadata: Meta,
}

pub fn file_type(path: &Path) -> String {
    path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default()
}

pub fn is_plain_text(path: &Path) -> bool {
    PLAIN_TEXT_EXTENSIONS.contains(&file_type(path).as_str())
}

/// `source`, `file_type` and `filename` for `path`, overridden by `extra`.
pub fn base_metadata(path: &Path, extra: &Meta) -> Meta {
    let mut meta = Meta::new();
    meta.insert("source".into(), MetaValue::from(path.to_string_lossy().to_string()));
    meta.insert("file_type".into(), MetaValue::from(file_type(path)));
    let filename = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    meta.insert("filename".into(), MetaValue::from(filename));
    meta.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    meta
}

pub fn load_document(path: &Path, extra: &Meta, parser: Option<&dyn DocumentParser>) -> Result<LoadedDocument> {
    let text = if is_plain_text(path) {
        let bytes = fs::read(path).map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
        String::from_utf8(bytes).map_err(|e| Error::Parse(format!("{}: not valid UTF-8: {}", path.display(), e)))?
    } else {
        match parser {
            Some(p) => p.parse(path)?,
            None => {
                return Err(Error::Parse(format!(
                    "{}: unsupported file type '{}' and no document parser configured",
                    path.display(),
                    file_type(path)
                )))
            }
        }
    };
    Ok(LoadedDocument { text, metadata: base_metadata(path, extra) })
}
