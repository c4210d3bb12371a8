//! Domain types shared by the chunker, embedder, index and engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Identifier assigned by the vector index at insertion time.
pub type EntryId = u64;

/// Flat provenance metadata attached to every chunk.
pub type Meta = BTreeMap<String, MetaValue>;

/// Keys owned by [`Chunk`] and [`SearchHit`] in their flat JSON form. The
/// chunker drops metadata entries with these names; the index rejects them.
pub const RESERVED_KEYS: [&str; 7] =
    ["text", "chunk_id", "chunk_index", "total_chunks", "overlap_len", "id", "distance"];

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(v) => write!(f, "{v}"),
            MetaValue::Int(v) => write!(f, "{v}"),
            MetaValue::Float(v) => write!(f, "{v}"),
            MetaValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self { MetaValue::Text(v.to_string()) }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self { MetaValue::Text(v) }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self { MetaValue::Int(v) }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self { MetaValue::Float(v) }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self { MetaValue::Bool(v) }
}

/// A sentence-aligned segment of a source document.
///
/// - `chunk_id`: `<document fingerprint>_<chunk_index>`, stable across re-ingestion
/// - `chunk_index`/`total_chunks`: position within the parent document
/// - `overlap_len`: byte length of the prefix of `text` carried over from the
///   previous chunk (including the joining space), `0` when nothing was carried
/// - `metadata`: caller and file provenance, serialized inline with the fields above
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub chunk_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(default)]
    pub overlap_len: usize,
    #[serde(flatten)]
    pub metadata: Meta,
}

impl Chunk {
    /// Checks that the flat JSON form reads back as the same chunk: no metadata
    /// key shadows a named field, and no float metadata is NaN or infinite.
    pub fn validate(&self) -> Result<()> {
        if let Some(key) = self.metadata.keys().find(|k| RESERVED_KEYS.contains(&k.as_str())) {
            return Err(Error::InvalidArgument(format!("metadata key '{key}' is reserved")));
        }
        let non_finite = self.metadata.iter().find(|(_, v)| matches!(v, MetaValue::Float(f) if !f.is_finite()));
        if let Some((key, value)) = non_finite {
            return Err(Error::InvalidArgument(format!("metadata '{key}' is not a finite number: {value}")));
        }
        Ok(())
    }

    /// Text contributed by this chunk alone, without the carried overlap.
    pub fn fresh_text(&self) -> &str {
        self.text.get(self.overlap_len..).map(str::trim_start).unwrap_or(&self.text)
    }
}

/// One search result: the stored payload plus its squared L2 distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: EntryId,
    #[serde(flatten)]
    pub payload: Chunk,
    pub distance: f32,
}

/// Counters reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub vectors: usize,
    pub next_id: EntryId,
    pub dimension: usize,
}
