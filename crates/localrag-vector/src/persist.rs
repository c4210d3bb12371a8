//! On-disk layout for a [`crate::VectorIndex`] saved under base path `B`
//! (file name `N`):
//!
//! - `B.meta.json`: the commit record, holding `dimension`, `next_id`,
//!   `document_map`, a format/version tag and the name + BLAKE3 checksum of
//!   the vectors file.
//! - `N.<16 hex>.vectors` next to it: `LRVX` magic, `u32` version, `u32`
//!   dimension, `u64` count, then `count` records of `u64` id followed by
//!   `dimension` `f32`s. Little-endian throughout.
//!
//! Both files are written to a temp file, fsynced and renamed into place.
//! The vectors file goes first and is content-addressed, so it never
//! overwrites the file the committed meta points at; renaming the meta file
//! is the commit point. Stale vectors files are removed afterwards.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use localrag_core::error::{Error, Result};
use localrag_core::types::{Chunk, EntryId};

use crate::index::IndexState;

pub const FORMAT: &str = "localrag-flat-l2";
pub const FORMAT_VERSION: u32 = 1;
const VECTORS_MAGIC: &[u8; 4] = b"LRVX";
const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct MetaArtifact {
    format: String,
    version: u32,
    dimension: usize,
    next_id: EntryId,
    vector_count: usize,
    vectors_file: String,
    vectors_blake3: String,
    document_map: BTreeMap<EntryId, Chunk>,
}

/// What a completed save wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub entries: usize,
    pub next_id: EntryId,
    pub meta_file: PathBuf,
    pub vectors_file: PathBuf,
}

pub fn meta_path(base: &Path) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(".meta.json");
    PathBuf::from(name)
}

fn split_base(base: &Path) -> Result<(PathBuf, String)> {
    let stem = base
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::InvalidArgument(format!("index path has no file name: {}", base.display())))?;
    let dir = match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, stem))
}

pub(crate) fn write(state: &IndexState, base: &Path) -> Result<SaveReport> {
    let (dir, stem) = split_base(base)?;
    fs::create_dir_all(&dir)?;

    let bytes = encode_vectors(state);
    let checksum = blake3::hash(&bytes).to_hex().to_string();
    let vectors_name = format!("{}.{}.vectors", stem, &checksum[..HASH_PREFIX_LEN]);
    let vectors_file = dir.join(&vectors_name);
    write_atomic(&dir, &vectors_file, &bytes)?;

    let meta = MetaArtifact {
        format: FORMAT.to_string(),
        version: FORMAT_VERSION,
        dimension: state.dimension,
        next_id: state.next_id,
        vector_count: state.ids.len(),
        vectors_file: vectors_name.clone(),
        vectors_blake3: checksum,
        document_map: state.document_map.clone(),
    };
    let json = serde_json::to_vec(&meta).map_err(io::Error::other)?;
    let meta_file = meta_path(base);
    write_atomic(&dir, &meta_file, &json)?;

    remove_stale_vectors(&dir, &stem, &vectors_name);
    Ok(SaveReport { entries: state.ids.len(), next_id: state.next_id, meta_file, vectors_file })
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| Error::Io(e.error))?;
    #[cfg(unix)]
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

fn is_vectors_file_of(name: &str, stem: &str) -> bool {
    name.strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".vectors"))
        .map(|hash| hash.len() == HASH_PREFIX_LEN && hash.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

fn remove_stale_vectors(dir: &Path, stem: &str, keep: &str) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not list index dir for cleanup");
            return;
        }
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        if name != keep && is_vectors_file_of(&name, stem) {
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!(file = %name, error = %e, "could not remove stale vectors file");
            }
        }
    }
}

fn encode_vectors(state: &IndexState) -> Vec<u8> {
    let record = 8 + 4 * state.dimension;
    let mut out = Vec::with_capacity(20 + record * state.ids.len());
    out.extend_from_slice(VECTORS_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(state.dimension as u32).to_le_bytes());
    out.extend_from_slice(&(state.ids.len() as u64).to_le_bytes());
    for (id, v) in state.ids.iter().zip(state.vectors.chunks_exact(state.dimension)) {
        out.extend_from_slice(&id.to_le_bytes());
        for x in v {
            out.extend_from_slice(&x.to_le_bytes());
        }
    }
    out
}

fn corrupt(msg: impl Into<String>) -> Error { Error::CorruptIndex(msg.into()) }

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| corrupt("vectors file truncated"))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> { Ok(u32::from_le_bytes(self.take()?)) }
    fn u64(&mut self) -> Result<u64> { Ok(u64::from_le_bytes(self.take()?)) }
    fn f32(&mut self) -> Result<f32> { Ok(f32::from_le_bytes(self.take()?)) }
}

fn decode_vectors(bytes: &[u8], dimension: usize, count: usize) -> Result<(Vec<EntryId>, Vec<f32>)> {
    let mut cur = Cursor { buf: bytes, pos: 0 };
    if &cur.take::<4>()? != VECTORS_MAGIC {
        return Err(corrupt("vectors file has wrong magic"));
    }
    let version = cur.u32()?;
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("vectors file version {version}, expected {FORMAT_VERSION}")));
    }
    let file_dim = cur.u32()? as usize;
    if file_dim != dimension {
        return Err(corrupt(format!("vectors file dimension {file_dim}, metadata says {dimension}")));
    }
    let file_count = cur.u64()? as usize;
    if file_count != count {
        return Err(corrupt(format!("vectors file holds {file_count} vectors, metadata says {count}")));
    }
    let expected_len = 20 + count * (8 + 4 * dimension);
    if bytes.len() != expected_len {
        return Err(corrupt(format!("vectors file is {} bytes, expected {expected_len}", bytes.len())));
    }

    let mut ids = Vec::with_capacity(count);
    let mut vectors = Vec::with_capacity(count * dimension);
    for _ in 0..count {
        ids.push(cur.u64()?);
        for _ in 0..dimension {
            vectors.push(cur.f32()?);
        }
    }
    Ok((ids, vectors))
}

pub(crate) fn read(base: &Path) -> Result<IndexState> {
    let (dir, _) = split_base(base)?;
    let meta_file = meta_path(base);
    let raw = fs::read(&meta_file).map_err(|e| corrupt(format!("cannot read {}: {e}", meta_file.display())))?;
    let meta: MetaArtifact =
        serde_json::from_slice(&raw).map_err(|e| corrupt(format!("malformed {}: {e}", meta_file.display())))?;

    if meta.format != FORMAT || meta.version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format {} v{}", meta.format, meta.version)));
    }
    if meta.dimension == 0 {
        return Err(corrupt("recorded dimension is 0"));
    }
    if meta.vector_count != meta.document_map.len() {
        return Err(corrupt(format!(
            "{} vectors recorded but {} payloads",
            meta.vector_count,
            meta.document_map.len()
        )));
    }
    if Path::new(&meta.vectors_file).file_name().map(|n| n.to_string_lossy() != meta.vectors_file).unwrap_or(true) {
        return Err(corrupt(format!("vectors file name {:?} is not a plain file name", meta.vectors_file)));
    }

    let vectors_file = dir.join(&meta.vectors_file);
    let bytes = fs::read(&vectors_file).map_err(|e| corrupt(format!("cannot read {}: {e}", vectors_file.display())))?;
    if blake3::hash(&bytes).to_hex().as_str() != meta.vectors_blake3 {
        return Err(corrupt(format!("checksum mismatch for {}", vectors_file.display())));
    }
    let (ids, vectors) = decode_vectors(&bytes, meta.dimension, meta.vector_count)?;

    if !ids.iter().eq(meta.document_map.keys()) {
        return Err(corrupt("vector ids do not match payload ids"));
    }
    if ids.last().is_some_and(|last| *last >= meta.next_id) {
        return Err(corrupt(format!("id at or above next_id {}", meta.next_id)));
    }

    Ok(IndexState {
        dimension: meta.dimension,
        ids,
        vectors,
        document_map: meta.document_map,
        next_id: meta.next_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_path_appends_suffix() {
        assert_eq!(meta_path(Path::new("/data/store")), PathBuf::from("/data/store.meta.json"));
    }

    #[test]
    fn vectors_file_matching_is_strict() {
        assert!(is_vectors_file_of("store.0123456789abcdef.vectors", "store"));
        assert!(!is_vectors_file_of("store.v2.0123456789abcdef.vectors", "store"));
        assert!(!is_vectors_file_of("store.meta.json", "store"));
        assert!(!is_vectors_file_of("other.0123456789abcdef.vectors", "store"));
    }

    #[test]
    fn truncated_vectors_are_corrupt() {
        let state = IndexState {
            dimension: 2,
            ids: vec![0],
            vectors: vec![1.0, 2.0],
            document_map: BTreeMap::new(),
            next_id: 1,
        };
        let bytes = encode_vectors(&state);
        assert!(decode_vectors(&bytes, 2, 1).is_ok());
        assert!(matches!(decode_vectors(&bytes[..bytes.len() - 1], 2, 1), Err(Error::CorruptIndex(_))));
        assert!(matches!(decode_vectors(&bytes, 3, 1), Err(Error::CorruptIndex(_))));
    }
}
