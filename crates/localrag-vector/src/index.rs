//! Exact, append-only flat index.
//!
//! Every query scans all stored vectors (O(n) per search) and ranks by squared
//! Euclidean distance, ties broken by ascending id.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use localrag_core::error::{Error, Result};
use localrag_core::types::{Chunk, EntryId, IndexStats, SearchHit};

use crate::persist::{self, SaveReport};

/// Vectors and payloads, always the same length; `ids[i]` owns `vectors[i*dim..(i+1)*dim]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndexState {
    pub(crate) dimension: usize,
    pub(crate) ids: Vec<EntryId>,
    pub(crate) vectors: Vec<f32>,
    pub(crate) document_map: BTreeMap<EntryId, Chunk>,
    pub(crate) next_id: EntryId,
}

impl IndexState {
    fn empty(dimension: usize) -> Self {
        Self { dimension, ids: Vec::new(), vectors: Vec::new(), document_map: BTreeMap::new(), next_id: 0 }
    }
}

pub struct VectorIndex {
    state: RwLock<IndexState>,
    // Serializes saves so an older snapshot never commits after a newer one.
    save_lock: Mutex<()>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidArgument("dimension must be > 0".into()));
        }
        Ok(Self::from_state(IndexState::empty(dimension)))
    }

    pub(crate) fn from_state(state: IndexState) -> Self {
        Self { state: RwLock::new(state), save_lock: Mutex::new(()) }
    }

    pub fn dimension(&self) -> usize { self.state.read().dimension }

    /// Number of stored vectors (always equal to the number of payloads).
    pub fn len(&self) -> usize { self.state.read().ids.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn next_id(&self) -> EntryId { self.state.read().next_id }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats { vectors: state.ids.len(), next_id: state.next_id, dimension: state.dimension }
    }

    pub fn payload(&self, id: EntryId) -> Option<Chunk> { self.state.read().document_map.get(&id).cloned() }

    pub fn document_map(&self) -> BTreeMap<EntryId, Chunk> { self.state.read().document_map.clone() }

    /// Append a batch. Either every pair is stored under consecutive ids
    /// starting at `next_id`, or nothing changes.
    ///
    /// Payloads must pass [`Chunk::validate`], so that a saved index always loads.
    pub fn add(&self, vectors: Vec<Vec<f32>>, payloads: Vec<Chunk>) -> Result<Vec<EntryId>> {
        if vectors.len() != payloads.len() {
            return Err(Error::batch_mismatch(vectors.len(), payloads.len()));
        }
        for payload in &payloads {
            payload.validate()?;
        }
        let mut state = self.state.write();
        let dim = state.dimension;
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
        }

        let first = state.next_id;
        let ids: Vec<EntryId> = (first..first + vectors.len() as EntryId).collect();
        state.vectors.reserve(vectors.len() * dim);
        for v in &vectors {
            state.vectors.extend_from_slice(v);
        }
        state.ids.extend_from_slice(&ids);
        for (id, payload) in ids.iter().zip(payloads) {
            state.document_map.insert(*id, payload);
        }
        state.next_id = first + ids.len() as EntryId;
        debug!(added = ids.len(), next_id = state.next_id, "index add");
        Ok(ids)
    }

    /// Up to `k` nearest entries by squared L2 distance, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be >= 1".into()));
        }
        let state = self.state.read();
        if query.len() != state.dimension {
            return Err(Error::DimensionMismatch { expected: state.dimension, actual: query.len() });
        }

        let mut scored: Vec<(f32, EntryId)> = state
            .vectors
            .chunks_exact(state.dimension)
            .zip(state.ids.iter())
            .map(|(v, id)| (squared_l2(query, v), *id))
            .collect();
        let by_rank = |a: &(f32, EntryId), b: &(f32, EntryId)| -> Ordering { a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)) };
        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_rank);

        Ok(scored
            .into_iter()
            .filter_map(|(distance, id)| {
                state.document_map.get(&id).map(|payload| SearchHit { id, payload: payload.clone(), distance })
            })
            .collect())
    }

    pub(crate) fn snapshot(&self) -> IndexState { self.state.read().clone() }

    /// Write the index under base path `base` (see [`crate::persist`]).
    ///
    /// The state is copied under the read lock; serialization and disk I/O
    /// happen without holding it, so concurrent `add`/`search` are not blocked.
    pub fn save(&self, base: &Path) -> Result<SaveReport> {
        let _guard = self.save_lock.lock();
        let snapshot = self.snapshot();
        let report = persist::write(&snapshot, base)?;
        info!(entries = report.entries, next_id = report.next_id, path = %base.display(), "index saved");
        Ok(report)
    }

    /// Read an index previously written by [`VectorIndex::save`].
    pub fn load(base: &Path) -> Result<Self> {
        let state = persist::read(base)?;
        info!(entries = state.ids.len(), next_id = state.next_id, path = %base.display(), "index loaded");
        Ok(Self::from_state(state))
    }

    /// Swap in the full state of `other`; readers see either the old or the new index.
    pub fn replace_with(&self, other: VectorIndex) {
        let incoming = other.state.into_inner();
        *self.state.write() = incoming;
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
