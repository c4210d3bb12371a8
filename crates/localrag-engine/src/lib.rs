//! localrag-engine
//!
//! [`RagEngine`] wires the chunker, an embedder and the vector index into the
//! ingest and query pipelines, and exposes index persistence.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use localrag_core::config::Settings;
use localrag_core::error::{Error, Result};
use localrag_core::loader::load_document;
use localrag_core::traits::{DocumentParser, Embedder};
use localrag_core::{Chunker, EntryId, IndexStats, Meta, SearchHit};
use localrag_vector::{SaveReport, VectorIndex};

pub struct RagEngine {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    parser: Option<Arc<dyn DocumentParser>>,
}

impl RagEngine {
    /// The embedder's dimension must match the index's.
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Result<Self> {
        if embedder.dim() != index.dimension() {
            return Err(Error::DimensionMismatch { expected: index.dimension(), actual: embedder.dim() });
        }
        Ok(Self { chunker, embedder, index, parser: None })
    }

    /// Fresh empty index of the embedder's dimension, chunker from `settings.chunking`.
    pub fn from_settings(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let chunker = Chunker::from_settings(&settings.chunking)?;
        let index = Arc::new(VectorIndex::new(embedder.dim())?);
        Self::new(chunker, embedder, index)
    }

    /// Parser for file types that are not plain text.
    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> { &self.index }

    pub fn chunker(&self) -> &Chunker { &self.chunker }

    /// Load, chunk, embed and index one file. Returns the assigned ids.
    pub fn ingest(&self, path: &Path, metadata: &Meta) -> Result<Vec<EntryId>> {
        let doc = load_document(path, metadata, self.parser.as_deref())?;
        let ids = self.ingest_text(&doc.text, &doc.metadata)?;
        info!(path = %path.display(), chunks = ids.len(), "ingested document");
        Ok(ids)
    }

    /// Chunk, embed and index already extracted text.
    pub fn ingest_text(&self, text: &str, metadata: &Meta) -> Result<Vec<EntryId>> {
        let chunks = self.chunker.chunk(text, metadata);
        if chunks.is_empty() {
            debug!("nothing to index");
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        // Embedding happens before the index lock is taken.
        let vectors = self.embedder.embed_batch(&texts)?;
        self.index.add(vectors, chunks)
    }

    /// The `top_k` chunks nearest to `text`, nearest first.
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be >= 1".into()));
        }
        let q = self.embedder.embed_query(text)?;
        let hits = self.index.search(&q, top_k)?;
        debug!(top_k, hits = hits.len(), "query");
        Ok(hits)
    }

    pub fn persist(&self, base: &Path) -> Result<SaveReport> { self.index.save(base) }

    /// Replace the live index with the one saved at `base`. On any failure
    /// the live index is left as it was.
    pub fn restore(&self, base: &Path) -> Result<IndexStats> {
        let loaded = VectorIndex::load(base)?;
        if loaded.dimension() != self.embedder.dim() {
            return Err(Error::DimensionMismatch { expected: self.embedder.dim(), actual: loaded.dimension() });
        }
        self.index.replace_with(loaded);
        Ok(self.index.stats())
    }

    pub fn stats(&self) -> IndexStats { self.index.stats() }
}
