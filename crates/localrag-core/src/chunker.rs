//! Sentence-respecting chunker.
//!
//! Text is segmented on Unicode sentence boundaries, then sentences are packed
//! greedily into chunks of at most `chunk_size` characters. A sentence is never
//! split: one longer than `chunk_size` becomes a chunk of its own. Up to
//! `overlap_chars` worth of whole trailing sentences are repeated at the start
//! of the following chunk.

use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::{Chunk, Meta, RESERVED_KEYS};

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        let s = ChunkingSettings::default();
        Self { chunk_size: s.chunk_size, overlap_chars: s.overlap_chars }
    }
}

/// Sentence range `[start, end)` of one chunk; the first `carried` sentences repeat the previous chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    carried: usize,
    end: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap_chars: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk_size must be > 0".into()));
        }
        Ok(Self { chunk_size, overlap_chars })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.overlap_chars)
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    pub fn overlap_chars(&self) -> usize { self.overlap_chars }

    /// Split `text` into chunks carrying `base_metadata`.
    ///
    /// Empty or whitespace-only text yields no chunks.
    pub fn chunk(&self, text: &str, base_metadata: &Meta) -> Vec<Chunk> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }
        let spans = self.pack(&sentences);
        let fingerprint = document_fingerprint(text);

        let mut metadata = base_metadata.clone();
        for key in RESERVED_KEYS {
            metadata.remove(key);
        }

        let total_chunks = spans.len();
        let chunks: Vec<Chunk> = spans
            .iter()
            .enumerate()
            .map(|(chunk_index, span)| {
                let text = sentences[span.start..span.end].join(" ");
                let overlap_len = if span.carried == 0 {
                    0
                } else {
                    sentences[span.start..span.start + span.carried].join(" ").len() + 1
                };
                Chunk {
                    text,
                    chunk_id: format!("{}_{}", fingerprint, chunk_index),
                    chunk_index,
                    total_chunks,
                    overlap_len,
                    metadata: metadata.clone(),
                }
            })
            .collect();
        debug!(sentences = sentences.len(), chunks = chunks.len(), "chunked document");
        chunks
    }

    fn pack(&self, sentences: &[&str]) -> Vec<Span> {
        let lens: Vec<usize> = sentences.iter().map(|s| s.chars().count()).collect();
        let mut spans = Vec::new();
        let mut start = 0usize;
        let mut carried = 0usize;
        let mut buf_len = 0usize;

        for i in 0..lens.len() {
            let grown = if i == start { lens[i] } else { buf_len + 1 + lens[i] };
            let fresh = i - start - carried;
            if i > start && fresh > 0 && grown > self.chunk_size {
                spans.push(Span { start, carried, end: i });

                let mut k = i;
                let mut carry_len = 0usize;
                while k > start + carried {
                    let candidate = if carry_len == 0 { lens[k - 1] } else { carry_len + 1 + lens[k - 1] };
                    if candidate > self.overlap_chars || candidate + 1 + lens[i] > self.chunk_size {
                        break;
                    }
                    carry_len = candidate;
                    k -= 1;
                }
                start = k;
                carried = i - k;
                buf_len = if carried == 0 { lens[i] } else { carry_len + 1 + lens[i] };
            } else {
                buf_len = grown;
            }
        }
        if lens.len() > start + carried {
            spans.push(Span { start, carried, end: lens.len() });
        }
        spans
    }
}

/// Hex BLAKE3 digest of the whole document, shared by all of its chunk ids.
pub fn document_fingerprint(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
