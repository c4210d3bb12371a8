//! localrag-core
//!
//! Shared data model, error type, configuration and capability traits, plus
//! the sentence-respecting [`chunker::Chunker`] and the file [`loader`].

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use chunker::Chunker;
pub use error::{Error, Result};
pub use types::{Chunk, EntryId, IndexStats, Meta, MetaValue, SearchHit};
