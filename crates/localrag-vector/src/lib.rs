//! localrag-vector
//!
//! Exact L2 nearest-neighbour index over fixed-dimension vectors, each paired
//! with a [`localrag_core::Chunk`] payload, plus its crash-safe on-disk form
//! and a background saver.

pub mod index;
pub mod persist;
pub mod persister;

pub use index::VectorIndex;
pub use persist::{meta_path, SaveReport};
pub use persister::{BackgroundPersister, SaveHandle, SaveOutcome};
