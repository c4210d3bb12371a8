use thiserror::Error;

/// Failure kinds shared by every localrag component.
///
/// None of these are retried internally. A call that returns one of them
/// leaves the index exactly as it was before the call.
#[derive(Debug, Error)]
pub enum Error {
    /// The document could not be read or its type is not supported.
    #[error("Failed to parse document: {0}")]
    Parse(String),

    /// The encoding model is missing, failed to load, or failed during inference.
    #[error("Encoding model error: {0}")]
    Model(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Persisted index artifacts are missing, unreadable or inconsistent.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Vector batch and payload batch lengths disagree.
    pub fn batch_mismatch(vectors: usize, payloads: usize) -> Self {
        Error::DimensionMismatch { expected: vectors, actual: payloads }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
