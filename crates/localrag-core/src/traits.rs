use std::path::Path;

use crate::error::Result;

/// Maps texts to L2-normalized vectors of a fixed dimension.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| crate::error::Error::Model("embedder returned no vector for query".into()))
    }
}

/// Extracts plain text from documents that are not plain text already
/// (PDF, DOCX, ...). Failures are reported as [`crate::error::Error::Parse`].
pub trait DocumentParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<String>;
}
