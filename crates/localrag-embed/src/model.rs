use candle_core::Tensor;
use localrag_core::error::Result;

/// Per-token hidden states for a padded batch.
///
/// - `hidden`: `[B, T, H]`, `T` is the longest (truncated) sequence in the batch
/// - `attention_mask`: `[B, T]`, 1 for real tokens and 0 for padding
pub struct Encoded {
    pub hidden: Tensor,
    pub attention_mask: Tensor,
}

/// Token-level encoder the embedder pools over.
///
/// Implementations must pad to the longest sequence of the batch, truncate at
/// `max_tokens`, and report failures as `Error::Model`. Padding positions may
/// hold any value; they are excluded by the mask.
pub trait EncodingModel: Send + Sync {
    fn hidden_size(&self) -> usize;
    fn encode_batch(&self, texts: &[String], max_tokens: usize) -> Result<Encoded>;
}
