//! localrag-embed
//!
//! Text → vector: an [`EncodingModel`] produces per-token states for a padded
//! batch, [`masked_mean_l2`] pools them over the attention mask and
//! normalizes to unit length. [`PooledEmbedder`] ties the two together and
//! implements the core `Embedder` trait.

use std::sync::Arc;

use candle_core::{DType, Device};
use tracing::{debug, info};

use localrag_core::config::EmbeddingSettings;
use localrag_core::error::{Error, Result};
use localrag_core::traits::Embedder;

pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;
pub mod xlm_roberta;

pub use hash::HashEncoder;
pub use model::{Encoded, EncodingModel};
pub use pool::masked_mean_l2;
pub use xlm_roberta::XlmRobertaEncoder;

pub struct PooledEmbedder {
    model: Arc<dyn EncodingModel>,
    dim: usize,
    max_tokens: usize,
    batch_size: usize,
}

impl PooledEmbedder {
    /// Fails with `Error::Model` if the model reports no hidden size.
    pub fn new(model: Arc<dyn EncodingModel>, settings: &EmbeddingSettings) -> Result<Self> {
        let dim = model.hidden_size();
        if dim == 0 {
            return Err(Error::Model("encoding model reports hidden size 0".into()));
        }
        if settings.max_tokens == 0 || settings.batch_size == 0 {
            return Err(Error::Config("embedding.max_tokens and embedding.batch_size must be > 0".into()));
        }
        Ok(Self { model, dim, max_tokens: settings.max_tokens, batch_size: settings.batch_size })
    }

    /// Embed `texts` in order. Empty input gives empty output.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let encoded = self.model.encode_batch(batch, self.max_tokens)?;
            let pooled = masked_mean_l2(&encoded.hidden, &encoded.attention_mask)?;
            let rows: Vec<Vec<f32>> = pooled
                .to_dtype(DType::F32)
                .and_then(|t| t.to_device(&Device::Cpu))
                .and_then(|t| t.to_vec2())
                .map_err(|e| Error::Model(format!("reading pooled embeddings: {e}")))?;
            if rows.len() != batch.len() {
                return Err(Error::Model(format!("model returned {} rows for {} texts", rows.len(), batch.len())));
            }
            if let Some(bad) = rows.iter().find(|r| r.len() != self.dim) {
                return Err(Error::DimensionMismatch { expected: self.dim, actual: bad.len() });
            }
            debug!(batch = batch.len(), "embedded batch");
            out.extend(rows);
        }
        Ok(out)
    }

    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::Model("no embedding produced for query".into()))
    }
}

impl Embedder for PooledEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_tokens }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { self.embed(texts) }
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> { PooledEmbedder::embed_query(self, text) }
}

fn fake_requested(settings: &EmbeddingSettings) -> bool {
    settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

/// The configured embedder: the hash encoder when fakes are requested
/// (`embedding.use_fake` or `APP_USE_FAKE_EMBEDDINGS=1`), otherwise the
/// XLM-RoBERTa encoder from the resolved model directory.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    let model: Arc<dyn EncodingModel> = if fake_requested(settings) {
        info!(dim = settings.fake_dim, "using hash encoder");
        Arc::new(HashEncoder::new(settings.fake_dim))
    } else {
        let dir = xlm_roberta::resolve_model_dir(settings)?;
        Arc::new(XlmRobertaEncoder::load(&dir).map_err(|e| Error::Model(format!("{e:#}")))?)
    };
    Ok(Box::new(PooledEmbedder::new(model, settings)?))
}
