use std::hash::{Hash, Hasher};

use candle_core::{Device, Tensor};
use twox_hash::XxHash64;

use localrag_core::error::{Error, Result};

use crate::model::{Encoded, EncodingModel};

const SLOTS_PER_TOKEN: u64 = 4;
/// Leading slot attended in every row, so blank text still pools to a unit vector.
const SENTINEL: &str = "\u{0}[CLS]";

/// Deterministic stand-in encoder: whitespace tokens hashed into sparse
/// pseudo-random token vectors. Fast, model-free, and stable across runs.
///
/// Every row starts with a fixed sentinel token, which counts toward `max_tokens`.
pub struct HashEncoder {
    dim: usize,
}

impl HashEncoder {
    pub fn new(dim: usize) -> Self { Self { dim } }

    fn token_vector(&self, token: &str, out: &mut [f32]) {
        for seed in 0..SLOTS_PER_TOKEN {
            let mut hasher = XxHash64::with_seed(seed);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32) - 0.5;
            out[idx] += val;
        }
    }
}

impl EncodingModel for HashEncoder {
    fn hidden_size(&self) -> usize { self.dim }

    fn encode_batch(&self, texts: &[String], max_tokens: usize) -> Result<Encoded> {
        if self.dim == 0 {
            return Err(Error::Model("hash encoder dimension is 0".into()));
        }
        let body = max_tokens.saturating_sub(1);
        let tokens: Vec<Vec<&str>> = texts
            .iter()
            .map(|t| std::iter::once(SENTINEL).chain(t.split_whitespace().take(body)).collect())
            .collect();
        let width = tokens.iter().map(Vec::len).max().unwrap_or(1);
        let batch = texts.len();

        let mut hidden = vec![0f32; batch * width * self.dim];
        let mut mask = vec![0u32; batch * width];
        for (b, row) in tokens.iter().enumerate() {
            for (t, token) in row.iter().enumerate() {
                let offset = (b * width + t) * self.dim;
                self.token_vector(token, &mut hidden[offset..offset + self.dim]);
                mask[b * width + t] = 1;
            }
        }
        let to_model_err = |e: candle_core::Error| Error::Model(e.to_string());
        let hidden = Tensor::from_vec(hidden, (batch, width, self.dim), &Device::Cpu).map_err(to_model_err)?;
        let attention_mask = Tensor::from_vec(mask, (batch, width), &Device::Cpu).map_err(to_model_err)?;
        Ok(Encoded { hidden, attention_mask })
    }
}
