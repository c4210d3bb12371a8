use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use localrag_core::config::{expand_path, EmbeddingSettings};
use localrag_core::error::Error;

use crate::device::select_device;
use crate::model::{Encoded, EncodingModel};
use crate::tokenize::tokenize_batch_on_device;

/// XLM-RoBERTa encoder (e.g. BGE-M3) loaded from a local model directory holding
/// `tokenizer.json`, `config.json` and `model.safetensors` or `pytorch_model.bin`.
pub struct XlmRobertaEncoder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
    pad_id: u32,
}

impl XlmRobertaEncoder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading XLM-RoBERTa encoder");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.token_to_id("<pad>").unwrap_or(1);

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(hidden_size, "encoder loaded");
        Ok(Self { model, tokenizer, device, hidden_size, pad_id })
    }

    fn forward(&self, texts: &[String], max_tokens: usize) -> Result<Encoded> {
        let (input_ids, attention_mask) =
            tokenize_batch_on_device(&self.tokenizer, texts, max_tokens, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        debug!(shape = ?hidden.dims(), "encoded batch");
        Ok(Encoded { hidden, attention_mask })
    }
}

impl EncodingModel for XlmRobertaEncoder {
    fn hidden_size(&self) -> usize { self.hidden_size }

    fn encode_batch(&self, texts: &[String], max_tokens: usize) -> localrag_core::Result<Encoded> {
        self.forward(texts, max_tokens).map_err(|e| Error::Model(format!("{e:#}")))
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&pickle).with_context(|| format!("reading {}", pickle.display()))?;
    Ok(weights.into_iter().collect())
}

/// Locate the model directory: `embedding.model_dir`, then `APP_MODEL_DIR`,
/// `MODEL_DIR`, then `models/encoder` under the working directory.
pub fn resolve_model_dir(settings: &EmbeddingSettings) -> localrag_core::Result<PathBuf> {
    let candidates = settings
        .model_dir
        .iter()
        .cloned()
        .chain(std::env::var("APP_MODEL_DIR").ok())
        .chain(std::env::var("MODEL_DIR").ok())
        .chain(std::iter::once("models/encoder".to_string()));
    for candidate in candidates {
        let p = expand_path(&candidate);
        if p.exists() {
            debug!(dir = %p.display(), "using model dir");
            return Ok(p);
        }
    }
    Err(Error::Model("Could not locate encoder model directory".into()))
}
