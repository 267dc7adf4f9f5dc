//! BGE-M3 (XLM-RoBERTa) sentence embeddings on candle.

use anyhow::{Result, anyhow, ensure};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use mosaic_core::traits::EmbeddingProvider;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    dim: usize,
    version: String,
}

impl BgeM3Embedder {
    /// Load `tokenizer.json`, `config.json` and `pytorch_model.bin` from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)
            .map_err(|e| anyhow!("Invalid model config {}: {}", config_path.display(), e))?;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&weights_path)
            .map_err(|e| anyhow!("Failed to read weights {}: {}", weights_path.display(), e))?
            .into_iter()
            .collect();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;

        let dim = config.hidden_size;
        let name = model_dir.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "bge-m3".to_string());
        let version = format!("{name}-l{max_len}-d{dim}");
        tracing::info!(%version, "embedding model loaded");
        Ok(Self { model, tokenizer, device, max_len, dim, version })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros(input_ids.dims(), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        ensure!(rows.len() == texts.len(), "model returned {} rows for {} texts", rows.len(), texts.len());
        tracing::debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(rows)
    }
}

impl EmbeddingProvider for BgeM3Embedder {
    fn model_version(&self) -> &str { &self.version }
    fn dim(&self) -> usize { self.dim }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        self.embed_batch(texts)
    }
}
