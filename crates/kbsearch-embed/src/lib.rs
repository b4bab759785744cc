//! Query embedding for the vector searcher: a BGE-M3 (XLM-RoBERTa) model on
//! candle, plus a hashing stand-in selected by `APP_USE_FAKE_EMBEDDINGS`.

mod device;
mod fake;
mod pool;
mod tokenize;

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use kbsearch_core::config::{expand_path, EmbedConfig};
use kbsearch_core::traits::Embedder;

pub use device::select_device;
pub use fake::FakeEmbedder;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_on_device;

pub struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl EmbeddingModel {
    pub fn load(cfg: &EmbedConfig) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(cfg.model_dir.as_deref())?;
        tracing::info!(model_dir = %model_dir.display(), "loading BGE-M3 model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw)?;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&weights_path)
            .with_context(|| format!("reading {}", weights_path.display()))?
            .into_iter()
            .collect();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        tracing::info!(dim = cfg.dim, max_len = cfg.max_len, "BGE-M3 model loaded");

        Ok(Self { model, tokenizer, device, dim: cfg.dim, max_len: cfg.max_len })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros((1, self.max_len), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if emb.len() != self.dim {
            bail!("model produced {} dims, expected {}", emb.len(), self.dim);
        }
        let elapsed = start.elapsed().as_millis();
        if elapsed > 100 {
            tracing::warn!(elapsed_ms = elapsed as u64, "slow embedding");
        }
        Ok(emb)
    }
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn get_default_embedder(cfg: &EmbedConfig) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() {
        tracing::info!(dim = cfg.dim, "using FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::new(cfg.dim)));
    }
    Ok(Box::new(EmbeddingModel::load(cfg)?))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() {
            return Ok(p);
        }
        bail!("configured embed.model_dir {} does not exist", p.display());
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                return Ok(p);
            }
        }
    }
    let root = Path::new("../models/bge-m3");
    if root.exists() {
        return Ok(root.to_path_buf());
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
