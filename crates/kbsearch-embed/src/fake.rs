use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use kbsearch_core::traits::Embedder;

/// Deterministic hashing embedder for tests and offline runs. Texts sharing
/// tokens land close together, which is enough to exercise vector search.
pub struct FakeEmbedder {
    dim: usize,
    max_len: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), max_len: 256 }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().take(self.max_len).enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
