use std::collections::BTreeSet;

use anyhow::bail;
use async_trait::async_trait;

use kbsearch_core::config::SimilarityMetric;
use kbsearch_core::tokenize::tokenize;
use kbsearch_core::traits::Reranker;
use kbsearch_core::types::{Chunk, Query};

/// Local reranker mixing weighted term overlap with embedding similarity:
/// `token_weight * token_sim + (1 - token_weight) * cosine`.
///
/// Chunks without a comparable embedding fall back to the token part alone.
pub struct HybridSimilarityReranker {
    token_weight: f32,
}

impl HybridSimilarityReranker {
    pub fn new(token_weight: f32) -> anyhow::Result<Self> {
        if !(0.0..=1.0).contains(&token_weight) {
            bail!("rerank.token_weight must be within [0, 1], got {token_weight}");
        }
        Ok(Self { token_weight })
    }

    fn score(&self, query: &Query, chunk: &Chunk) -> f32 {
        let token = token_similarity(query, &chunk.text);
        let vector = query
            .embedding
            .as_deref()
            .zip(chunk.embedding.as_deref())
            .and_then(|(q, c)| SimilarityMetric::Cosine.score(q, c));
        match vector {
            Some(v) => self.token_weight * token + (1.0 - self.token_weight) * v.max(0.0),
            None => token,
        }
    }
}

#[async_trait]
impl Reranker for HybridSimilarityReranker {
    async fn rerank(&self, query: &Query, chunks: &[&Chunk]) -> anyhow::Result<Vec<f32>> {
        Ok(chunks.iter().map(|c| self.score(query, c)).collect())
    }
}

/// Share of the query's term weight found in `text`, within `[0, 1]`.
/// Unweighted queries count every distinct token equally.
pub fn token_similarity(query: &Query, text: &str) -> f32 {
    let tokens: BTreeSet<String> = tokenize(text).into_iter().collect();
    if query.terms.is_empty() {
        let q: BTreeSet<String> = tokenize(&query.text).into_iter().collect();
        if q.is_empty() {
            return 0.0;
        }
        return q.intersection(&tokens).count() as f32 / q.len() as f32;
    }
    let total: f32 = query.terms.values().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let hit: f32 = query
        .terms
        .iter()
        .filter(|(t, w)| **w > 0.0 && tokens.contains(t.as_str()))
        .map(|(_, w)| *w)
        .sum();
    hit / total
}
