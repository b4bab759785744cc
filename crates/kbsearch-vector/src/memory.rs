//! Brute-force vector searcher over an in-memory chunk snapshot.

use anyhow::Result;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use kbsearch_core::config::SimilarityMetric;
use kbsearch_core::corpus::load_jsonl;
use kbsearch_core::traits::VectorSearcher;
use kbsearch_core::types::{Chunk, Filters, Scope, SearchHit, SourceKind};

pub struct MemoryVectorSearcher {
    chunks: Arc<Vec<Chunk>>,
    metric: SimilarityMetric,
}

impl MemoryVectorSearcher {
    pub fn new(chunks: Vec<Chunk>, metric: SimilarityMetric) -> Self {
        Self { chunks: Arc::new(chunks), metric }
    }

    pub fn from_jsonl(path: &Path, metric: SimilarityMetric) -> Result<Self> {
        Ok(Self::new(load_jsonl(path)?, metric))
    }
}

#[async_trait]
impl VectorSearcher for MemoryVectorSearcher {
    async fn search_vec(&self, embedding: &[f32], scope: &Scope, filters: &Filters, limit: usize) -> Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .chunks
            .iter()
            .filter(|c| scope.contains(c) && filters.matches(c))
            .filter_map(|c| {
                // Chunks not yet embedded, or embedded with another dimension, are invisible here.
                let score = self.metric.score(embedding, c.embedding.as_deref()?)?;
                Some(SearchHit { chunk: c.clone(), score, source: SourceKind::Vector })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbsearch_core::types::{Meta, TermWeights};

    fn chunk(id: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: id.to_string(),
            kb_id: "kb".to_string(),
            doc_id: "d".to_string(),
            doc_name: "d.txt".to_string(),
            text: String::new(),
            position: 0,
            embedding,
            term_vector: TermWeights::new(),
            metadata: Meta::new(),
        }
    }

    #[tokio::test]
    async fn nearest_first_and_unembedded_skipped() {
        let s = MemoryVectorSearcher::new(
            vec![
                chunk("far", Some(vec![0.0, 1.0])),
                chunk("near", Some(vec![1.0, 0.1])),
                chunk("none", None),
                chunk("short", Some(vec![1.0])),
            ],
            SimilarityMetric::Cosine,
        );
        let hits = s.search_vec(&[1.0, 0.0], &Scope::knowledge_bases(["kb"]), &Filters::default(), 10).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn inner_product_keeps_magnitude() {
        let s = MemoryVectorSearcher::new(
            vec![chunk("small", Some(vec![1.0, 0.0])), chunk("big", Some(vec![3.0, 0.0]))],
            SimilarityMetric::InnerProduct,
        );
        let hits = s.search_vec(&[1.0, 0.0], &Scope::knowledge_bases(["kb"]), &Filters::default(), 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "big");
    }
}
