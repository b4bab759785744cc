//! Rerankers for the dealer's shortlist.

mod http;
mod hybrid;

use std::sync::Arc;

use async_trait::async_trait;

use kbsearch_core::config::{RerankConfig, RerankKind};
use kbsearch_core::traits::Reranker;
use kbsearch_core::types::{Chunk, Query};

pub use http::{parse_rerank_response, HttpReranker};
pub use hybrid::{token_similarity, HybridSimilarityReranker};

/// Pass-through reranker: scores strictly decrease with input position, so
/// the shortlist keeps its fused order.
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    async fn rerank(&self, _query: &Query, chunks: &[&Chunk]) -> anyhow::Result<Vec<f32>> {
        let n = chunks.len();
        Ok((0..n).map(|i| (n - i) as f32).collect())
    }
}

/// Builds the configured reranker. `None` when reranking is disabled.
pub fn from_config(cfg: &RerankConfig, timeout_ms: u64) -> anyhow::Result<Option<Arc<dyn Reranker>>> {
    let reranker: Arc<dyn Reranker> = match cfg.kind {
        RerankKind::None => return Ok(None),
        RerankKind::Http => Arc::new(HttpReranker::new(cfg, timeout_ms)?),
        RerankKind::HybridSimilarity => Arc::new(HybridSimilarityReranker::new(cfg.token_weight)?),
    };
    tracing::debug!(kind = ?cfg.kind, "reranker configured");
    Ok(Some(reranker))
}
