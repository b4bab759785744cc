//! Capability traits implemented by the backend crates.
//!
//! The dealer only sees these contracts; which implementation sits behind
//! them is chosen from configuration when the dealer is built.

use async_trait::async_trait;

use crate::types::{Chunk, Filters, Query, Scope, SearchHit};

/// Lexical candidate generation over a knowledge-base index.
#[async_trait]
pub trait LexicalSearcher: Send + Sync {
    /// Up to `limit` chunks matching the query's weighted terms inside `scope`.
    /// Zero matches is an empty vector, not an error.
    async fn search(&self, query: &Query, scope: &Scope, limit: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Nearest-neighbour candidate generation over chunk embeddings.
#[async_trait]
pub trait VectorSearcher: Send + Sync {
    async fn search_vec(
        &self,
        embedding: &[f32],
        scope: &Scope,
        filters: &Filters,
        limit: usize,
    ) -> anyhow::Result<Vec<SearchHit>>;
}

/// Higher-precision scoring of a shortlist.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score per chunk, aligned with `chunks`. Higher is better.
    async fn rerank(&self, query: &Query, chunks: &[&Chunk]) -> anyhow::Result<Vec<f32>>;
}

/// Text to embedding conversion, used by front-ends before calling the dealer.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
