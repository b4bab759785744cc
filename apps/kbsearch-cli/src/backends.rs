use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use kbsearch_core::config::{resolve_with_base, Config, LexicalBackendKind, VectorBackendKind};
use kbsearch_core::traits::{LexicalSearcher, VectorSearcher};
use kbsearch_core::weight::{TermStats, TermStatsHandle};
use kbsearch_hybrid::Dealer;
use kbsearch_text::{MemoryLexicalSearcher, TantivyLexicalSearcher};
use kbsearch_vector::{LanceVectorSearcher, MemoryVectorSearcher};

/// Builds the dealer described by `[retrieval]`, `[backends]` and `[rerank]`.
/// Relative paths resolve against `base`.
pub async fn build_dealer(config: &Config, base: &Path) -> anyhow::Result<Dealer> {
    let retrieval = config.retrieval()?;
    let backends = config.backends()?;

    let (lexical, stats): (Arc<dyn LexicalSearcher>, TermStats) = match backends.lexical {
        LexicalBackendKind::Tantivy => {
            let dir = resolve_with_base(base, &backends.tantivy_index_dir);
            let searcher = TantivyLexicalSearcher::open(&dir)
                .with_context(|| format!("opening tantivy index at {}", dir.display()))?;
            let stats = searcher.load_term_stats()?;
            (Arc::new(searcher), stats)
        }
        LexicalBackendKind::Memory => {
            let path = resolve_with_base(base, &backends.corpus_path);
            let searcher = MemoryLexicalSearcher::from_jsonl(&path)?;
            let stats = searcher.term_stats().clone();
            (Arc::new(searcher), stats)
        }
    };

    let vector: Arc<dyn VectorSearcher> = match backends.vector {
        VectorBackendKind::Lancedb => {
            let dir = resolve_with_base(base, &backends.lancedb_dir);
            let uri = dir.to_string_lossy();
            Arc::new(
                LanceVectorSearcher::open(&uri, &backends.lancedb_table, retrieval.similarity_metric)
                    .await
                    .with_context(|| format!("opening lancedb table {} at {}", backends.lancedb_table, uri))?,
            )
        }
        VectorBackendKind::Memory => {
            let path = resolve_with_base(base, &backends.corpus_path);
            Arc::new(MemoryVectorSearcher::from_jsonl(&path, retrieval.similarity_metric)?)
        }
    };

    tracing::info!(
        lexical = ?backends.lexical,
        vector = ?backends.vector,
        docs = stats.doc_count,
        terms = stats.doc_freq.len(),
        "backends ready"
    );
    let reranker = kbsearch_rerank::from_config(&config.rerank()?, retrieval.rerank_timeout_ms)?;
    let dealer = Dealer::new(retrieval, lexical, vector, Arc::new(TermStatsHandle::new(stats)))?;
    Ok(dealer.with_reranker(reranker))
}
