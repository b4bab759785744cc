use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kbsearch_core::config::RetrievalConfig;
use kbsearch_core::tokenize::tokenize;
use kbsearch_core::traits::{LexicalSearcher, Reranker, VectorSearcher};
use kbsearch_core::types::{
    Query, RerankOutcome, Scope, SearchHit, SearchOptions, SearchResult, Signals, TermWeights,
};
use kbsearch_core::weight::{term_weights, TermStats, TermStatsHandle};
use kbsearch_core::{BackendFailure, BackendKind, Error, Result};

use crate::citation::{doc_aggs, highlight, map_citations};
use crate::dedup::dedup;
use crate::fusion::{fuse, BackendOutcome};
use crate::rerank::rerank_head;
use crate::stage::{QueryTrace, Stage};

/// Coordinates the two searchers, fusion, dedup, optional rerank and
/// citation mapping for one query at a time. Shareable across tasks.
pub struct Dealer {
    config: RetrievalConfig,
    lexical: Arc<dyn LexicalSearcher>,
    vector: Arc<dyn VectorSearcher>,
    reranker: Option<Arc<dyn Reranker>>,
    term_stats: Arc<TermStatsHandle>,
}

impl Dealer {
    pub fn new(
        config: RetrievalConfig,
        lexical: Arc<dyn LexicalSearcher>,
        vector: Arc<dyn VectorSearcher>,
        term_stats: Arc<TermStatsHandle>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, lexical, vector, reranker: None, term_stats })
    }

    pub fn with_reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// The statistics handle used for query term weighting; refresh it with
    /// `TermStatsHandle::replace` while queries are running.
    pub fn term_stats(&self) -> &Arc<TermStatsHandle> {
        &self.term_stats
    }

    /// Runs the full pipeline for `query` within `scope`, returning at most
    /// `top_k` candidates.
    ///
    /// A single failed or timed-out searcher degrades fusion and is reported in
    /// `signals.degraded`; both failing is `Error::AllBackendsUnavailable`.
    /// Rerank failures never fail the query. Dropping the returned future
    /// abandons any in-flight backend calls.
    pub async fn search(
        &self,
        query: &Query,
        scope: &Scope,
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<SearchResult> {
        self.validate(query, top_k, options)?;
        if scope.is_empty() {
            tracing::info!("scope resolves to no knowledge base or document");
            return Ok(SearchResult::empty_scope());
        }

        let stats = self.term_stats.snapshot();
        let terms = query_terms(&stats, query);
        if terms.is_empty() && query.embedding.is_none() {
            return Err(Error::InvalidQuery("query has no searchable terms and no embedding".to_string()));
        }
        let prepared = Query { terms, ..query.clone() };

        let mut trace = QueryTrace::dispatch();
        let ((lexical, lexical_ms), (vector, vector_ms)) =
            tokio::join!(self.lexical_call(&prepared, scope), self.vector_call(&prepared, scope));
        trace.advance(Stage::BackendsReturned);
        let lexical = lexical.map(|hits| in_scope(hits, scope, &prepared));
        let vector = vector.map(|hits| in_scope(hits, scope, &prepared));

        let fused = match fuse(lexical, vector, &self.config) {
            Ok(f) => f,
            Err(e) => {
                trace.advance(Stage::Failed);
                tracing::error!(error = %e, lexical_ms, vector_ms, "search failed");
                return Err(e);
            }
        };
        trace.advance(Stage::Fused);
        if let Some(failure) = &fused.degraded {
            tracing::warn!(error = %Error::from(failure.clone()), "fusion degraded to a single signal");
        }

        let mut candidates = fused.candidates;
        let before = candidates.len();
        if let Some(min) = options.similarity_threshold {
            candidates.retain(|c| c.fused_score >= min);
        }
        let below_threshold = before - candidates.len();

        let deduped = dedup(candidates, self.config.dedup_threshold, self.config.dedup_exact_limit);
        trace.advance(Stage::Deduplicated);

        let rerank_start = Instant::now();
        let (mut candidates, rerank) = match (options.rerank, &self.reranker) {
            (false, _) => (deduped.kept, RerankOutcome::NotRequested),
            (true, None) => {
                let failure = BackendFailure::skipped(BackendKind::Rerank, "no reranker configured");
                (deduped.kept, RerankOutcome::Skipped { failure })
            }
            (true, Some(reranker)) => {
                let top_n = options.rerank_top_n.unwrap_or(self.config.rerank_top_n);
                let timeout = Duration::from_millis(self.config.rerank_timeout_ms);
                rerank_head(reranker.as_ref(), &prepared, deduped.kept, top_n, timeout).await
            }
        };
        let rerank_ms = rerank_start.elapsed().as_millis() as u64;
        if let RerankOutcome::Skipped { failure } = &rerank {
            tracing::warn!(error = %Error::from(failure.clone()), "rerank skipped");
        }
        if options.rerank {
            trace.advance(Stage::Reranked);
        }

        candidates.truncate(top_k);
        if options.highlight {
            for c in &mut candidates {
                c.highlight = Some(highlight(&c.chunk.text, &prepared.terms));
            }
        }
        let citations = map_citations(&candidates, &prepared.terms, self.config.max_spans_per_chunk);
        let doc_aggs = doc_aggs(&candidates);
        trace.advance(Stage::Cited);

        let signals = Signals {
            degraded: fused.degraded,
            rerank,
            duplicates_dropped: deduped.dropped,
            below_threshold,
            scope_empty: false,
        };
        trace.advance(Stage::Completed);
        tracing::info!(
            lexical_ms,
            vector_ms,
            rerank_ms,
            total_ms = trace.elapsed_ms(),
            returned = candidates.len(),
            degraded = signals.is_degraded(),
            duplicates_dropped = signals.duplicates_dropped,
            "search completed"
        );
        Ok(SearchResult { candidates, citations, doc_aggs, signals })
    }

    /// Like `search`, but resolves to `Error::Cancelled` as soon as `cancel`
    /// completes, abandoning whatever backend calls are still in flight.
    pub async fn search_until<C>(
        &self,
        query: &Query,
        scope: &Scope,
        top_k: usize,
        options: &SearchOptions,
        cancel: C,
    ) -> Result<SearchResult>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancel => {
                tracing::info!("search cancelled");
                Err(Error::Cancelled)
            }
            res = self.search(query, scope, top_k, options) => res,
        }
    }

    fn validate(&self, query: &Query, top_k: usize, options: &SearchOptions) -> Result<()> {
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be greater than zero".to_string()));
        }
        if query.text.trim().is_empty() && query.terms.is_empty() && query.embedding.is_none() {
            return Err(Error::InvalidQuery("query has no text, terms or embedding".to_string()));
        }
        if query.terms.values().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidQuery("term weights must be finite and non-negative".to_string()));
        }
        if let Some(e) = &query.embedding {
            if e.is_empty() || e.iter().any(|x| !x.is_finite()) {
                return Err(Error::InvalidQuery("embedding must be non-empty and finite".to_string()));
            }
            if let Some(dim) = self.config.embedding_dim {
                if e.len() != dim {
                    return Err(Error::InvalidQuery(format!("embedding has {} dimensions, expected {dim}", e.len())));
                }
            }
        }
        if options.rerank_top_n == Some(0) {
            return Err(Error::InvalidQuery("rerank_top_n must be greater than zero".to_string()));
        }
        if options.similarity_threshold.is_some_and(|t| !t.is_finite()) {
            return Err(Error::InvalidQuery("similarity_threshold must be finite".to_string()));
        }
        Ok(())
    }

    async fn lexical_call(&self, query: &Query, scope: &Scope) -> (BackendOutcome, u64) {
        timed(
            BackendKind::Lexical,
            self.config.lexical_timeout_ms,
            self.lexical.search(query, scope, self.config.candidate_limit),
        )
        .await
    }

    async fn vector_call(&self, query: &Query, scope: &Scope) -> (BackendOutcome, u64) {
        match query.embedding.as_deref() {
            Some(embedding) => {
                timed(
                    BackendKind::Vector,
                    self.config.vector_timeout_ms,
                    self.vector.search_vec(embedding, scope, &query.filters, self.config.candidate_limit),
                )
                .await
            }
            None => (Err(BackendFailure::skipped(BackendKind::Vector, "query has no embedding")), 0),
        }
    }
}

async fn timed<F>(backend: BackendKind, timeout_ms: u64, call: F) -> (BackendOutcome, u64)
where
    F: Future<Output = anyhow::Result<Vec<SearchHit>>>,
{
    let start = Instant::now();
    let outcome = match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
        Ok(Ok(hits)) => Ok(hits),
        Ok(Err(e)) => Err(BackendFailure::failed(backend, &e)),
        Err(_) => Err(BackendFailure::timeout(backend, timeout_ms)),
    };
    (outcome, start.elapsed().as_millis() as u64)
}

fn in_scope(mut hits: Vec<SearchHit>, scope: &Scope, query: &Query) -> Vec<SearchHit> {
    hits.retain(|h| scope.contains(&h.chunk) && query.filters.matches(&h.chunk));
    hits
}

/// The query's own terms, or terms weighed from its text. An empty snapshot
/// weighs every token equally.
fn query_terms(stats: &TermStats, query: &Query) -> TermWeights {
    if !query.terms.is_empty() {
        return query.terms.clone();
    }
    let tokens = tokenize(&query.text);
    if stats.doc_count > 0 {
        return term_weights(stats, &tokens);
    }
    let unique: TermWeights = tokens.into_iter().map(|t| (t, 0.0)).collect();
    let n = unique.len() as f32;
    unique.into_keys().map(|t| (t, 1.0 / n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_terms_from_text() {
        let doc_freq = [("revenue".to_string(), 1), ("growth".to_string(), 5)].into_iter().collect();
        let stats = TermStats { doc_count: 10, doc_freq, total_tokens: 100 };
        let t = query_terms(&stats, &Query::new("Revenue growth of the year"));
        assert!(t["revenue"] > t["growth"]);
        assert_eq!(t["year"], 0.0);
    }

    #[test]
    fn empty_snapshot_weighs_uniformly() {
        let t = query_terms(&TermStats::default(), &Query::new("revenue revenue growth"));
        assert_eq!(t.len(), 2);
        assert!((t["revenue"] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stop_words_alone_give_no_terms() {
        assert!(query_terms(&TermStats::default(), &Query::new("the of and")).is_empty());
    }

    #[test]
    fn explicit_terms_win() {
        let terms: TermWeights = [("x".to_string(), 1.0)].into_iter().collect();
        let q = Query::new("revenue").with_terms(terms.clone());
        assert_eq!(query_terms(&TermStats::default(), &q), terms);
    }
}
