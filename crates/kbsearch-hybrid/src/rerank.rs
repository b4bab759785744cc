//! The optional, fail-soft rerank stage.

use std::time::Duration;

use kbsearch_core::traits::Reranker;
use kbsearch_core::types::{Chunk, Query, RerankOutcome, ScoredCandidate};
use kbsearch_core::{BackendFailure, BackendKind};

use crate::fusion::canonical_order;

/// Re-scores the first `top_n` candidates and reorders only those.
///
/// On error, timeout or a malformed score list the input comes back unchanged
/// with every `rerank_score` unset and the outcome says why it was skipped.
pub async fn rerank_head(
    reranker: &dyn Reranker,
    query: &Query,
    candidates: Vec<ScoredCandidate>,
    top_n: usize,
    timeout: Duration,
) -> (Vec<ScoredCandidate>, RerankOutcome) {
    let n = top_n.min(candidates.len());
    if n == 0 {
        return (candidates, RerankOutcome::Applied { reranked: 0 });
    }

    let head: Vec<&Chunk> = candidates[..n].iter().map(|c| &c.chunk).collect();
    let scores = match tokio::time::timeout(timeout, reranker.rerank(query, &head)).await {
        Err(_) => Err(BackendFailure::timeout(BackendKind::Rerank, timeout.as_millis() as u64)),
        Ok(Err(e)) => Err(BackendFailure::failed(BackendKind::Rerank, &e)),
        Ok(Ok(scores)) if scores.len() != n => Err(BackendFailure::failed(
            BackendKind::Rerank,
            &anyhow::anyhow!("expected {n} scores, got {}", scores.len()),
        )),
        Ok(Ok(scores)) if scores.iter().any(|s| !s.is_finite()) => {
            Err(BackendFailure::failed(BackendKind::Rerank, &anyhow::anyhow!("non-finite rerank score")))
        }
        Ok(Ok(scores)) => Ok(scores),
    };

    let scores = match scores {
        Ok(s) => s,
        Err(failure) => return (candidates, RerankOutcome::Skipped { failure }),
    };

    let mut candidates = candidates;
    let tail = candidates.split_off(n);
    let mut head = candidates;
    for (c, s) in head.iter_mut().zip(scores) {
        c.rerank_score = Some(s);
    }
    head.sort_by(|a, b| canonical_order(a.final_score(), a.id(), b.final_score(), b.id()));
    head.extend(tail);
    (head, RerankOutcome::Applied { reranked: n })
}
