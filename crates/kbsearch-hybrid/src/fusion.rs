//! Score normalization and weighted linear fusion of the two candidate lists.

use std::cmp::Ordering;
use std::collections::HashMap;

use kbsearch_core::config::{Normalization, RetrievalConfig};
use kbsearch_core::types::{ChunkId, ScoredCandidate, SearchHit};
use kbsearch_core::{BackendFailure, Error, Result};

/// What one searcher call produced: hits, or the typed reason it produced none.
pub type BackendOutcome = std::result::Result<Vec<SearchHit>, BackendFailure>;

#[derive(Debug, Clone, PartialEq)]
pub struct Fused {
    pub candidates: Vec<ScoredCandidate>,
    /// The failure that forced single-signal fusion, if any.
    pub degraded: Option<BackendFailure>,
}

/// Canonical result order: score descending, chunk id ascending on ties.
pub fn canonical_order(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}

pub fn sort_by_fused(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| canonical_order(a.fused_score, a.id(), b.fused_score, b.id()));
}

/// Maps raw scores onto `[0, 1]`, position for position.
pub fn normalize(scores: &[f32], method: Normalization) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    match method {
        Normalization::MinMax => {
            let range = max - min;
            if range <= f32::EPSILON {
                return vec![1.0; scores.len()];
            }
            scores.iter().map(|s| ((s - min) / range).clamp(0.0, 1.0)).collect()
        }
        Normalization::Max => {
            if max <= 0.0 {
                return vec![0.0; scores.len()];
            }
            scores.iter().map(|s| (s / max).clamp(0.0, 1.0)).collect()
        }
        Normalization::Rank => {
            let mut order: Vec<usize> = (0..scores.len()).collect();
            order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
            let len = scores.len() as f32;
            let mut out = vec![0.0; scores.len()];
            let mut rank = 0;
            for (pos, &i) in order.iter().enumerate() {
                // equal scores share the better rank
                if pos > 0 && scores[i] != scores[order[pos - 1]] {
                    rank = pos;
                }
                out[i] = 1.0 - rank as f32 / len;
            }
            out
        }
    }
}

/// One hit per chunk id, keeping the best finite raw score.
fn collapse(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut best: HashMap<ChunkId, SearchHit> = HashMap::with_capacity(hits.len());
    for hit in hits.into_iter().filter(|h| h.score.is_finite()) {
        match best.get(&hit.chunk.id) {
            Some(prev) if prev.score >= hit.score => {}
            _ => {
                best.insert(hit.chunk.id.clone(), hit);
            }
        }
    }
    let mut hits: Vec<SearchHit> = best.into_values().collect();
    hits.sort_by(|a, b| canonical_order(a.score, &a.chunk.id, b.score, &b.chunk.id));
    hits
}

fn normalized(hits: Vec<SearchHit>, method: Normalization) -> Vec<(SearchHit, f32)> {
    let hits = collapse(hits);
    let raw: Vec<f32> = hits.iter().map(|h| h.score).collect();
    hits.into_iter().zip(normalize(&raw, method)).collect()
}

/// Fuses lexical and vector outcomes into one ranked candidate list.
///
/// With both lists present a chunk scores `α·lex + (1-α)·vec`, with a missing
/// signal counting as zero unless `single_signal_full_weight` is set. With one
/// list failed the survivor's normalized score is used at weight 1.0 and the
/// failure is reported in `Fused::degraded`. Both failing is
/// `Error::AllBackendsUnavailable`.
pub fn fuse(lexical: BackendOutcome, vector: BackendOutcome, cfg: &RetrievalConfig) -> Result<Fused> {
    let alpha = cfg.fusion_weight;
    let (lexical, vector, degraded, lex_weight, vec_weight) = match (lexical, vector) {
        (Err(lexical), Err(vector)) => return Err(Error::AllBackendsUnavailable { lexical, vector }),
        (Ok(lex), Err(failure)) => (lex, Vec::new(), Some(failure), 1.0, 0.0),
        (Err(failure), Ok(vec)) => (Vec::new(), vec, Some(failure), 0.0, 1.0),
        (Ok(lex), Ok(vec)) => (lex, vec, None, alpha, 1.0 - alpha),
    };

    let mut merged: HashMap<ChunkId, ScoredCandidate> = HashMap::new();
    for (hit, score) in normalized(lexical, cfg.normalization) {
        merged.insert(
            hit.chunk.id.clone(),
            ScoredCandidate {
                chunk: hit.chunk,
                lexical_score: Some(score),
                vector_score: None,
                fused_score: 0.0,
                rerank_score: None,
                highlight: None,
            },
        );
    }
    for (hit, score) in normalized(vector, cfg.normalization) {
        match merged.get_mut(&hit.chunk.id) {
            Some(c) => {
                c.vector_score = Some(score);
                if c.chunk.embedding.is_none() {
                    c.chunk.embedding = hit.chunk.embedding;
                }
            }
            None => {
                merged.insert(
                    hit.chunk.id.clone(),
                    ScoredCandidate {
                        chunk: hit.chunk,
                        lexical_score: None,
                        vector_score: Some(score),
                        fused_score: 0.0,
                        rerank_score: None,
                        highlight: None,
                    },
                );
            }
        }
    }

    let single_full = cfg.single_signal_full_weight && degraded.is_none();
    let mut candidates: Vec<ScoredCandidate> = merged
        .into_values()
        .map(|mut c| {
            c.fused_score = match (c.lexical_score, c.vector_score) {
                (Some(l), Some(v)) => lex_weight * l + vec_weight * v,
                (Some(l), None) if single_full => l,
                (None, Some(v)) if single_full => v,
                (l, v) => lex_weight * l.unwrap_or(0.0) + vec_weight * v.unwrap_or(0.0),
            };
            c
        })
        .collect();
    sort_by_fused(&mut candidates);
    Ok(Fused { candidates, degraded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbsearch_core::types::{Chunk, SourceKind};
    use kbsearch_core::BackendKind;

    fn hit(id: &str, score: f32, source: SourceKind) -> SearchHit {
        SearchHit {
            chunk: Chunk {
                id: id.to_string(),
                kb_id: "kb".into(),
                doc_id: id.split(':').next().unwrap_or(id).to_string(),
                doc_name: String::new(),
                text: String::new(),
                position: 0,
                embedding: None,
                term_vector: Default::default(),
                metadata: Default::default(),
            },
            score,
            source,
        }
    }

    fn lex(hits: &[(&str, f32)]) -> BackendOutcome {
        Ok(hits.iter().map(|(id, s)| hit(id, *s, SourceKind::Text)).collect())
    }

    fn vec(hits: &[(&str, f32)]) -> BackendOutcome {
        Ok(hits.iter().map(|(id, s)| hit(id, *s, SourceKind::Vector)).collect())
    }

    fn ids(f: &Fused) -> Vec<&str> {
        f.candidates.iter().map(|c| c.id()).collect()
    }

    #[test]
    fn min_max_maps_to_unit_range() {
        assert_eq!(normalize(&[2.0, 4.0, 3.0], Normalization::MinMax), vec![0.0, 1.0, 0.5]);
        assert_eq!(normalize(&[7.0, 7.0], Normalization::MinMax), vec![1.0, 1.0]);
    }

    #[test]
    fn max_and_rank_normalization() {
        assert_eq!(normalize(&[2.0, 4.0, -1.0], Normalization::Max), vec![0.5, 1.0, 0.0]);
        assert_eq!(normalize(&[0.1, 0.9, 0.9, 0.5], Normalization::Rank), vec![0.25, 1.0, 1.0, 0.5]);
    }

    #[test]
    fn dual_match_outranks_single_matches() {
        let cfg = RetrievalConfig::new(0.5, 0.9);
        let f = fuse(lex(&[("A:1", 0.8), ("B:2", 0.4)]), vec(&[("A:1", 0.9), ("A:2", 0.85)]), &cfg).unwrap();
        assert_eq!(ids(&f)[0], "A:1");
        assert!(f.degraded.is_none());
        let top = &f.candidates[0];
        assert_eq!((top.lexical_score, top.vector_score), (Some(1.0), Some(1.0)));
    }

    #[test]
    fn single_signal_is_scaled_by_its_weight() {
        let cfg = RetrievalConfig::new(0.25, 0.9);
        let f = fuse(lex(&[("a", 1.0)]), vec(&[("b", 1.0)]), &cfg).unwrap();
        let score = |id: &str| f.candidates.iter().find(|c| c.id() == id).unwrap().fused_score;
        assert!((score("a") - 0.25).abs() < 1e-6);
        assert!((score("b") - 0.75).abs() < 1e-6);

        let cfg = RetrievalConfig { single_signal_full_weight: true, ..cfg };
        let f = fuse(lex(&[("a", 1.0)]), vec(&[("b", 1.0)]), &cfg).unwrap();
        assert_eq!(ids(&f), vec!["a", "b"], "equal full-weight scores tie-break by id");
    }

    #[test]
    fn degraded_uses_survivor_at_full_weight() {
        let cfg = RetrievalConfig::new(0.5, 0.9);
        let down = Err(BackendFailure::timeout(BackendKind::Vector, 10));
        let f = fuse(lex(&[("a", 3.0), ("b", 1.0)]), down, &cfg).unwrap();
        assert_eq!(f.candidates[0].fused_score, 1.0);
        assert_eq!(f.degraded.map(|d| d.backend), Some(BackendKind::Vector));
    }

    #[test]
    fn both_failures_are_an_error() {
        let cfg = RetrievalConfig::new(0.5, 0.9);
        let err = fuse(
            Err(BackendFailure::timeout(BackendKind::Lexical, 10)),
            Err(BackendFailure::skipped(BackendKind::Vector, "no embedding")),
            &cfg,
        )
        .unwrap_err();
        assert!(matches!(err, Error::AllBackendsUnavailable { .. }));
    }

    #[test]
    fn drops_non_finite_and_repeated_hits() {
        let cfg = RetrievalConfig::new(0.5, 0.9);
        let f = fuse(lex(&[("a", f32::NAN), ("b", 1.0), ("b", 2.0), ("c", 0.0)]), vec(&[]), &cfg).unwrap();
        assert_eq!(ids(&f), vec!["b", "c"]);
        assert!(f.candidates.iter().all(|c| c.fused_score.is_finite() && c.fused_score >= 0.0));
    }
}
