//! In-memory BM25 lexical searcher over a chunk snapshot.

use anyhow::Result;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use kbsearch_core::corpus::load_jsonl;
use kbsearch_core::tokenize::tokenize;
use kbsearch_core::traits::LexicalSearcher;
use kbsearch_core::types::{Chunk, Query, Scope, SearchHit, SourceKind};
use kbsearch_core::weight::TermStats;

const K1: f32 = 1.2;
const B: f32 = 0.75;

struct Entry {
    chunk: Chunk,
    tf: HashMap<String, u32>,
    len: usize,
}

/// Scores chunks by `Σ w(t) · bm25_tf(t)` where `w` is the query term weight.
/// Chunks that carry a precomputed term vector use it in place of the BM25
/// term-frequency component.
pub struct MemoryLexicalSearcher {
    entries: Arc<Vec<Entry>>,
    stats: TermStats,
}

impl MemoryLexicalSearcher {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let stats = TermStats::from_chunks(&chunks);
        let entries = chunks
            .into_iter()
            .map(|chunk| {
                let tokens = tokenize(&chunk.text);
                let len = tokens.len();
                let mut tf = HashMap::new();
                for t in tokens {
                    *tf.entry(t).or_insert(0) += 1;
                }
                Entry { chunk, tf, len }
            })
            .collect();
        Self { entries: Arc::new(entries), stats }
    }

    pub fn from_jsonl(path: &Path) -> Result<Self> {
        Ok(Self::new(load_jsonl(path)?))
    }

    /// Document-frequency table of the loaded snapshot.
    pub fn term_stats(&self) -> &TermStats {
        &self.stats
    }

    fn score(&self, entry: &Entry, query: &Query) -> f32 {
        let avg = self.stats.avg_doc_len().max(1.0);
        query
            .terms
            .iter()
            .filter(|(_, w)| w.is_finite() && **w > 0.0)
            .map(|(term, w)| {
                if !entry.chunk.term_vector.is_empty() {
                    return w * entry.chunk.term_vector.get(term).copied().unwrap_or(0.0);
                }
                let tf = entry.tf.get(term).copied().unwrap_or(0) as f32;
                if tf == 0.0 {
                    return 0.0;
                }
                let norm = K1 * (1.0 - B + B * entry.len as f32 / avg);
                w * tf * (K1 + 1.0) / (tf + norm)
            })
            .sum()
    }
}

#[async_trait]
impl LexicalSearcher for MemoryLexicalSearcher {
    async fn search(&self, query: &Query, scope: &Scope, limit: usize) -> Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter(|e| scope.contains(&e.chunk) && query.filters.matches(&e.chunk))
            .filter_map(|e| {
                let score = self.score(e, query);
                (score > 0.0).then(|| SearchHit { chunk: e.chunk.clone(), score, source: SourceKind::Text })
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
    use kbsearch_core::weight::weigh_text;

    fn chunk(id: &str, doc: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            kb_id: "kb".to_string(),
            doc_id: doc.to_string(),
            doc_name: format!("{doc}.txt"),
            text: text.to_string(),
            position: 0,
            embedding: None,
            term_vector: TermWeights::new(),
            metadata: Meta::new(),
        }
    }

    fn searcher() -> MemoryLexicalSearcher {
        MemoryLexicalSearcher::new(vec![
            chunk("a:0", "a", "revenue growth in 2023 was strong"),
            chunk("a:1", "a", "the board met twice"),
            chunk("b:0", "b", "revenue fell"),
        ])
    }

    #[tokio::test]
    async fn ranks_by_weighted_overlap() {
        let s = searcher();
        let q = Query::new("revenue growth").with_terms(weigh_text(s.term_stats(), "revenue growth"));
        let hits = s.search(&q, &Scope::knowledge_bases(["kb"]), 10).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a:0", "b:0"]);
    }

    #[tokio::test]
    async fn zero_matches_is_empty_not_error() {
        let s = searcher();
        let q = Query::new("zeppelin").with_terms(weigh_text(s.term_stats(), "zeppelin"));
        assert!(s.search(&q, &Scope::knowledge_bases(["kb"]), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn honours_scope_documents() {
        let s = searcher();
        let q = Query::new("revenue").with_terms(weigh_text(s.term_stats(), "revenue"));
        let scope = Scope::knowledge_bases(["kb"]).with_documents(["b"]);
        let hits = s.search(&q, &scope, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "b:0");
    }
}
