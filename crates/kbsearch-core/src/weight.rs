//! Corpus term statistics and the term weighter.
//!
//! `TermStats` is an immutable document-frequency table. Live readers go
//! through `TermStatsHandle`, which swaps whole snapshots so that a refresh
//! never exposes a half-built table.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::tokenize::tokenize;
use crate::types::{Chunk, TermWeights};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermStats {
    /// Number of chunks the frequencies were computed over.
    pub doc_count: u64,
    /// Number of chunks containing each term at least once.
    pub doc_freq: HashMap<String, u64>,
    /// Sum of token counts over all chunks, used for length normalization.
    pub total_tokens: u64,
}

impl TermStats {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut stats = TermStats::default();
        for chunk in chunks {
            let tokens = tokenize(&chunk.text);
            stats.total_tokens += tokens.len() as u64;
            stats.doc_count += 1;
            let unique: BTreeSet<String> = tokens.into_iter().collect();
            for t in unique {
                *stats.doc_freq.entry(t).or_insert(0) += 1;
            }
        }
        stats
    }

    pub fn doc_freq(&self, term: &str) -> u64 {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    pub fn avg_doc_len(&self) -> f32 {
        if self.doc_count == 0 {
            return 0.0;
        }
        self.total_tokens as f32 / self.doc_count as f32
    }

    /// BM25-style inverse document frequency. Zero for terms absent from the
    /// table, otherwise positive and strictly decreasing in document frequency.
    pub fn idf(&self, term: &str) -> f32 {
        let df = self.doc_freq(term);
        if df == 0 {
            return 0.0;
        }
        let n = self.doc_count.max(df) as f32;
        let df = df as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }
}

/// Weights a token multiset against corpus statistics.
///
/// Each distinct token gets `tf * idf`, then the weights are scaled to sum to
/// one. Tokens unknown to the corpus are kept with weight zero. An empty input
/// yields an empty mapping.
pub fn term_weights(stats: &TermStats, tokens: &[String]) -> TermWeights {
    let mut tf: HashMap<&str, u32> = HashMap::new();
    for t in tokens {
        *tf.entry(t.as_str()).or_insert(0) += 1;
    }
    let mut weights: TermWeights =
        tf.into_iter().map(|(t, n)| (t.to_string(), n as f32 * stats.idf(t))).collect();
    let total: f32 = weights.values().sum();
    if total > 0.0 {
        for w in weights.values_mut() {
            *w /= total;
        }
    }
    weights
}

/// Tokenizes `text` and weighs the result.
pub fn weigh_text(stats: &TermStats, text: &str) -> TermWeights {
    term_weights(stats, &tokenize(text))
}

/// Shared, refreshable holder of the current `TermStats` snapshot.
#[derive(Debug, Default)]
pub struct TermStatsHandle {
    current: RwLock<Arc<TermStats>>,
}

impl TermStatsHandle {
    pub fn new(stats: TermStats) -> Self {
        Self { current: RwLock::new(Arc::new(stats)) }
    }

    /// The snapshot in effect now. Callers keep it for the whole query.
    pub fn snapshot(&self) -> Arc<TermStats> {
        Arc::clone(&self.current.read())
    }

    /// Installs a new snapshot and returns the previous one.
    pub fn replace(&self, stats: TermStats) -> Arc<TermStats> {
        let next = Arc::new(stats);
        std::mem::replace(&mut *self.current.write(), next)
    }
}
