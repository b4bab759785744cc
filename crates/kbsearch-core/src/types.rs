//! Domain types shared by the searcher backends and the dealer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::BackendFailure;

pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;
/// Term to weight mapping, ordered so that iteration is deterministic.
pub type TermWeights = BTreeMap<String, f32>;

/// A chunk of a source document that is independently retrievable.
///
/// - `id`: stable identifier, unique within a knowledge base
/// - `kb_id`: knowledge base that owns the chunk
/// - `doc_id`/`doc_name`: source document identity and display name
/// - `position`: ordering of the chunk within its source document
/// - `embedding`: fixed-length vector, absent when not yet embedded
/// - `term_vector`: precomputed term weights, may be empty
/// - `metadata`: source page/section and arbitrary key-value pairs
///
/// Chunks are read-only snapshots for the retrieval core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub kb_id: String,
    pub doc_id: String,
    #[serde(default)]
    pub doc_name: String,
    pub text: String,
    pub position: u64,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub term_vector: TermWeights,
    #[serde(default)]
    pub metadata: Meta,
}

/// The set of knowledge bases (and optionally documents) a query may touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub kb_ids: BTreeSet<String>,
    /// `None` searches every document of the knowledge bases.
    pub doc_ids: Option<BTreeSet<String>>,
}

impl Scope {
    pub fn knowledge_bases<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { kb_ids: ids.into_iter().map(Into::into).collect(), doc_ids: None }
    }

    pub fn with_documents<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.doc_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// True when no chunk can possibly be in scope.
    pub fn is_empty(&self) -> bool {
        self.kb_ids.is_empty() || self.doc_ids.as_ref().is_some_and(BTreeSet::is_empty)
    }

    pub fn contains(&self, chunk: &Chunk) -> bool {
        self.kb_ids.contains(&chunk.kb_id)
            && self.doc_ids.as_ref().map_or(true, |docs| docs.contains(&chunk.doc_id))
    }
}

/// Equality constraints on chunk metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    pub metadata: Meta,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.metadata.iter().all(|(k, v)| chunk.metadata.get(k) == Some(v))
    }
}

/// A request-scoped query representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Parsed terms with weights. Derived from `text` by the dealer when empty.
    pub terms: TermWeights,
    pub embedding: Option<Vec<f32>>,
    pub filters: Filters,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn with_terms(mut self, terms: TermWeights) -> Self {
        self.terms = terms;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.metadata.insert(key.into(), value.into());
        self
    }
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Vector,
    Text,
}

/// The raw surface returned by every searcher backend.
///
/// `score` is engine-specific but higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
    pub source: SourceKind,
}

/// A chunk with its score breakdown. Lexical and vector scores are the
/// normalized values; `None` means the chunk was absent from that list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub chunk: Chunk,
    pub lexical_score: Option<f32>,
    pub vector_score: Option<f32>,
    pub fused_score: f32,
    pub rerank_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

impl ScoredCandidate {
    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    pub fn final_score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.fused_score)
    }
}

/// Half-open character range `[start, end)` within a chunk's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    /// One or more consecutive sentences matched query terms.
    Passage,
    /// No finer span was locatable, the whole chunk is cited.
    WholeChunk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Inline marker for downstream renderers, e.g. `[2]`.
    pub marker: String,
    pub chunk_id: ChunkId,
    pub span: Span,
    pub kind: CitationKind,
}

/// Number of final candidates per source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocAgg {
    pub doc_id: String,
    pub doc_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RerankOutcome {
    #[default]
    NotRequested,
    Applied {
        reranked: usize,
    },
    Skipped {
        failure: BackendFailure,
    },
}

/// Observability signals describing how a result was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    /// Set when fusion ran on a single surviving searcher.
    pub degraded: Option<BackendFailure>,
    pub rerank: RerankOutcome,
    pub duplicates_dropped: usize,
    pub below_threshold: usize,
    pub scope_empty: bool,
}

impl Signals {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn rerank_skipped(&self) -> bool {
        matches!(self.rerank, RerankOutcome::Skipped { .. })
    }
}

/// Ranked, citable evidence for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub candidates: Vec<ScoredCandidate>,
    pub citations: Vec<Citation>,
    pub doc_aggs: Vec<DocAgg>,
    pub signals: Signals,
}

impl SearchResult {
    pub fn empty_scope() -> Self {
        Self { signals: Signals { scope_empty: true, ..Signals::default() }, ..Self::default() }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.candidates.iter().map(ScoredCandidate::id).collect()
    }
}

/// Per-request switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub rerank: bool,
    /// Overrides the configured rerank shortlist size.
    pub rerank_top_n: Option<usize>,
    /// Drops candidates whose fused score is below this value.
    pub similarity_threshold: Option<f32>,
    pub highlight: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kb: &str, doc: &str) -> Chunk {
        Chunk {
            id: format!("{doc}:0"),
            kb_id: kb.to_string(),
            doc_id: doc.to_string(),
            doc_name: String::new(),
            text: String::new(),
            position: 0,
            embedding: None,
            term_vector: TermWeights::new(),
            metadata: Meta::new(),
        }
    }

    #[test]
    fn scope_emptiness() {
        assert!(Scope::default().is_empty());
        assert!(Scope::knowledge_bases(["kb"]).with_documents(Vec::<String>::new()).is_empty());
        assert!(!Scope::knowledge_bases(["kb"]).is_empty());
    }

    #[test]
    fn scope_membership_respects_documents() {
        let scope = Scope::knowledge_bases(["kb"]).with_documents(["a"]);
        assert!(scope.contains(&chunk("kb", "a")));
        assert!(!scope.contains(&chunk("kb", "b")));
        assert!(!scope.contains(&chunk("other", "a")));
    }

    #[test]
    fn spans_overlap_only_when_sharing_characters() {
        let a = Span { start: 0, end: 5 };
        assert!(a.overlaps(&Span { start: 4, end: 9 }));
        assert!(!a.overlaps(&Span { start: 5, end: 9 }));
    }

    #[test]
    fn filters_require_every_pair() {
        let mut c = chunk("kb", "a");
        c.metadata.insert("page".into(), "3".into());
        let q = Query::new("x").with_filter("page", "3");
        assert!(q.filters.matches(&c));
        let q = q.with_filter("section", "intro");
        assert!(!q.filters.matches(&c));
    }
}
