use std::collections::BTreeMap;
use std::sync::Arc;

use kbsearch_core::config::{RetrievalConfig, SimilarityMetric};
use kbsearch_core::types::{Chunk, CitationKind, Query, Scope, SearchOptions};
use kbsearch_core::weight::TermStatsHandle;
use kbsearch_hybrid::Dealer;
use kbsearch_rerank::HybridSimilarityReranker;
use kbsearch_text::MemoryLexicalSearcher;
use kbsearch_vector::MemoryVectorSearcher;

fn chunk(id: &str, doc: &str, position: u64, text: &str, embedding: [f32; 3]) -> Chunk {
    let mut metadata = BTreeMap::new();
    metadata.insert("section".to_string(), if doc == "report" { "finance" } else { "ops" }.to_string());
    Chunk {
        id: id.to_string(),
        kb_id: "kb".to_string(),
        doc_id: doc.to_string(),
        doc_name: format!("{doc}.pdf"),
        text: text.to_string(),
        position,
        embedding: Some(embedding.to_vec()),
        term_vector: BTreeMap::new(),
        metadata,
    }
}

fn corpus() -> Vec<Chunk> {
    vec![
        chunk("r0", "report", 0, "Annual report for 2023. Revenue growth was 12 percent.", [0.9, 0.1, 0.0]),
        chunk("r1", "report", 1, "Annual report for 2023. Revenue growth was 12 percent!", [0.9, 0.1, 0.0]),
        chunk("r2", "report", 2, "Costs rose slightly. Headcount stayed flat.", [0.2, 0.9, 0.1]),
        chunk("m0", "memo", 0, "The cafeteria menu changes on Monday.", [0.0, 0.1, 0.9]),
        chunk("m1", "memo", 1, "Growth targets for 2024 are ambitious.", [0.6, 0.4, 0.1]),
    ]
}

fn dealer() -> Dealer {
    let lexical = MemoryLexicalSearcher::new(corpus());
    let stats = Arc::new(TermStatsHandle::new(lexical.term_stats().clone()));
    let vector = MemoryVectorSearcher::new(corpus(), SimilarityMetric::Cosine);
    Dealer::new(RetrievalConfig::new(0.5, 0.9), Arc::new(lexical), Arc::new(vector), stats).unwrap()
}

#[tokio::test]
async fn end_to_end_over_memory_backends() {
    let d = dealer();
    let q = Query::new("revenue growth 2023").with_embedding(vec![1.0, 0.0, 0.0]);
    let res = d.search(&q, &Scope::knowledge_bases(["kb"]), 3, &SearchOptions::default()).await.unwrap();

    assert_eq!(res.candidates[0].id(), "r0");
    assert!(!res.ids().contains(&"r1"), "punctuation-only variant collapses into r0");
    assert_eq!(res.signals.duplicates_dropped, 1);
    assert!(!res.signals.is_degraded());
    assert_eq!(res.candidates.len(), 3);

    let first = res.citations.iter().find(|c| c.chunk_id == "r0").unwrap();
    assert_eq!(first.kind, CitationKind::Passage);
    assert_eq!(first.marker, "[1]");
}

#[tokio::test]
async fn filters_and_document_scope_apply() {
    let d = dealer();
    let q = Query::new("growth").with_embedding(vec![1.0, 0.0, 0.0]).with_filter("section", "ops");
    let res = d.search(&q, &Scope::knowledge_bases(["kb"]), 5, &SearchOptions::default()).await.unwrap();
    assert!(res.candidates.iter().all(|c| c.chunk.doc_id == "memo"));
    assert_eq!(res.candidates[0].id(), "m1");

    let scope = Scope::knowledge_bases(["kb"]).with_documents(["report"]);
    let res = d.search(&Query::new("growth"), &scope, 5, &SearchOptions::default()).await.unwrap();
    assert!(res.candidates.iter().all(|c| c.chunk.doc_id == "report"));
}

#[tokio::test]
async fn local_reranker_runs_in_the_pipeline() {
    let d = dealer().with_reranker(Some(Arc::new(HybridSimilarityReranker::new(0.3).unwrap())));
    let q = Query::new("costs headcount").with_embedding(vec![0.2, 0.9, 0.1]);
    let opts = SearchOptions { rerank: true, ..SearchOptions::default() };
    let res = d.search(&q, &Scope::knowledge_bases(["kb"]), 3, &opts).await.unwrap();
    assert_eq!(res.candidates[0].id(), "r2");
    assert!(res.candidates[0].rerank_score.is_some());
    assert!(!res.signals.rerank_skipped());
}
