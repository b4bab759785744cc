use kbsearch_cli::backends::build_dealer;
use kbsearch_cli::output::{preview, render_text};
use kbsearch_cli::parse_filter;
use kbsearch_core::config::Config;
use kbsearch_core::types::{Query, Scope, SearchOptions, SearchResult};
use tempfile::TempDir;

const CORPUS: &str = r#"
{"id":"r0","kb_id":"finance","doc_id":"report","doc_name":"report.pdf","text":"Revenue growth in 2023 was 12 percent.","position":0,"embedding":[1.0,0.0],"metadata":{"page":"1"}}
{"id":"r1","kb_id":"finance","doc_id":"report","doc_name":"report.pdf","text":"Costs were flat.","position":1,"embedding":[0.0,1.0],"metadata":{"page":"2"}}
{"id":"m0","kb_id":"ops","doc_id":"memo","doc_name":"memo.txt","text":"Revenue meeting moved to Friday.","position":0,"embedding":[0.7,0.7]}
"#;

fn config(dir: &TempDir) -> Config {
    std::fs::write(dir.path().join("chunks.jsonl"), CORPUS.trim_start()).unwrap();
    Config::from_toml_str(
        r#"
        [retrieval]
        fusion_weight = 0.5
        dedup_threshold = 0.9

        [backends]
        lexical = "memory"
        vector = "memory"
        corpus_path = "chunks.jsonl"

        [rerank]
        kind = "hybrid_similarity"
        "#,
    )
}

#[tokio::test]
async fn memory_backends_from_config() {
    let dir = TempDir::new().unwrap();
    let dealer = build_dealer(&config(&dir), dir.path()).await.unwrap();
    assert_eq!(dealer.term_stats().snapshot().doc_count, 3);

    let q = Query::new("revenue growth").with_embedding(vec![1.0, 0.0]);
    let opts = SearchOptions { rerank: true, highlight: true, ..SearchOptions::default() };
    let res = dealer.search(&q, &Scope::knowledge_bases(["finance"]), 5, &opts).await.unwrap();
    assert_eq!(res.ids()[0], "r0");
    assert!(res.ids().iter().all(|id| *id != "m0"));

    let text = render_text("revenue growth", &res);
    assert!(text.contains("1. ["), "{text}");
    assert!(text.contains("report.pdf"));
    assert!(text.contains("<em>Revenue</em>"));
    assert!(text.contains("[1] r0 chars"));
}

#[tokio::test]
async fn missing_retrieval_weights_are_rejected() {
    let dir = TempDir::new().unwrap();
    let cfg = Config::from_toml_str("[backends]\nlexical = \"memory\"\nvector = \"memory\"\n");
    assert!(build_dealer(&cfg, dir.path()).await.is_err());
}

#[test]
fn empty_and_scope_empty_results_render_notices() {
    assert!(render_text("q", &SearchResult::default()).contains("No results found"));
    assert!(render_text("q", &SearchResult::empty_scope()).contains("Scope matches no"));
}

#[test]
fn preview_truncates_long_text() {
    let long = "word ".repeat(60);
    let p = preview(&long);
    assert!(p.ends_with("..."));
    assert_eq!(p.chars().count(), 153);
    assert_eq!(preview("a\nb"), "a b");
}

#[test]
fn filters_parse_as_pairs() {
    assert_eq!(parse_filter("page = 3"), Ok(("page".to_string(), "3".to_string())));
    assert!(parse_filter("novalue").is_err());
    assert!(parse_filter("=x").is_err());
}
