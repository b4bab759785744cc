use std::collections::BTreeMap;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use kbsearch_core::config::{RerankConfig, RerankKind};
use kbsearch_core::traits::Reranker;
use kbsearch_core::types::{Chunk, Query};
use kbsearch_rerank::{from_config, HttpReranker, HybridSimilarityReranker};

fn chunk(id: &str, text: &str, embedding: Option<Vec<f32>>) -> Chunk {
    Chunk {
        id: id.to_string(),
        kb_id: "kb".to_string(),
        doc_id: "doc".to_string(),
        doc_name: String::new(),
        text: text.to_string(),
        position: 0,
        embedding,
        term_vector: BTreeMap::new(),
        metadata: BTreeMap::new(),
    }
}

/// Serves one canned JSON response and returns the request body it received.
async fn serve_once(listener: TcpListener, response: &'static str) -> String {
    let (mut sock, _) = listener.accept().await.unwrap();
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let body_start = loop {
        let n = sock.read(&mut tmp).await.unwrap();
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..body_start]).to_lowercase();
    let len: usize = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .map(|v| v.trim().parse().unwrap())
        .unwrap_or(0);
    while buf.len() < body_start + len {
        let n = sock.read(&mut tmp).await.unwrap();
        buf.extend_from_slice(&tmp[..n]);
    }
    let reply = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        response.len(),
        response
    );
    sock.write_all(reply.as_bytes()).await.unwrap();
    sock.shutdown().await.unwrap();
    String::from_utf8_lossy(&buf[body_start..]).to_string()
}

#[tokio::test]
async fn http_reranker_posts_documents_and_aligns_scores() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_once(
        listener,
        r#"{"results":[{"index":1,"relevance_score":0.8},{"index":0,"relevance_score":0.1}]}"#,
    ));

    let cfg = RerankConfig {
        kind: RerankKind::Http,
        api_base: format!("http://{addr}"),
        model: "bge-reranker".to_string(),
        ..RerankConfig::default()
    };
    let reranker = HttpReranker::new(&cfg, 2_000).unwrap();
    let a = chunk("a", "hiring plans", None);
    let b = chunk("b", "revenue grew 12%", None);
    let scores = reranker.rerank(&Query::new("revenue growth"), &[&a, &b]).await.unwrap();
    assert_eq!(scores, vec![0.1, 0.8]);

    let body: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(body["query"], "revenue growth");
    assert_eq!(body["model"], "bge-reranker");
    assert_eq!(body["documents"][1], "revenue grew 12%");
}

#[tokio::test]
async fn hybrid_similarity_prefers_on_topic_chunks() {
    let r = HybridSimilarityReranker::new(0.3).unwrap();
    let q = Query::new("revenue growth").with_embedding(vec![1.0, 0.0]);
    let on = chunk("on", "revenue growth was strong", Some(vec![1.0, 0.0]));
    let off = chunk("off", "office plants", Some(vec![0.0, 1.0]));
    let bare = chunk("bare", "revenue only", None);
    let scores = r.rerank(&q, &[&on, &off, &bare]).await.unwrap();
    assert!((scores[0] - 1.0).abs() < 1e-6);
    assert_eq!(scores[1], 0.0);
    assert!((scores[2] - 0.5).abs() < 1e-6, "no embedding means token similarity only");
}

#[test]
fn factory_follows_config_kind() {
    assert!(from_config(&RerankConfig::default(), 100).unwrap().is_none());
    let cfg = RerankConfig { kind: RerankKind::HybridSimilarity, ..RerankConfig::default() };
    assert!(from_config(&cfg, 100).unwrap().is_some());
    let cfg = RerankConfig { kind: RerankKind::Http, ..RerankConfig::default() };
    assert!(from_config(&cfg, 100).is_err(), "http reranker needs an api_base");
}

#[tokio::test]
async fn noop_reranker_preserves_input_order() {
    let (a, b, c) = (chunk("z", "first", None), chunk("y", "second", None), chunk("x", "third", None));
    let scores = kbsearch_rerank::NoopReranker.rerank(&Query::new("q"), &[&a, &b, &c]).await.unwrap();
    assert_eq!(scores, vec![3.0, 2.0, 1.0]);
}
