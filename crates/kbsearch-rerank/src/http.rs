use std::time::Duration as StdDuration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use kbsearch_core::config::RerankConfig;
use kbsearch_core::traits::Reranker;
use kbsearch_core::types::{Chunk, Query};

/// Cross-encoder reranking over an HTTP `rerank` endpoint
/// (`{model, query, documents}` in, `results[].{index, relevance_score}` out).
pub struct HttpReranker {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpReranker {
    pub fn new(cfg: &RerankConfig, timeout_ms: u64) -> anyhow::Result<Self> {
        if cfg.api_base.is_empty() {
            bail!("rerank.api_base is required for the http reranker");
        }
        let client = Client::builder().timeout(StdDuration::from_millis(timeout_ms)).build()?;
        let url = format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path);
        Ok(Self { client, url, model: cfg.model.clone(), api_key: cfg.api_key.clone() })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &Query, chunks: &[&Chunk]) -> anyhow::Result<Vec<f32>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let docs: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let body = serde_json::json!({ "model": self.model, "query": query.text, "documents": docs });
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.with_context(|| format!("POST {}", self.url))?;
        let json: Value = res.error_for_status()?.json().await?;
        parse_rerank_response(json, chunks.len())
    }
}

/// Aligns the response scores with the submitted documents. A response that
/// leaves a document unscored is an error.
pub fn parse_rerank_response(json: Value, doc_count: usize) -> anyhow::Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; doc_count];
    let results = json
        .get("results")
        .or_else(|| json.get("data"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("Rerank response is missing results array."))?;

    for item in results {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("Rerank result missing index."))? as usize;
        let score = item
            .get("relevance_score")
            .or_else(|| item.get("score"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow!("Rerank result missing score."))? as f32;
        if index < scores.len() {
            scores[index] = Some(score);
        }
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| anyhow!("Rerank response has no score for document {i}.")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_scores_by_index() {
        let json = serde_json::json!({
            "results": [
                { "index": 1, "relevance_score": 0.2 },
                { "index": 0, "relevance_score": 0.9 }
            ]
        });
        let scores = parse_rerank_response(json, 2).expect("parse failed");
        assert_eq!(scores, vec![0.9, 0.2]);
    }

    #[test]
    fn accepts_data_and_score_aliases() {
        let json = serde_json::json!({ "data": [ { "index": 0, "score": 0.5 } ] });
        assert_eq!(parse_rerank_response(json, 1).unwrap(), vec![0.5]);
    }

    #[test]
    fn unscored_document_is_an_error() {
        let json = serde_json::json!({ "results": [ { "index": 1, "relevance_score": -3.5 } ] });
        let err = parse_rerank_response(json, 2).unwrap_err();
        assert!(err.to_string().contains("document 0"), "{err}");
    }

    #[test]
    fn missing_results_is_an_error() {
        assert!(parse_rerank_response(serde_json::json!({ "oops": [] }), 1).is_err());
    }

    #[test]
    fn requires_api_base() {
        assert!(HttpReranker::new(&RerankConfig::default(), 100).is_err());
    }
}
