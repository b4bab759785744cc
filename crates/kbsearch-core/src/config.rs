//! Lightweight configuration loader, typed sections and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys come from double underscores, e.g. `APP_RETRIEVAL__FUSION_WEIGHT`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    /// Builds a config from an inline TOML document, without files or env.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Figment::new().merge(Toml::string(toml)) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[retrieval]` section, validated.
    pub fn retrieval(&self) -> Result<RetrievalConfig> {
        let cfg: RetrievalConfig = self.get("retrieval").map_err(|e| Error::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn backends(&self) -> Result<BackendsConfig> {
        self.get("backends").map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// The `[rerank]` section; absent means no reranker.
    pub fn rerank(&self) -> Result<RerankConfig> {
        if !self.figment.contains("rerank") {
            return Ok(RerankConfig::default());
        }
        self.get("rerank").map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn embed(&self) -> Result<EmbedConfig> {
        if !self.figment.contains("embed") {
            return Ok(EmbedConfig::default());
        }
        self.get("embed").map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// How raw backend scores are mapped onto `[0, 1]` before fusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `(s - min) / (max - min)`; a list of equal scores maps to 1.
    #[default]
    MinMax,
    /// `s / max` with negative scores clamped to zero.
    Max,
    /// `1 - rank / len`, ignoring score magnitudes.
    Rank,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    InnerProduct,
}

impl SimilarityMetric {
    pub fn score(self, a: &[f32], b: &[f32]) -> Option<f32> {
        if a.is_empty() || a.len() != b.len() {
            return None;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            SimilarityMetric::InnerProduct => Some(dot),
            SimilarityMetric::Cosine => {
                let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na <= f32::EPSILON || nb <= f32::EPSILON {
                    return None;
                }
                Some((dot / (na * nb)).clamp(-1.0, 1.0))
            }
        }
    }
}

/// Tunables of the retrieval pipeline. `fusion_weight` and `dedup_threshold`
/// have no defaults and must be configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight α of the lexical signal; the vector signal gets `1 - α`.
    pub fusion_weight: f32,
    /// Chunks at or above this similarity collapse into one.
    pub dedup_threshold: f32,
    /// Candidates requested from each searcher (M).
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default)]
    pub normalization: Normalization,
    /// Give single-signal candidates their full normalized score instead of
    /// scaling them by their signal's weight.
    #[serde(default)]
    pub single_signal_full_weight: bool,
    #[serde(default)]
    pub similarity_metric: SimilarityMetric,
    #[serde(default = "default_search_timeout_ms")]
    pub lexical_timeout_ms: u64,
    #[serde(default = "default_search_timeout_ms")]
    pub vector_timeout_ms: u64,
    #[serde(default = "default_rerank_timeout_ms")]
    pub rerank_timeout_ms: u64,
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,
    /// Below this many candidates dedup compares every pair.
    #[serde(default = "default_dedup_exact_limit")]
    pub dedup_exact_limit: usize,
    #[serde(default = "default_max_spans")]
    pub max_spans_per_chunk: usize,
    /// Expected query embedding length, checked when set.
    #[serde(default)]
    pub embedding_dim: Option<usize>,
}

fn default_candidate_limit() -> usize { 64 }
fn default_search_timeout_ms() -> u64 { 1_000 }
fn default_rerank_timeout_ms() -> u64 { 3_000 }
fn default_rerank_top_n() -> usize { 32 }
fn default_dedup_exact_limit() -> usize { 64 }
fn default_max_spans() -> usize { 2 }

impl RetrievalConfig {
    /// A config with every optional field at its default.
    pub fn new(fusion_weight: f32, dedup_threshold: f32) -> Self {
        Self {
            fusion_weight,
            dedup_threshold,
            candidate_limit: default_candidate_limit(),
            normalization: Normalization::default(),
            single_signal_full_weight: false,
            similarity_metric: SimilarityMetric::default(),
            lexical_timeout_ms: default_search_timeout_ms(),
            vector_timeout_ms: default_search_timeout_ms(),
            rerank_timeout_ms: default_rerank_timeout_ms(),
            rerank_top_n: default_rerank_top_n(),
            dedup_exact_limit: default_dedup_exact_limit(),
            max_spans_per_chunk: default_max_spans(),
            embedding_dim: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fusion_weight) {
            return Err(Error::InvalidConfig("retrieval.fusion_weight must be within [0, 1]".to_string()));
        }
        if !(self.dedup_threshold > 0.0 && self.dedup_threshold <= 1.0) {
            return Err(Error::InvalidConfig("retrieval.dedup_threshold must be within (0, 1]".to_string()));
        }
        if self.candidate_limit == 0 {
            return Err(Error::InvalidConfig("retrieval.candidate_limit must be greater than zero".to_string()));
        }
        if self.lexical_timeout_ms == 0 || self.vector_timeout_ms == 0 || self.rerank_timeout_ms == 0 {
            return Err(Error::InvalidConfig("retrieval timeouts must be greater than zero".to_string()));
        }
        if self.rerank_top_n == 0 {
            return Err(Error::InvalidConfig("retrieval.rerank_top_n must be greater than zero".to_string()));
        }
        if self.max_spans_per_chunk == 0 {
            return Err(Error::InvalidConfig("retrieval.max_spans_per_chunk must be greater than zero".to_string()));
        }
        if self.embedding_dim == Some(0) {
            return Err(Error::InvalidConfig("retrieval.embedding_dim must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalBackendKind {
    Tantivy,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackendKind {
    Lancedb,
    Memory,
}

/// Which searcher implementations to build and where their data lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendsConfig {
    pub lexical: LexicalBackendKind,
    pub vector: VectorBackendKind,
    #[serde(default = "default_tantivy_dir")]
    pub tantivy_index_dir: String,
    #[serde(default = "default_lancedb_dir")]
    pub lancedb_dir: String,
    #[serde(default = "default_lancedb_table")]
    pub lancedb_table: String,
    /// JSON-lines chunk snapshot served by the in-memory backends.
    #[serde(default = "default_corpus_path")]
    pub corpus_path: String,
}

fn default_tantivy_dir() -> String { "../dev_data/indexes/tantivy".to_string() }
fn default_lancedb_dir() -> String { "../dev_data/indexes/lancedb".to_string() }
fn default_lancedb_table() -> String { "chunks".to_string() }
fn default_corpus_path() -> String { "../dev_data/chunks.jsonl".to_string() }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankKind {
    #[default]
    None,
    Http,
    HybridSimilarity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default)]
    pub kind: RerankKind,
    #[serde(default)]
    pub api_base: String,
    #[serde(default = "default_rerank_path")]
    pub path: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Share of the token similarity in the local hybrid reranker; the
    /// embedding similarity gets the rest.
    #[serde(default = "default_token_weight")]
    pub token_weight: f32,
}

fn default_rerank_path() -> String { "/v1/rerank".to_string() }
fn default_token_weight() -> f32 { 0.3 }

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            kind: RerankKind::None,
            api_base: String::new(),
            path: default_rerank_path(),
            model: String::new(),
            api_key: None,
            token_weight: default_token_weight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedConfig {
    #[serde(default)]
    pub model_dir: Option<String>,
    #[serde(default = "default_embed_dim")]
    pub dim: usize,
    #[serde(default = "default_embed_max_len")]
    pub max_len: usize,
}

fn default_embed_dim() -> usize { 1024 }
fn default_embed_max_len() -> usize { 256 }

impl Default for EmbedConfig {
    fn default() -> Self {
        Self { model_dir: None, dim: default_embed_dim(), max_len: default_embed_max_len() }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
