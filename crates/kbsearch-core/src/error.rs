use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which external collaborator a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Lexical,
    Vector,
    Rerank,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Lexical => "lexical",
            BackendKind::Vector => "vector",
            BackendKind::Rerank => "rerank",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailureCause {
    Timeout { after_ms: u64 },
    /// The call was never made, e.g. no query embedding for vector search.
    Skipped { reason: String },
    Failed { message: String },
}

/// Typed failure of one backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{backend} backend unavailable: {cause}")]
pub struct BackendFailure {
    pub backend: BackendKind,
    pub cause: FailureCause,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Timeout { after_ms } => write!(f, "timed out after {after_ms}ms"),
            FailureCause::Skipped { reason } => write!(f, "skipped ({reason})"),
            FailureCause::Failed { message } => f.write_str(message),
        }
    }
}

impl BackendFailure {
    pub fn timeout(backend: BackendKind, after_ms: u64) -> Self {
        Self { backend, cause: FailureCause::Timeout { after_ms } }
    }

    pub fn skipped(backend: BackendKind, reason: impl Into<String>) -> Self {
        Self { backend, cause: FailureCause::Skipped { reason: reason.into() } }
    }

    /// Flattens an adapter error chain into a message.
    pub fn failed(backend: BackendKind, err: &anyhow::Error) -> Self {
        Self { backend, cause: FailureCause::Failed { message: format!("{err:#}") } }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// One searcher failed; absorbed by degraded fusion and only logged.
    #[error(transparent)]
    BackendUnavailable(BackendFailure),

    #[error("All search backends unavailable (lexical: {lexical}; vector: {vector})")]
    AllBackendsUnavailable { lexical: BackendFailure, vector: BackendFailure },

    /// Soft; the fused order is kept and the failure is only logged.
    #[error("Reranking unavailable: {0}")]
    RerankUnavailable(BackendFailure),

    #[error("Search cancelled")]
    Cancelled,
}

impl From<BackendFailure> for Error {
    fn from(failure: BackendFailure) -> Self {
        match failure.backend {
            BackendKind::Rerank => Error::RerankUnavailable(failure),
            BackendKind::Lexical | BackendKind::Vector => Error::BackendUnavailable(failure),
        }
    }
}

impl Error {
    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::AllBackendsUnavailable { .. } | Error::BackendUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backend_outages_are_retryable() {
        let lexical = BackendFailure::timeout(BackendKind::Lexical, 50);
        let vector = BackendFailure::failed(BackendKind::Vector, &anyhow::anyhow!("refused"));
        assert!(Error::AllBackendsUnavailable { lexical, vector }.is_retryable());
        assert!(!Error::InvalidQuery("empty".into()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn single_failures_map_by_backend() {
        let vector = Error::from(BackendFailure::timeout(BackendKind::Vector, 10));
        assert!(matches!(vector, Error::BackendUnavailable(_)));
        assert!(vector.is_retryable());
        let rerank = Error::from(BackendFailure::skipped(BackendKind::Rerank, "no reranker configured"));
        assert!(matches!(rerank, Error::RerankUnavailable(_)));
        assert!(!rerank.is_retryable());
        assert_eq!(rerank.to_string(), "Reranking unavailable: rerank backend unavailable: skipped (no reranker configured)");
    }

    #[test]
    fn failure_messages_name_the_backend() {
        let f = BackendFailure::timeout(BackendKind::Rerank, 200);
        assert_eq!(f.to_string(), "rerank backend unavailable: timed out after 200ms");
    }
}
