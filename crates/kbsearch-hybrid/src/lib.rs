//! kbsearch-hybrid
//!
//! The retrieval pipeline: concurrent lexical and vector search, score fusion,
//! near-duplicate collapsing, optional reranking and citation mapping, driven
//! by the `Dealer`.

pub mod citation;
pub mod dealer;
pub mod dedup;
pub mod fusion;
pub mod rerank;
pub mod stage;

pub use dealer::Dealer;
pub use stage::Stage;
