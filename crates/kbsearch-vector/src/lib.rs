//! kbsearch-vector
//!
//! Vector searcher backends: a LanceDB table reader and an in-memory brute
//! force scorer. Both rank by the configured `SimilarityMetric`.

pub mod memory;
pub mod schema;
pub mod search;

pub use memory::MemoryVectorSearcher;
pub use search::LanceVectorSearcher;
