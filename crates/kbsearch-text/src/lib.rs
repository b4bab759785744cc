//! kbsearch-text
//!
//! Lexical searcher backends: a Tantivy index reader and an in-memory BM25
//! scorer over a chunk snapshot.

pub mod memory;
pub mod search;
pub mod tantivy_utils;

pub use memory::MemoryLexicalSearcher;
pub use search::TantivyLexicalSearcher;
