//! kbsearch-core
//!
//! Domain types, capability traits, error taxonomy, configuration and term
//! weighting shared by the retrieval crates.

pub mod config;
pub mod corpus;
pub mod error;
pub mod tokenize;
pub mod traits;
pub mod types;
pub mod weight;

pub use error::{BackendFailure, BackendKind, Error, FailureCause, Result};
