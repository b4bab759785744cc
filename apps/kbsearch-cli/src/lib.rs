//! Wiring for the `kbsearch` binary: backend construction from configuration
//! and human-readable rendering of results.

pub mod backends;
pub mod output;

/// Parses a `key=value` metadata filter.
pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
