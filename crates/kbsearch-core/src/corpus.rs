//! JSON-lines chunk snapshots consumed by the in-memory backends.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::types::Chunk;

/// Reads one `Chunk` per non-blank line.
pub fn load_jsonl(path: &Path) -> Result<Vec<Chunk>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading corpus {}", path.display()))?;
    parse_jsonl(&raw).with_context(|| format!("parsing corpus {}", path.display()))
}

pub fn parse_jsonl(raw: &str) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for (n, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let chunk: Chunk = serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}
