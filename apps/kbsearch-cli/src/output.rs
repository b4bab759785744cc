use std::fmt::Write;

use kbsearch_core::types::{RerankOutcome, SearchResult};

const PREVIEW_CHARS: usize = 150;

/// First `PREVIEW_CHARS` characters on one line, with an ellipsis when cut.
pub fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

pub fn render_text(question: &str, res: &SearchResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🔍 Searching: '{question}'...");
    if let Some(failure) = &res.signals.degraded {
        let _ = writeln!(out, "⚠ Degraded: {failure}");
    }
    if let RerankOutcome::Skipped { failure } = &res.signals.rerank {
        let _ = writeln!(out, "⚠ Rerank skipped: {failure}");
    }
    if res.signals.scope_empty {
        let _ = writeln!(out, "⚠ Scope matches no knowledge base or document.");
        return out;
    }
    if res.candidates.is_empty() {
        let _ = writeln!(out, "⚠ No results found.");
        return out;
    }

    let _ = writeln!(out, "✓ Found {} matching chunks:\n", res.candidates.len());
    for (i, c) in res.candidates.iter().enumerate() {
        let name = if c.chunk.doc_name.is_empty() { "Unknown Document" } else { c.chunk.doc_name.as_str() };
        let body = c.highlight.as_deref().unwrap_or(&c.chunk.text);
        let _ = writeln!(out, "{}. [{:.4}] {}", i + 1, c.final_score(), name);
        let _ = writeln!(out, "   \"{}\"", preview(body));
        for cite in res.citations.iter().filter(|x| x.chunk_id == c.chunk.id) {
            let _ = writeln!(out, "   {} {} chars {}..{}", cite.marker, c.chunk.id, cite.span.start, cite.span.end);
        }
        out.push('\n');
    }
    if res.doc_aggs.len() > 1 {
        let _ = writeln!(out, "Documents:");
        for agg in &res.doc_aggs {
            let _ = writeln!(out, "   {} ({})", agg.doc_name, agg.count);
        }
    }
    out
}
