//! Citation spans, highlighting and per-document aggregation of final results.

use std::collections::{BTreeMap, BTreeSet};

use unicode_segmentation::UnicodeSegmentation;

use kbsearch_core::tokenize::tokenize;
use kbsearch_core::types::{Citation, CitationKind, DocAgg, ScoredCandidate, Span, TermWeights};

/// Floor for query terms the corpus statistics do not know, so that matching
/// them still marks a sentence as relevant.
const MIN_TERM_WEIGHT: f32 = 1e-3;

struct Sentence {
    span: Span,
    score: f32,
}

/// Trimmed sentences of `text` with character offsets.
fn sentences(text: &str, terms: &TermWeights) -> Vec<Sentence> {
    let mut out = Vec::new();
    let mut offset = 0;
    for s in text.split_sentence_bounds() {
        let len = s.chars().count();
        let lead = s.chars().take_while(|c| c.is_whitespace()).count();
        let body = s.trim();
        if !body.is_empty() {
            let start = offset + lead;
            let span = Span { start, end: start + body.chars().count() };
            let present: BTreeSet<String> = tokenize(body).into_iter().collect();
            let score = terms
                .iter()
                .filter(|(t, _)| present.contains(t.as_str()))
                .map(|(_, w)| w.max(MIN_TERM_WEIGHT))
                .sum();
            out.push(Sentence { span, score });
        }
        offset += len;
    }
    out
}

/// Up to `max_spans` best sentences, in text order, with neighbours merged.
fn passages(text: &str, terms: &TermWeights, max_spans: usize) -> Vec<Span> {
    let sentences = sentences(text, terms);
    let mut ranked: Vec<usize> = (0..sentences.len()).filter(|&i| sentences[i].score > 0.0).collect();
    ranked.sort_by(|&a, &b| sentences[b].score.total_cmp(&sentences[a].score).then(a.cmp(&b)));
    ranked.truncate(max_spans);
    ranked.sort_unstable();

    let mut spans: Vec<Span> = Vec::with_capacity(ranked.len());
    let mut last: Option<usize> = None;
    for i in ranked {
        let span = sentences[i].span;
        match (last, spans.last_mut()) {
            (Some(prev), Some(open)) if prev + 1 == i => open.end = span.end,
            _ => spans.push(span),
        }
        last = Some(i);
    }
    spans
}

/// One or more citations per candidate, marked `[n]` by result position.
/// Spans never overlap within a chunk; a chunk without a matching sentence
/// gets a single whole-chunk citation.
pub fn map_citations(candidates: &[ScoredCandidate], terms: &TermWeights, max_spans: usize) -> Vec<Citation> {
    let mut citations = Vec::with_capacity(candidates.len());
    for (i, c) in candidates.iter().enumerate() {
        let marker = format!("[{}]", i + 1);
        let spans = passages(&c.chunk.text, terms, max_spans);
        if spans.is_empty() {
            citations.push(Citation {
                marker,
                chunk_id: c.chunk.id.clone(),
                span: Span { start: 0, end: c.chunk.text.chars().count() },
                kind: CitationKind::WholeChunk,
            });
            continue;
        }
        for span in spans {
            citations.push(Citation { marker: marker.clone(), chunk_id: c.chunk.id.clone(), span, kind: CitationKind::Passage });
        }
    }
    citations
}

/// `text` with every word that is a query term wrapped in `<em>`.
pub fn highlight(text: &str, terms: &TermWeights) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for word in text.split_word_bounds() {
        if terms.contains_key(&word.to_lowercase()) {
            out.push_str("<em>");
            out.push_str(word);
            out.push_str("</em>");
        } else {
            out.push_str(word);
        }
    }
    out
}

pub fn doc_aggs(candidates: &[ScoredCandidate]) -> Vec<DocAgg> {
    let mut by_doc: BTreeMap<&str, DocAgg> = BTreeMap::new();
    for c in candidates {
        by_doc
            .entry(c.chunk.doc_id.as_str())
            .or_insert_with(|| DocAgg { doc_id: c.chunk.doc_id.clone(), doc_name: c.chunk.doc_name.clone(), count: 0 })
            .count += 1;
    }
    let mut aggs: Vec<DocAgg> = by_doc.into_values().collect();
    aggs.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.doc_id.cmp(&b.doc_id)));
    aggs
}
