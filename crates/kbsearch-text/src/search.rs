use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, ConstScoreQuery, Occur, Query as TantivyQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument, Term};

use kbsearch_core::traits::LexicalSearcher;
use kbsearch_core::types::{Chunk, Meta, Query, Scope, SearchHit, SourceKind, TermWeights};
use kbsearch_core::weight::TermStats;

use crate::tantivy_utils::{register_tokenizer, ChunkFields};

/// Lexical searcher over a Tantivy chunk index.
///
/// Each weighted query term becomes a boosted BM25 term clause; the scope is
/// applied as zero-score filter clauses so it never changes the ranking.
pub struct TantivyLexicalSearcher {
	index: Index,
	reader: IndexReader,
	fields: ChunkFields,
}

impl TantivyLexicalSearcher {
	pub fn open(index_dir: &Path) -> Result<Self> {
		let index = Index::open_in_dir(index_dir)?;
		Self::from_index(index)
	}

	pub fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = ChunkFields::resolve(&index.schema())?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, fields })
	}

	pub fn index(&self) -> &Index { &self.index }

	/// Picks up segments committed since the reader was opened.
	pub fn reload(&self) -> Result<()> { Ok(self.reader.reload()?) }

	/// Walks the text field's term dictionaries and builds a document-frequency table.
	pub fn load_term_stats(&self) -> Result<TermStats> {
		let searcher = self.reader.searcher();
		let mut stats = TermStats { doc_count: searcher.num_docs(), ..TermStats::default() };
		for segment in searcher.segment_readers() {
			let inverted = segment.inverted_index(self.fields.text)?;
			stats.total_tokens += inverted.total_num_tokens();
			let mut stream = inverted.terms().stream()?;
			while stream.advance() {
				let term = String::from_utf8_lossy(stream.key()).into_owned();
				*stats.doc_freq.entry(term).or_insert(0) += u64::from(stream.value().doc_freq);
			}
		}
		Ok(stats)
	}
}

#[async_trait]
impl LexicalSearcher for TantivyLexicalSearcher {
	async fn search(&self, query: &Query, scope: &Scope, limit: usize) -> Result<Vec<SearchHit>> {
		if limit == 0 { return Ok(Vec::new()); }
		let Some(q) = build_query(self.fields, &query.terms, scope) else { return Ok(Vec::new()) };
		let searcher = self.reader.searcher();
		let fields = self.fields;
		let filters = query.filters.clone();
		// Metadata filters are applied after retrieval, so over-fetch to keep `limit` reachable.
		let fetch = if filters.is_empty() { limit } else { limit.saturating_mul(4) };
		tokio::task::spawn_blocking(move || -> Result<Vec<SearchHit>> {
			let top_docs = searcher.search(&q, &TopDocs::with_limit(fetch))?;
			let mut hits = Vec::new();
			for (score, addr) in top_docs {
				let doc: TantivyDocument = searcher.doc(addr)?;
				let chunk = chunk_from_doc(&doc, fields)?;
				if !filters.matches(&chunk) { continue; }
				hits.push(SearchHit { chunk, score, source: SourceKind::Text });
				if hits.len() == limit { break; }
			}
			Ok(hits)
		})
		.await?
	}
}

fn build_query(fields: ChunkFields, terms: &TermWeights, scope: &Scope) -> Option<Box<dyn TantivyQuery>> {
	let term_clauses: Vec<(Occur, Box<dyn TantivyQuery>)> = terms
		.iter()
		.filter(|(_, w)| w.is_finite() && **w > 0.0)
		.map(|(t, w)| {
			let tq = TermQuery::new(Term::from_field_text(fields.text, &t.to_lowercase()), IndexRecordOption::WithFreqs);
			(Occur::Should, Box::new(BoostQuery::new(Box::new(tq), *w)) as Box<dyn TantivyQuery>)
		})
		.collect();
	if term_clauses.is_empty() { return None; }
	let mut clauses: Vec<(Occur, Box<dyn TantivyQuery>)> = vec![(Occur::Must, Box::new(BooleanQuery::new(term_clauses)) as Box<dyn TantivyQuery>)];
	clauses.push((Occur::Must, any_of(fields.kb_id, &scope.kb_ids)));
	if let Some(docs) = &scope.doc_ids { clauses.push((Occur::Must, any_of(fields.doc_id, docs))); }
	Some(Box::new(BooleanQuery::new(clauses)))
}

fn any_of(field: Field, values: &BTreeSet<String>) -> Box<dyn TantivyQuery> {
	let should: Vec<(Occur, Box<dyn TantivyQuery>)> = values
		.iter()
		.map(|v| (Occur::Should, Box::new(TermQuery::new(Term::from_field_text(field, v), IndexRecordOption::Basic)) as Box<dyn TantivyQuery>))
		.collect();
	Box::new(ConstScoreQuery::new(Box::new(BooleanQuery::new(should)), 0.0))
}

fn text_value(doc: &TantivyDocument, field: Field) -> String {
	doc.get_first(field).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

pub(crate) fn chunk_from_doc(doc: &TantivyDocument, fields: ChunkFields) -> Result<Chunk> {
	let raw_meta = text_value(doc, fields.metadata);
	let metadata: Meta = if raw_meta.is_empty() { Meta::new() } else { serde_json::from_str(&raw_meta)? };
	Ok(Chunk {
		id: text_value(doc, fields.id),
		kb_id: text_value(doc, fields.kb_id),
		doc_id: text_value(doc, fields.doc_id),
		doc_name: text_value(doc, fields.doc_name),
		text: text_value(doc, fields.text),
		position: doc.get_first(fields.position).and_then(|v| v.as_u64()).unwrap_or(0),
		embedding: None,
		term_vector: TermWeights::new(),
		metadata,
	})
}
