use anyhow::{anyhow, Result};
use std::collections::BTreeSet;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};

use kbsearch_core::config::SimilarityMetric;
use kbsearch_core::traits::VectorSearcher;
use kbsearch_core::types::{Chunk, Filters, Meta, Scope, SearchHit, SourceKind, TermWeights};

/// Vector searcher over a LanceDB chunk table.
pub struct LanceVectorSearcher {
	db: Connection,
	table_name: String,
	metric: SimilarityMetric,
}

impl LanceVectorSearcher {
	pub async fn open(uri: &str, table_name: &str, metric: SimilarityMetric) -> Result<Self> {
		let db = connect(uri).execute().await?;
		Ok(Self { db, table_name: table_name.to_string(), metric })
	}

	pub fn from_connection(db: Connection, table_name: &str, metric: SimilarityMetric) -> Self {
		Self { db, table_name: table_name.to_string(), metric }
	}
}

fn distance_type(metric: SimilarityMetric) -> DistanceType {
	match metric {
		SimilarityMetric::Cosine => DistanceType::Cosine,
		SimilarityMetric::InnerProduct => DistanceType::Dot,
	}
}

fn quote_list(values: &BTreeSet<String>) -> String {
	values.iter().map(|v| format!("'{}'", v.replace('\'', "''"))).collect::<Vec<_>>().join(",")
}

/// SQL predicate restricting a search to `scope`; `None` when nothing can match.
pub(crate) fn scope_predicate(scope: &Scope) -> Option<String> {
	if scope.is_empty() { return None; }
	let mut predicate = format!("kb_id IN ({})", quote_list(&scope.kb_ids));
	if let Some(docs) = &scope.doc_ids { predicate.push_str(&format!(" AND doc_id IN ({})", quote_list(docs))); }
	Some(predicate)
}

#[async_trait]
impl VectorSearcher for LanceVectorSearcher {
	async fn search_vec(&self, embedding: &[f32], scope: &Scope, filters: &Filters, limit: usize) -> Result<Vec<SearchHit>> {
		let Some(predicate) = scope_predicate(scope) else { return Ok(Vec::new()) };
		if limit == 0 { return Ok(Vec::new()); }
		let fetch = if filters.is_empty() { limit } else { limit.saturating_mul(4) };
		let table = self.db.open_table(&self.table_name).execute().await?;
		let mut stream = table
			.vector_search(embedding.to_vec())?
			.distance_type(distance_type(self.metric))
			.only_if(predicate)
			.limit(fetch)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			for hit in hits_from_batch(&batch)? {
				if filters.matches(&hit.chunk) && hits.len() < limit { hits.push(hit); }
			}
		}
		Ok(hits)
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("missing {} column", name))
}

pub(crate) fn hits_from_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
	let ids = string_col(batch, "id")?;
	let kb_ids = string_col(batch, "kb_id")?;
	let doc_ids = string_col(batch, "doc_id")?;
	let doc_names = string_col(batch, "doc_name")?;
	let texts = string_col(batch, "text")?;
	let metas = string_col(batch, "metadata")?;
	let positions = batch.column_by_name("position").and_then(|c| c.as_primitive_opt::<arrow_array::types::Int64Type>()).ok_or_else(|| anyhow!("missing position column"))?;
	let vectors = batch.column_by_name("vector").and_then(|c| c.as_fixed_size_list_opt()).ok_or_else(|| anyhow!("missing vector column"))?;
	let distances = batch.column_by_name("_distance").and_then(|c| c.as_primitive_opt::<Float32Type>()).ok_or_else(|| anyhow!("missing _distance column"))?;

	let mut hits = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let metadata: Meta = if metas.is_null(i) || metas.value(i).is_empty() { Meta::new() } else { serde_json::from_str(metas.value(i))? };
		let embedding = if vectors.is_valid(i) {
			vectors.value(i).as_primitive_opt::<Float32Type>().map(|v| v.values().to_vec())
		} else {
			None
		};
		let chunk = Chunk {
			id: ids.value(i).to_string(),
			kb_id: kb_ids.value(i).to_string(),
			doc_id: doc_ids.value(i).to_string(),
			doc_name: doc_names.value(i).to_string(),
			text: texts.value(i).to_string(),
			position: u64::try_from(positions.value(i)).unwrap_or(0),
			embedding,
			term_vector: TermWeights::new(),
			metadata,
		};
		// Lance reports cosine and dot as distances of the form `1 - similarity`.
		let score = 1.0 - distances.value(i);
		hits.push(SearchHit { chunk, score, source: SourceKind::Vector });
	}
	Ok(hits)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scope_predicate_quotes_values() {
		let scope = Scope::knowledge_bases(["kb", "o'brien"]).with_documents(["d1"]);
		assert_eq!(scope_predicate(&scope).as_deref(), Some("kb_id IN ('kb','o''brien') AND doc_id IN ('d1')"));
		assert_eq!(scope_predicate(&Scope::default()), None);
	}
}
