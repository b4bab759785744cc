use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use kbsearch_core::tokenize::STOP_WORDS;

pub const TEXT_TOKENIZER: &str = "text_with_stopwords";

/// Schema of a chunk index. `metadata` holds the chunk metadata as a JSON object string.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("kb_id", STRING | STORED);
	schema_builder.add_text_field("doc_id", STRING | STORED);
	schema_builder.add_text_field("doc_name", STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TEXT_TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field("text", text_options);
	schema_builder.add_u64_field("position", STORED);
	schema_builder.add_text_field("metadata", STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TEXT_TOKENIZER, tokenizer);
}

/// Resolved field handles of the chunk schema.
#[derive(Debug, Clone, Copy)]
pub struct ChunkFields {
	pub id: Field,
	pub kb_id: Field,
	pub doc_id: Field,
	pub doc_name: Field,
	pub text: Field,
	pub position: Field,
	pub metadata: Field,
}

impl ChunkFields {
	pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			id: schema.get_field("id")?,
			kb_id: schema.get_field("kb_id")?,
			doc_id: schema.get_field("doc_id")?,
			doc_name: schema.get_field("doc_name")?,
			text: schema.get_field("text")?,
			position: schema.get_field("position")?,
			metadata: schema.get_field("metadata")?,
		})
	}
}
