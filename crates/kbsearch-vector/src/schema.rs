use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Column layout of a chunk table. `metadata` is a JSON object string and
/// `vector` a fixed-size list of `dim` floats.
pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("kb_id", DataType::Utf8, false),
		Field::new("doc_id", DataType::Utf8, false),
		Field::new("doc_name", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("position", DataType::Int64, false),
		Field::new("metadata", DataType::Utf8, true),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
