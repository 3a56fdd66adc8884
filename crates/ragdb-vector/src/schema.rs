use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

fn vector_field(dim: i32) -> Field {
    Field::new(
        "vector",
        DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
        true,
    )
}

/// One row per indexed chunk. `seq` is the global insertion ordinal used
/// for stable tie breaking in search results.
pub fn chunks_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("total_chunks", DataType::Int32, false),
        Field::new("seq", DataType::Int64, false),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        vector_field(dim),
    ]))
}

/// Embedding cache rows keyed by `(content_hash, embedder_id)`.
pub fn cache_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("embedder_id", DataType::Utf8, false),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        vector_field(dim),
    ]))
}
