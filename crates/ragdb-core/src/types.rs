//! Domain types used by the ingestion and retrieval engines.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// A chunk of a source document that is independently embedded and indexed.
///
/// - `id`: globally unique chunk identifier (`"{source}:{chunk_index}"`)
/// - `source`: originating document filename, the document's identity
/// - `content`: the text payload of the chunk
/// - `chunk_index`/`total_chunks`: position within the parent document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub source: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

impl DocumentChunk {
    pub fn new(source: &str, chunk_index: usize, content: String) -> Self {
        Self {
            id: format!("{}:{}", source, chunk_index),
            source: source.to_string(),
            content,
            chunk_index,
            total_chunks: 0,
        }
    }
}

/// A retrieved chunk with its similarity score. Higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// A cached embedding keyed by `(content_hash, embedder_id)`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
}

/// Stable content hash used as the embedding-cache key.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
