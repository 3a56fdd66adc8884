use std::collections::HashMap;

use crate::error::{EmbeddingError, IndexError};
use crate::types::{CacheEntry, DocumentChunk, ScoredChunk};

/// Maps text to fixed-dimension vectors. Implementations hold no mutable
/// state and are safe to call concurrently for independent inputs.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g., `hash:xx64:d384`).
    fn id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Maximum input length in characters.
    fn max_input_len(&self) -> usize;
    /// Compute embeddings for a batch of input texts, one vector per input,
    /// in input order. Vectors are L2-normalized.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Persistent store of (embedding, chunk, source) triples.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Atomically add a batch of entries. Entries for a source already in
    /// the index replace that source's prior entries. On failure nothing
    /// from the batch is persisted.
    async fn insert(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), IndexError>;

    /// The `k` entries most similar to `query`, descending score, ties
    /// broken by insertion order. `EmptyIndex` if no entries exist.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Distinct `source` values currently indexed.
    async fn list_sources(&self) -> Result<Vec<String>, IndexError>;

    /// Remove all entries. Idempotent.
    async fn clear(&self) -> Result<(), IndexError>;

    /// Number of entries currently indexed.
    async fn count(&self) -> Result<usize, IndexError>;
}

/// Write-through cache of chunk embeddings, scoped to an embedder id.
/// Cleared together with the index it backs.
#[async_trait::async_trait]
pub trait EmbeddingCache: Send + Sync {
    async fn get_many(
        &self,
        embedder_id: &str,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<f32>>, IndexError>;

    async fn put_many(&self, entries: &[CacheEntry]) -> Result<(), IndexError>;
}

/// Full storage backend surface the orchestrator runs against.
pub trait IndexBackend: VectorStore + EmbeddingCache {}

impl<T: VectorStore + EmbeddingCache> IndexBackend for T {}
