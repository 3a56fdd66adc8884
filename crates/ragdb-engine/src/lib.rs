//! The retrieval engine: lazy bootstrap, ingestion, and query orchestration.
//!
//! Initialization is exactly-once under concurrent callers and retried on
//! the next use if it fails. Index mutation (`insert`, `clear`) runs under a
//! single writer; searches and source listings share read access.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::{OnceCell, RwLock};

use ragdb_core::chunker::Chunker;
use ragdb_core::config::{expand_path, EngineConfig};
use ragdb_core::error::{EmbeddingError, IndexError, IngestionError};
use ragdb_core::loader;
use ragdb_core::traits::{Embedder, IndexBackend};
use ragdb_core::types::{content_hash, CacheEntry, DocumentChunk};
use ragdb_embed::build_embedder;
use ragdb_vector::LanceVectorStore;

pub use ragdb_core::config;
pub use ragdb_core::error;

struct EngineInner {
    embedder: Arc<dyn Embedder>,
    store: RwLock<Box<dyn IndexBackend>>,
}

pub struct RagEngine {
    config: EngineConfig,
    chunker: Chunker,
    inner: OnceCell<Arc<EngineInner>>,
}

impl RagEngine {
    pub fn new(config: EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(&config.chunking)?;
        Ok(Self { config, chunker, inner: OnceCell::new() })
    }

    /// Build an engine over a prebuilt embedder and storage backend.
    pub fn with_parts(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        store: Box<dyn IndexBackend>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(&config.chunking)?;
        let inner = Arc::new(EngineInner { embedder, store: RwLock::new(store) });
        Ok(Self { config, chunker, inner: OnceCell::new_with(Some(inner)) })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Idempotent lazy bootstrap. Exactly one initialization runs no matter
    /// how many callers race it; a failure is retried on the next call.
    pub async fn ensure_initialized(&self) -> anyhow::Result<()> {
        self.inner().await.map(|_| ())
    }

    async fn inner(&self) -> anyhow::Result<&Arc<EngineInner>> {
        self.inner
            .get_or_try_init(|| async {
                let embedder = build_embedder(&self.config.embedding)?;
                let db_dir = expand_path(&self.config.data.db_dir);
                let store = LanceVectorStore::open(
                    &db_dir,
                    &self.config.data.table,
                    self.config.embedding.dim,
                )
                .await?;
                tracing::info!(
                    db_dir = %db_dir.display(),
                    embedder = embedder.id(),
                    "engine initialized"
                );
                Ok::<_, anyhow::Error>(Arc::new(EngineInner {
                    embedder,
                    store: RwLock::new(Box::new(store)),
                }))
            })
            .await
    }

    /// Load, chunk, embed and index one document. Returns the number of
    /// chunks committed. On any sub-failure the index is left untouched.
    pub async fn ingest_document(&self, path: impl AsRef<Path>) -> Result<usize, IngestionError> {
        let inner =
            self.inner().await.map_err(|e| IngestionError::Init(e.to_string()))?;
        let path = path.as_ref().to_path_buf();
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        let text = tokio::task::spawn_blocking(move || loader::load(&path))
            .await
            .map_err(|e| IngestionError::Init(format!("loader task failed: {}", e)))??;

        let pieces = self.chunker.chunk(&text);
        if pieces.is_empty() {
            return Ok(0);
        }
        let total = pieces.len();
        let mut chunks: Vec<DocumentChunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, piece)| DocumentChunk::new(&source, i, piece))
            .collect();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }

        let embedder = inner.embedder.clone();
        let hashes: Vec<String> = chunks.iter().map(|c| content_hash(&c.content)).collect();
        let cached = {
            let store = inner.store.read().await;
            store.get_many(embedder.id(), &hashes).await?
        };
        let mut vectors: Vec<Option<Vec<f32>>> =
            hashes.iter().map(|h| cached.get(h).cloned()).collect();
        let miss_indices: Vec<usize> = vectors
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_none())
            .map(|(i, _)| i)
            .collect();

        let mut new_entries: Vec<CacheEntry> = Vec::new();
        if !miss_indices.is_empty() {
            let batch_inputs: Vec<(Vec<usize>, Vec<String>)> = miss_indices
                .chunks(self.config.embedding.batch_size)
                .map(|idxs| {
                    (idxs.to_vec(), idxs.iter().map(|&i| chunks[i].content.clone()).collect())
                })
                .collect();
            let max_retries = self.config.embedding.max_retries;
            let backoff = Duration::from_millis(self.config.embedding.retry_backoff_ms);

            let results: Vec<(Vec<usize>, Vec<Vec<f32>>)> = stream::iter(batch_inputs)
                .map(|(idxs, texts)| {
                    let embedder = embedder.clone();
                    async move {
                        let vecs =
                            embed_with_retry(embedder.as_ref(), &texts, max_retries, backoff)
                                .await?;
                        Ok::<_, EmbeddingError>((idxs, vecs))
                    }
                })
                .buffered(self.config.embedding.concurrency)
                .try_collect()
                .await?;

            for (idxs, vecs) in results {
                if vecs.len() != idxs.len() {
                    return Err(IngestionError::Embed(EmbeddingError::BadResponse(format!(
                        "expected {} vectors, got {}",
                        idxs.len(),
                        vecs.len()
                    ))));
                }
                for (j, i) in idxs.into_iter().enumerate() {
                    new_entries.push(CacheEntry {
                        content_hash: hashes[i].clone(),
                        embedder_id: embedder.id().to_string(),
                        vector: vecs[j].clone(),
                    });
                    vectors[i] = Some(vecs[j].clone());
                }
            }
        }

        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for vector in vectors {
            match vector {
                Some(v) => embeddings.push(v),
                None => {
                    return Err(IngestionError::Embed(EmbeddingError::BadResponse(
                        "embedder produced fewer vectors than inputs".to_string(),
                    )))
                }
            }
        }

        {
            // Single writer section: cache write-through plus the one
            // batch-atomic insert.
            let store = inner.store.write().await;
            if !new_entries.is_empty() {
                store.put_many(&new_entries).await?;
            }
            store.insert(&chunks, &embeddings).await?;
        }
        tracing::info!(source = %source, chunks = total, "ingested document");
        Ok(total)
    }

    /// Retrieve context for `text`. Never fails: an empty index — or any
    /// internal failure — yields an empty context and no sources.
    pub async fn query(&self, text: &str) -> (String, Vec<String>) {
        match self.query_inner(text).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(error = %e, "query failed; returning empty context");
                (String::new(), Vec::new())
            }
        }
    }

    async fn query_inner(&self, text: &str) -> anyhow::Result<(String, Vec<String>)> {
        let inner = self.inner().await?;
        let max_retries = self.config.embedding.max_retries;
        let backoff = Duration::from_millis(self.config.embedding.retry_backoff_ms);
        let query_text = [text.to_string()];
        let query_vec = embed_with_retry(inner.embedder.as_ref(), &query_text, max_retries, backoff)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for the query"))?;

        let hits = {
            let store = inner.store.read().await;
            match store.search(&query_vec, self.config.retrieval.top_k).await {
                Ok(hits) => hits,
                Err(IndexError::EmptyIndex) => return Ok((String::new(), Vec::new())),
                Err(e) => return Err(e.into()),
            }
        };

        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        for hit in &hits {
            if seen.insert(hit.chunk.source.clone()) {
                sources.push(hit.chunk.source.clone());
            }
        }
        let context =
            hits.iter().map(|h| h.chunk.content.as_str()).collect::<Vec<_>>().join("\n\n");
        Ok((context, sources))
    }

    /// Distinct document identifiers (filenames) currently indexed.
    pub async fn list_documents(&self) -> anyhow::Result<Vec<String>> {
        let inner = self.inner().await?;
        let store = inner.store.read().await;
        Ok(store.list_sources().await?)
    }

    /// Remove every indexed chunk and the embedding cache. Idempotent.
    pub async fn clear_db(&self) -> anyhow::Result<()> {
        let inner = self.inner().await?;
        let store = inner.store.write().await;
        store.clear().await?;
        tracing::info!("knowledge base cleared");
        Ok(())
    }

    pub async fn count_chunks(&self) -> anyhow::Result<usize> {
        let inner = self.inner().await?;
        let store = inner.store.read().await;
        Ok(store.count().await?)
    }
}

/// Bounded exponential backoff around the embedder; only transient
/// failures are retried.
async fn embed_with_retry(
    embedder: &dyn Embedder,
    texts: &[String],
    max_retries: usize,
    backoff: Duration,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut attempt = 0usize;
    loop {
        match embedder.embed_batch(texts).await {
            Ok(vectors) => return Ok(vectors),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                let delay = backoff * 2u32.saturating_pow(attempt as u32 - 1);
                tracing::warn!(error = %e, attempt, "embedding failed; retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
