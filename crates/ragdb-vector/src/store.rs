//! The persistent vector index over a Lance dataset directory.
//!
//! Writes are batch-atomic: an ingestion's rows land in a single `add` of
//! one record batch, so a concurrent reader sees either all of a document's
//! chunks or none. Re-inserting a source replaces its prior rows.

use anyhow::anyhow;
use arrow_array::{
    FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, TimestampMillisecondArray,
};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use ragdb_core::error::IndexError;
use ragdb_core::traits::{EmbeddingCache, VectorStore};
use ragdb_core::types::{CacheEntry, DocumentChunk, ScoredChunk};

use crate::cache;
use crate::schema::chunks_schema;
use crate::table::{get_meta, open_db, set_meta, table_exists};

/// ANN results are over-fetched, then re-ranked with stable tie breaking.
const SEARCH_OVERFETCH: usize = 10;

fn storage<E: Into<anyhow::Error>>(e: E) -> IndexError {
    IndexError::Storage(e.into())
}

fn sql_quote(s: &str) -> String {
    s.replace('\'', "''")
}

pub struct LanceVectorStore {
    conn: Connection,
    chunks_table: String,
    cache_table: String,
    meta_table: String,
    dim: usize,
}

impl LanceVectorStore {
    /// Open (or create) the dataset directory. Rejects a directory whose
    /// recorded embedding dimension differs from `dim`.
    pub async fn open(db_dir: &Path, table: &str, dim: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(db_dir)?;
        let conn = open_db(db_dir.to_string_lossy().as_ref()).await?;
        let store = Self {
            conn,
            chunks_table: table.to_string(),
            cache_table: format!("{}_cache", table),
            meta_table: "meta".to_string(),
            dim,
        };
        if let Some(recorded) = get_meta(&store.conn, &store.meta_table, &store.dim_key()).await? {
            if let Ok(recorded) = recorded.parse::<usize>() {
                anyhow::ensure!(
                    recorded == dim,
                    "index at {} holds {}-dim vectors but embedder is configured for {}",
                    db_dir.display(),
                    recorded,
                    dim
                );
            }
        }
        Ok(store)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn dim_key(&self) -> String {
        format!("dim:{}", self.chunks_table)
    }

    fn seq_key(&self) -> String {
        format!("next_seq:{}", self.chunks_table)
    }

    async fn next_seq(&self) -> anyhow::Result<i64> {
        let recorded = get_meta(&self.conn, &self.meta_table, &self.seq_key()).await?;
        Ok(recorded.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
    }

    fn to_record_batch(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
        first_seq: i64,
    ) -> anyhow::Result<RecordBatch> {
        let schema = chunks_schema(self.dim as i32);
        let now = Utc::now().timestamp_millis();
        let mut ids = Vec::new();
        let mut sources = Vec::new();
        let mut contents = Vec::new();
        let mut chunk_indices = Vec::new();
        let mut totals = Vec::new();
        let mut seqs = Vec::new();
        let mut created = Vec::new();
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
        for (i, (chunk, embedding)) in chunks.iter().zip(embeddings.iter()).enumerate() {
            ids.push(chunk.id.clone());
            sources.push(chunk.source.clone());
            contents.push(chunk.content.clone());
            chunk_indices.push(chunk.chunk_index as i32);
            totals.push(chunk.total_chunks as i32);
            seqs.push(first_seq + i as i64);
            created.push(now);
            vectors.push(Some(embedding.iter().map(|&x| Some(x)).collect()));
        }
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(contents)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(Int32Array::from(totals)),
                Arc::new(Int64Array::from(seqs)),
                Arc::new(TimestampMillisecondArray::from(created)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(vectors.into_iter(), self.dim as i32)),
            ],
        )?;
        Ok(batch)
    }
}

fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| storage(anyhow!("column '{}' missing or mistyped", name)))
}

fn i32_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| storage(anyhow!("column '{}' missing or mistyped", name)))
}

fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| storage(anyhow!("column '{}' missing or mistyped", name)))
}

fn f32_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float32Array, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| storage(anyhow!("column '{}' missing or mistyped", name)))
}

#[async_trait::async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }
        if chunks.len() != embeddings.len() {
            return Err(storage(anyhow!(
                "chunks and embeddings length mismatch: {} vs {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        for e in embeddings {
            if e.len() != self.dim {
                return Err(IndexError::DimensionMismatch { expected: self.dim, got: e.len() });
            }
        }

        let exists = table_exists(&self.conn, &self.chunks_table).await.map_err(storage)?;
        if exists {
            // Replace policy: prior rows of the batch's sources go away first.
            let sources: BTreeSet<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
            let list = sources
                .iter()
                .map(|s| format!("'{}'", sql_quote(s)))
                .collect::<Vec<_>>()
                .join(",");
            let t = self.conn.open_table(&self.chunks_table).execute().await.map_err(storage)?;
            t.delete(&format!("source IN ({})", list)).await.map_err(storage)?;
        }

        let first_seq = self.next_seq().await.map_err(storage)?;
        let batch = self.to_record_batch(chunks, embeddings, first_seq).map_err(storage)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        if exists {
            let t = self.conn.open_table(&self.chunks_table).execute().await.map_err(storage)?;
            t.add(reader).execute().await.map_err(storage)?;
        } else {
            self.conn
                .create_table(&self.chunks_table, reader)
                .execute()
                .await
                .map_err(storage)?;
        }

        let next = first_seq + chunks.len() as i64;
        set_meta(&self.conn, &self.meta_table, &self.seq_key(), &next.to_string())
            .await
            .map_err(storage)?;
        set_meta(&self.conn, &self.meta_table, &self.dim_key(), &self.dim.to_string())
            .await
            .map_err(storage)?;
        tracing::debug!(rows = chunks.len(), table = %self.chunks_table, "inserted batch");
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch { expected: self.dim, got: query.len() });
        }
        if !table_exists(&self.conn, &self.chunks_table).await.map_err(storage)? {
            return Err(IndexError::EmptyIndex);
        }
        let t = self.conn.open_table(&self.chunks_table).execute().await.map_err(storage)?;
        if t.count_rows(None).await.map_err(storage)? == 0 {
            return Err(IndexError::EmptyIndex);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let fetch = k.saturating_mul(SEARCH_OVERFETCH);
        let mut stream = t
            .vector_search(query.to_vec())
            .map_err(storage)?
            .distance_type(DistanceType::Cosine)
            .limit(fetch)
            .execute()
            .await
            .map_err(storage)?;

        let mut hits: Vec<(ScoredChunk, i64)> = Vec::new();
        while let Some(batch) = TryStreamExt::try_next(&mut stream).await.map_err(storage)? {
            let ids = str_col(&batch, "id")?;
            let sources = str_col(&batch, "source")?;
            let contents = str_col(&batch, "content")?;
            let chunk_indices = i32_col(&batch, "chunk_index")?;
            let totals = i32_col(&batch, "total_chunks")?;
            let seqs = i64_col(&batch, "seq")?;
            let distances = f32_col(&batch, "_distance")?;
            for i in 0..batch.num_rows() {
                let chunk = DocumentChunk {
                    id: ids.value(i).to_string(),
                    source: sources.value(i).to_string(),
                    content: contents.value(i).to_string(),
                    chunk_index: chunk_indices.value(i) as usize,
                    total_chunks: totals.value(i) as usize,
                };
                let score = 1.0 - distances.value(i);
                hits.push((ScoredChunk { chunk, score }, seqs.value(i)));
            }
        }

        // Descending score; equal scores rank by insertion order.
        hits.sort_by(|a, b| {
            b.0.score
                .partial_cmp(&a.0.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        hits.truncate(k);
        Ok(hits.into_iter().map(|(hit, _)| hit).collect())
    }

    async fn list_sources(&self) -> Result<Vec<String>, IndexError> {
        if !table_exists(&self.conn, &self.chunks_table).await.map_err(storage)? {
            return Ok(Vec::new());
        }
        let t = self.conn.open_table(&self.chunks_table).execute().await.map_err(storage)?;
        let mut stream = t
            .query()
            .select(Select::columns(&["source"]))
            .execute()
            .await
            .map_err(storage)?;
        let mut sources = BTreeSet::new();
        while let Some(batch) = TryStreamExt::try_next(&mut stream).await.map_err(storage)? {
            let col = str_col(&batch, "source")?;
            for i in 0..batch.num_rows() {
                sources.insert(col.value(i).to_string());
            }
        }
        Ok(sources.into_iter().collect())
    }

    async fn clear(&self) -> Result<(), IndexError> {
        for name in [&self.chunks_table, &self.cache_table, &self.meta_table] {
            if table_exists(&self.conn, name).await.map_err(storage)? {
                self.conn.drop_table(name, &[]).await.map_err(storage)?;
            }
        }
        tracing::debug!(table = %self.chunks_table, "cleared index");
        Ok(())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        if !table_exists(&self.conn, &self.chunks_table).await.map_err(storage)? {
            return Ok(0);
        }
        let t = self.conn.open_table(&self.chunks_table).execute().await.map_err(storage)?;
        t.count_rows(None).await.map_err(storage)
    }
}

#[async_trait::async_trait]
impl EmbeddingCache for LanceVectorStore {
    async fn get_many(
        &self,
        embedder_id: &str,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<f32>>, IndexError> {
        cache::get_many(&self.conn, &self.cache_table, self.dim, embedder_id, hashes)
            .await
            .map_err(storage)
    }

    async fn put_many(&self, entries: &[CacheEntry]) -> Result<(), IndexError> {
        cache::put_many(&self.conn, &self.cache_table, self.dim, entries)
            .await
            .map_err(storage)
    }
}
