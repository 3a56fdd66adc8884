//! Lance-backed embedding cache keyed by `(content_hash, embedder_id)`.
//!
//! The cache is consulted prior to calling a provider and written through
//! on misses. It lives beside the chunk table and is dropped with it.

use anyhow::Result;
use arrow_array::cast::AsArray;
use arrow_array::{
    FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray,
};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ragdb_core::types::CacheEntry;

use crate::schema::cache_schema;
use crate::table::table_exists;

pub async fn get_many(
    conn: &Connection,
    table: &str,
    dim: usize,
    embedder_id: &str,
    hashes: &[String],
) -> Result<HashMap<String, Vec<f32>>> {
    if hashes.is_empty() || !table_exists(conn, table).await? {
        return Ok(HashMap::new());
    }
    let wanted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
    let t = conn.open_table(table).execute().await?;
    // naive scan; the cache stays small relative to the corpus
    let mut out = HashMap::new();
    let mut stream = t.query().execute().await?;
    while let Some(batch) = TryStreamExt::try_next(&mut stream).await? {
        let hash_col = batch
            .column_by_name("content_hash")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("cache.content_hash column missing"))?;
        let eid_col = batch
            .column_by_name("embedder_id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("cache.embedder_id column missing"))?;
        let vec_col = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| anyhow::anyhow!("cache.vector column missing"))?;
        for i in 0..batch.num_rows() {
            if eid_col.value(i) != embedder_id {
                continue;
            }
            let h = hash_col.value(i);
            if !wanted.contains(h) {
                continue;
            }
            let list = vec_col.value(i);
            let vals = list
                .as_primitive::<arrow_array::types::Float32Type>()
                .values()
                .iter()
                .copied()
                .collect::<Vec<f32>>();
            if vals.len() == dim {
                out.insert(h.to_string(), vals);
            }
        }
    }
    Ok(out)
}

pub async fn put_many(
    conn: &Connection,
    table: &str,
    dim: usize,
    entries: &[CacheEntry],
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let schema = cache_schema(dim as i32);
    if !table_exists(conn, table).await? {
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
        conn.create_table(table, Box::new(iter)).execute().await?;
    }
    let t = conn.open_table(table).execute().await?;

    let mut hashes = Vec::new();
    let mut eids = Vec::new();
    let mut created = Vec::new();
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    let now = Utc::now().timestamp_millis();
    for e in entries {
        anyhow::ensure!(
            e.vector.len() == dim,
            "cache entry dimension {} does not match {}",
            e.vector.len(),
            dim
        );
        hashes.push(e.content_hash.clone());
        eids.push(e.embedder_id.clone());
        created.push(now);
        vectors.push(Some(e.vector.iter().map(|&x| Some(x)).collect()));
    }
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(hashes)),
            Arc::new(StringArray::from(eids)),
            Arc::new(TimestampMillisecondArray::from(created)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<
                arrow_array::types::Float32Type,
                _,
                _,
            >(vectors.into_iter(), dim as i32)),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    t.add(reader).execute().await?;
    Ok(())
}
