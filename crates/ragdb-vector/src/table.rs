//! LanceDB connection and housekeeping helpers.
//!
//! Database open, existence checks, and a small key/value meta table used
//! for the insertion-ordinal counter and the recorded embedding dimension.

use anyhow::Result;
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.contains(&name.to_string()))
}

fn meta_schema() -> Arc<arrow_schema::Schema> {
    Arc::new(arrow_schema::Schema::new(vec![
        arrow_schema::Field::new("key", arrow_schema::DataType::Utf8, false),
        arrow_schema::Field::new("value", arrow_schema::DataType::Utf8, false),
        arrow_schema::Field::new(
            "updated_at",
            arrow_schema::DataType::Timestamp(arrow_schema::TimeUnit::Millisecond, None),
            false,
        ),
    ]))
}

pub async fn ensure_meta_table(conn: &Connection, name: &str) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), meta_schema());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_meta_table(conn, table).await?;
    let t = conn.open_table(table).execute().await?;
    let rb = RecordBatch::try_new(
        meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), meta_schema()));
    // Upsert via merge_insert: key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    let _ = mi.execute(reader).await?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, table).await? {
        return Ok(None);
    }
    let t = conn.open_table(table).execute().await?;
    let mut stream = t
        .query()
        .only_if(format!("key = '{}'", key.replace('\'', "''")))
        .execute()
        .await?;
    while let Some(batch) = TryStreamExt::try_next(&mut stream).await? {
        if batch.num_rows() == 0 {
            continue;
        }
        let val = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("meta.value column missing"))?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}
