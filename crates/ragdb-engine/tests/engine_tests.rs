use std::path::Path;
use std::sync::Arc;

use ragdb_core::config::EngineConfig;
use ragdb_core::error::{EmbeddingError, IngestionError};
use ragdb_core::traits::Embedder;
use ragdb_engine::RagEngine;

fn test_config(db_dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.data.db_dir = db_dir.to_string_lossy().to_string();
    config.embedding.provider = "hash".to_string();
    config.embedding.dim = 64;
    config.embedding.batch_size = 2;
    config.embedding.concurrency = 2;
    config.embedding.max_retries = 0;
    config.chunking.chunk_size = 200;
    config.chunking.overlap = 50;
    config.retrieval.top_k = 5;
    config
}

fn write_doc(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write test document");
    path
}

const FARM_NOTES: &str = "The homestead keeps three goats and a dozen hens near the barn.\n\n\
    Fencing the lower paddock took two weekends; the posts went in first, then the \
    wire mesh, and finally a gate salvaged from the old orchard entrance.\n\n\
    Water comes from the spring uphill, gravity-fed through a buried line.";

/// Embedder that refuses any text containing a marker; everything else
/// delegates to the deterministic hashing provider.
struct FlakyEmbedder {
    delegate: ragdb_embed::HashEmbedder,
    fail_on: String,
}

#[async_trait::async_trait]
impl Embedder for FlakyEmbedder {
    fn id(&self) -> &str {
        self.delegate.id()
    }
    fn dim(&self) -> usize {
        self.delegate.dim()
    }
    fn max_input_len(&self) -> usize {
        self.delegate.max_input_len()
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.contains(&self.fail_on)) {
            return Err(EmbeddingError::BadResponse("injected failure".to_string()));
        }
        self.delegate.embed_batch(texts).await
    }
}

#[tokio::test]
async fn round_trip_attributes_sources() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let engine = RagEngine::new(test_config(&tmp.path().join("db")))?;

    let doc = write_doc(tmp.path(), "farm.txt", FARM_NOTES);
    let count = engine.ingest_document(&doc).await?;
    assert!((2..=5).contains(&count), "got {} chunks", count);

    let (context, sources) = engine.query("gate salvaged from the old orchard").await;
    assert!(!context.is_empty());
    assert!(sources.contains(&"farm.txt".to_string()));
    Ok(())
}

#[tokio::test]
async fn empty_index_query_is_empty_success() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let engine = RagEngine::new(test_config(&tmp.path().join("db")))?;
    let (context, sources) = engine.query("anything at all").await;
    assert_eq!(context, "");
    assert!(sources.is_empty());
    Ok(())
}

#[tokio::test]
async fn clear_then_list_is_empty() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let engine = RagEngine::new(test_config(&tmp.path().join("db")))?;

    let doc = write_doc(tmp.path(), "farm.txt", FARM_NOTES);
    engine.ingest_document(&doc).await?;
    assert_eq!(engine.list_documents().await?, vec!["farm.txt".to_string()]);

    engine.clear_db().await?;
    assert!(engine.list_documents().await?.is_empty());
    let (context, sources) = engine.query("goats").await;
    assert_eq!(context, "");
    assert!(sources.is_empty());

    // Clearing an already-empty index is fine.
    engine.clear_db().await?;
    Ok(())
}

#[tokio::test]
async fn failed_embedding_leaves_index_untouched() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(&tmp.path().join("db"));
    let store = ragdb_vector::LanceVectorStore::open(
        &tmp.path().join("db"),
        &config.data.table,
        config.embedding.dim,
    )
    .await?;
    let embedder = Arc::new(FlakyEmbedder {
        delegate: ragdb_embed::HashEmbedder::new(config.embedding.dim),
        fail_on: "POISON".to_string(),
    });
    let engine = RagEngine::with_parts(config, embedder, Box::new(store))?;

    let good = write_doc(tmp.path(), "good.txt", FARM_NOTES);
    engine.ingest_document(&good).await?;

    // Second paragraph carries the marker, so embedding fails mid-document.
    let bad = write_doc(
        tmp.path(),
        "bad.txt",
        "A harmless first paragraph.\n\nThis one contains POISON and cannot embed.",
    );
    let err = engine.ingest_document(&bad).await.expect_err("ingest must fail");
    assert!(matches!(err, IngestionError::Embed(_)));

    // The partially-embedded document never became visible.
    assert_eq!(engine.list_documents().await?, vec!["good.txt".to_string()]);
    Ok(())
}

#[tokio::test]
async fn concurrent_ingests_each_commit() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let engine = Arc::new(RagEngine::new(test_config(&tmp.path().join("db")))?);

    let mut handles = Vec::new();
    for i in 0..4 {
        let engine = engine.clone();
        let doc = write_doc(
            tmp.path(),
            &format!("doc{}.txt", i),
            &format!("Document number {} talks about topic {}.", i, i),
        );
        handles.push(tokio::spawn(async move { engine.ingest_document(&doc).await }));
    }
    for handle in handles {
        let count = handle.await.expect("task join")?;
        assert_eq!(count, 1);
    }

    let docs = engine.list_documents().await?;
    assert_eq!(docs.len(), 4);
    for i in 0..4 {
        assert!(docs.contains(&format!("doc{}.txt", i)));
    }
    Ok(())
}

#[tokio::test]
async fn reingesting_a_filename_replaces_its_chunks() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let engine = RagEngine::new(test_config(&tmp.path().join("db")))?;

    let path = write_doc(tmp.path(), "notes.txt", FARM_NOTES);
    let first = engine.ingest_document(&path).await?;
    assert!(first > 1);

    std::fs::write(&path, "One short replacement paragraph.")?;
    let second = engine.ingest_document(&path).await?;
    assert_eq!(second, 1);

    assert_eq!(engine.list_documents().await?, vec!["notes.txt".to_string()]);
    assert_eq!(engine.count_chunks().await?, 1);

    let (context, _) = engine.query("replacement paragraph").await;
    assert!(context.contains("replacement"));
    assert!(!context.contains("goats"));
    Ok(())
}

#[tokio::test]
async fn raising_top_k_never_drops_sources() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let db = tmp.path().join("db");

    let narrow_sources = {
        let mut config = test_config(&db);
        config.retrieval.top_k = 1;
        let engine = RagEngine::new(config)?;
        for i in 0..3 {
            let doc = write_doc(
                tmp.path(),
                &format!("topic{}.txt", i),
                &format!("Paragraph about shared farm chores and topic {}.", i),
            );
            engine.ingest_document(&doc).await?;
        }
        let (_, sources) = engine.query("shared farm chores").await;
        sources
    };

    let mut config = test_config(&db);
    config.retrieval.top_k = 10;
    let engine = RagEngine::new(config)?;
    let (_, wide_sources) = engine.query("shared farm chores").await;

    assert!(wide_sources.len() >= narrow_sources.len());
    for s in &narrow_sources {
        assert!(wide_sources.contains(s));
    }
    Ok(())
}

#[tokio::test]
async fn initialization_races_resolve_to_one_engine() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let engine = Arc::new(RagEngine::new(test_config(&tmp.path().join("db")))?);
    let (a, b, c) = tokio::join!(
        { let e = engine.clone(); async move { e.ensure_initialized().await } },
        { let e = engine.clone(); async move { e.ensure_initialized().await } },
        { let e = engine.clone(); async move { e.ensure_initialized().await } },
    );
    a?;
    b?;
    c?;
    Ok(())
}

#[tokio::test]
async fn unsupported_file_is_a_load_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let engine = RagEngine::new(test_config(&tmp.path().join("db")))?;
    let path = write_doc(tmp.path(), "image.png", "not really an image");
    let err = engine.ingest_document(&path).await.expect_err("must fail");
    assert!(matches!(err, IngestionError::Load(_)));
    assert!(engine.list_documents().await?.is_empty());
    Ok(())
}
