//! Error taxonomy shared across the ingestion and retrieval pipeline.

use std::time::Duration;
use thiserror::Error;

/// Failure turning a file into raw text.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported document format '{extension}': {path}")]
    UnsupportedFormat { path: String, extension: String },

    #[error("failed to read {path}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract text from {path}: {reason}")]
    Extract { path: String, reason: String },

    #[error("document {path} produced no text")]
    EmptyDocument { path: String },
}

/// Failure producing an embedding vector.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding backend error: {0}")]
    Upstream(String),

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("input of {len} chars exceeds embedder limit of {max}")]
    InputTooLarge { len: usize, max: usize },

    #[error("malformed embedding response: {0}")]
    BadResponse(String),

    #[error("embedder returned dimension {got}, expected {expected}")]
    Dimension { expected: usize, got: usize },
}

impl EmbeddingError {
    /// Whether a retry at the orchestrator level could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Timeout(_))
    }
}

/// Failure at the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index contains no entries")]
    EmptyIndex,

    #[error("embedding dimension mismatch: got {got}, index holds {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Per-document ingestion failure, wrapping the first sub-failure.
///
/// An ingestion that fails leaves the index untouched; other documents and
/// prior entries are unaffected.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("failed to load document: {0}")]
    Load(#[from] LoadError),

    #[error("failed to embed document chunks: {0}")]
    Embed(#[from] EmbeddingError),

    #[error("failed to write chunks to the index: {0}")]
    Index(#[from] IndexError),

    #[error("engine initialization failed: {0}")]
    Init(String),
}
