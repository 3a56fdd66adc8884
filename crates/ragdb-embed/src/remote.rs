//! HTTP embedder for OpenAI-compatible `/embeddings` endpoints.
//!
//! The client is stateless between calls; a single `reqwest::Client` is
//! shared and safe for concurrent requests. Timeouts and upstream failures
//! surface as `EmbeddingError`; retries belong to the orchestrator.

use std::time::Duration;

use serde::Deserialize;

use ragdb_core::config::EmbeddingConfig;
use ragdb_core::error::EmbeddingError;
use ragdb_core::traits::Embedder;

use crate::l2_normalize;

const MAX_INPUT_CHARS: usize = 16_000;

pub struct RemoteEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    timeout: Duration,
    id: String,
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let url = format!("{}/embeddings", config.endpoint.trim_end_matches('/'));
        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dim: config.dim,
            timeout,
            id: format!("remote:{}:d{}", config.model, config.dim),
        })
    }

    fn map_request_error(&self, e: reqwest::Error) -> EmbeddingError {
        if e.is_timeout() {
            EmbeddingError::Timeout(self.timeout)
        } else {
            EmbeddingError::Upstream(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl Embedder for RemoteEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_input_len(&self) -> usize {
        MAX_INPUT_CHARS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            let len = text.chars().count();
            if len > MAX_INPUT_CHARS {
                return Err(EmbeddingError::InputTooLarge { len, max: MAX_INPUT_CHARS });
            }
        }

        let mut request = self
            .client
            .post(&self.url)
            .json(&EmbeddingsRequest { model: &self.model, input: texts });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_request_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Upstream(format!("{}: {}", status, body)));
        }
        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::BadResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::BadResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut rows = parsed.data;
        rows.sort_by_key(|r| r.index);
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if row.embedding.len() != self.dim {
                return Err(EmbeddingError::Dimension {
                    expected: self.dim,
                    got: row.embedding.len(),
                });
            }
            let mut v = row.embedding;
            l2_normalize(&mut v);
            out.push(v);
        }
        tracing::debug!(batch = texts.len(), model = %self.model, "embedded batch");
        Ok(out)
    }
}
