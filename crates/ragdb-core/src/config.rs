//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*`
//! environment variables into a typed [`EngineConfig`]. Provides helpers to
//! expand `~` and `${VAR}` and to resolve relative paths against a base
//! directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the Lance dataset. Created on first use.
    pub db_dir: String,
    pub table: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { db_dir: "data/index".to_string(), table: "chunks".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters carried over between adjacent chunks of a long paragraph.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 800, overlap: 150 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `hash` (offline, deterministic) or `remote` (HTTP embeddings API).
    pub provider: String,
    pub dim: usize,
    /// Base URL of an OpenAI-compatible embeddings endpoint.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Chunks per upstream request.
    pub batch_size: usize,
    /// In-flight embedding requests per ingestion.
    pub concurrency: usize,
    pub max_retries: usize,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            dim: 384,
            endpoint: "http://127.0.0.1:8080/v1".to_string(),
            model: "text-embedding-004".to_string(),
            api_key: None,
            batch_size: 16,
            concurrency: 4,
            max_retries: 3,
            retry_backoff_ms: 250,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per query.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data: DataConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
}

impl EngineConfig {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be positive");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap,
                self.chunking.chunk_size
            );
        }
        if self.embedding.dim == 0 {
            anyhow::bail!("embedding.dim must be positive");
        }
        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be positive");
        }
        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            anyhow::bail!("embedding.batch_size and embedding.concurrency must be positive");
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after
/// expansion. If `p` is absolute, it's returned as-is.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let mut config = EngineConfig::default();
        config.chunking.chunk_size = 100;
        config.chunking.overlap = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn expand_path_keeps_plain_paths() {
        assert_eq!(expand_path("data/index"), PathBuf::from("data/index"));
    }
}
