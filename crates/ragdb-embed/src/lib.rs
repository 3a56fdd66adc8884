//! Embedding providers.
//!
//! Implementations either call a remote embeddings API (see `remote.rs`) or
//! hash text locally (see `hashed.rs`). Providers must return L2-normalized
//! vectors of the same dimensionality for a given embedder id.

use std::sync::Arc;

use ragdb_core::config::EmbeddingConfig;
pub use ragdb_core::traits::Embedder;

pub mod hashed;
pub mod remote;

pub use hashed::HashEmbedder;
pub use remote::RemoteEmbedder;

/// Build the embedder selected by `config.provider`.
pub fn build_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dim))),
        "remote" => Ok(Arc::new(RemoteEmbedder::new(config)?)),
        other => anyhow::bail!("unknown embedding provider '{}'", other),
    }
}

pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
    for x in v.iter_mut() {
        *x /= norm;
    }
}
