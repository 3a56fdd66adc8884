//! Deterministic feature-hashing embedder.
//!
//! No model, no I/O: each whitespace token is hashed into a bucket of the
//! output vector. Crude but stable, which makes it usable offline and in
//! tests where the retrieval contract matters more than semantic quality.

use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use ragdb_core::error::EmbeddingError;
use ragdb_core::traits::Embedder;

use crate::l2_normalize;

const MAX_INPUT_CHARS: usize = 1 << 20;

pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hash:xx64:d{}", dim) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.to_lowercase();
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait::async_trait]
impl Embedder for HashEmbedder {
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
        for text in texts {
            let len = text.chars().count();
            if len > MAX_INPUT_CHARS {
                return Err(EmbeddingError::InputTooLarge { len, max: MAX_INPUT_CHARS });
            }
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_same_vector() {
        let e = HashEmbedder::new(64);
        let a = e.embed_batch(&["goats eat brambles".to_string()]).await.expect("embed");
        let b = e.embed_batch(&["goats eat brambles".to_string()]).await.expect("embed");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let e = HashEmbedder::new(128);
        let out = e.embed_batch(&["spring water line".to_string()]).await.expect("embed");
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn shared_tokens_score_higher_than_disjoint() {
        let e = HashEmbedder::new(256);
        let out = e
            .embed_batch(&[
                "fencing the lower paddock".to_string(),
                "paddock fencing repairs".to_string(),
                "completely unrelated astronomy lecture".to_string(),
            ])
            .await
            .expect("embed");
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&out[0], &out[1]) > dot(&out[0], &out[2]));
    }

    #[tokio::test]
    async fn concurrent_calls_agree() {
        let e = std::sync::Arc::new(HashEmbedder::new(64));
        let text = vec!["barn door hinge".to_string()];
        let (a, b) = tokio::join!(
            { let e = e.clone(); let t = text.clone(); async move { e.embed_batch(&t).await } },
            { let e = e.clone(); let t = text.clone(); async move { e.embed_batch(&t).await } },
        );
        assert_eq!(a.expect("embed"), b.expect("embed"));
    }
}
