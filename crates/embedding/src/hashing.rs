//! Deterministic bag-of-words embedder.
//!
//! Each lowercase word is hashed into one of `dims` buckets with a sign bit
//! and the result is L2-normalised. Texts sharing vocabulary land close
//! together; no model is needed, so it works offline and in tests.

use async_trait::async_trait;
use membound_core::{BackendError, EmbeddingBackend, Vector};
use sha2::{Digest, Sha256};

use crate::vector::l2_normalize;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMS: usize = 256;

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed a single text synchronously.
    pub fn embed_one(&self, text: &str) -> Vector {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMS)
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>, BackendError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
