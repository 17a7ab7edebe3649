//! Tokenizer adapters.
//!
//! [`HeuristicTokenizer`] is the deterministic fallback: ~4 bytes per token,
//! rounded up. It round-trips exactly by packing four bytes into each id.
//! With the `hf-tokenizer` feature, [`HfTokenizer`] wraps a Hugging Face
//! `tokenizer.json`.

use membound_core::Tokenizer;

const BYTES_PER_TOKEN: usize = 4;

/// Byte-packing tokenizer: 1 token ≈ 4 bytes of UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        text.as_bytes()
            .chunks(BYTES_PER_TOKEN)
            .map(|chunk| {
                let mut word = [0u8; BYTES_PER_TOKEN];
                word[..chunk.len()].copy_from_slice(chunk);
                u32::from_le_bytes(word)
            })
            .collect()
    }

    fn decode(&self, ids: &[u32]) -> String {
        let mut bytes: Vec<u8> = ids.iter().flat_map(|id| id.to_le_bytes()).collect();
        // Only the final id can carry padding
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(BYTES_PER_TOKEN)
    }
}

/// Token cost charged against the budget for `text`.
///
/// Never zero, so every retained span occupies part of the budget.
pub fn span_cost(tokenizer: &dyn Tokenizer, text: &str) -> usize {
    tokenizer.count(text).max(1)
}

#[cfg(feature = "hf-tokenizer")]
pub use hf::HfTokenizer;

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use super::HeuristicTokenizer;
    use membound_core::{BackendError, Tokenizer};
    use std::path::Path;
    use tracing::warn;

    /// Adapter over a Hugging Face `tokenizers` model.
    ///
    /// Encoding failures degrade to the heuristic count rather than failing
    /// the append.
    pub struct HfTokenizer {
        name: String,
        inner: tokenizers::Tokenizer,
    }

    impl HfTokenizer {
        pub fn from_file(path: &Path) -> Result<Self, BackendError> {
            let inner = tokenizers::Tokenizer::from_file(path)
                .map_err(|e| BackendError::Tokenizer(e.to_string()))?;
            Ok(Self {
                name: format!("hf:{}", path.display()),
                inner,
            })
        }
    }

    impl Tokenizer for HfTokenizer {
        fn name(&self) -> &str {
            &self.name
        }

        fn encode(&self, text: &str) -> Vec<u32> {
            match self.inner.encode(text, false) {
                Ok(encoding) => encoding.get_ids().to_vec(),
                Err(e) => {
                    warn!(tokenizer = %self.name, error = %e, "Encode failed, using heuristic");
                    HeuristicTokenizer.encode(text)
                }
            }
        }

        fn decode(&self, ids: &[u32]) -> String {
            self.inner.decode(ids, true).unwrap_or_default()
        }
    }
}
