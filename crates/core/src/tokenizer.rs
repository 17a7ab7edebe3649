//! Tokenizer trait — the injected text ↔ token-id capability.
//!
//! The context buffer never estimates token counts on its own; every count
//! comes from a `Tokenizer`. Implementations must be deterministic and free
//! of side effects.

/// Converts text to token ids and back.
pub trait Tokenizer: Send + Sync {
    /// A human-readable name (e.g., "heuristic", "hf:gpt2").
    fn name(&self) -> &str;

    /// Encode text to token ids.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode token ids back to text.
    fn decode(&self, ids: &[u32]) -> String;

    /// Number of tokens `text` encodes to.
    ///
    /// Override when counting is cheaper than a full encode.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}
