//! Backend traits — the abstraction over external model services.
//!
//! The context core calls these without knowing what serves them: a local
//! model, a hosted API, or a deterministic stand-in for tests. Adapters own
//! their retry policy; the core calls each backend at most once per request.

use async_trait::async_trait;
use crate::error::BackendError;

/// A dense embedding vector.
pub type Vector = Vec<f32>;

/// Turns texts into embedding vectors, batched.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Embed every text; the result has the same length and order as `texts`.
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vector>, BackendError>;
}

/// Condenses text into a shorter text. Used only by rolling-summary retention.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Summarize `text`, aiming at no more than `target_tokens` tokens.
    ///
    /// The target is advisory; the caller re-counts the result.
    async fn summarize(&self, text: &str, target_tokens: usize) -> std::result::Result<String, BackendError>;
}

/// Turns an assembled prompt into generated text.
///
/// Invoked by the surrounding application, never by retention policies.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Generate a continuation of `prompt` of at most `max_output_tokens`.
    async fn generate(&self, prompt: &str, max_output_tokens: usize) -> std::result::Result<String, BackendError>;
}
