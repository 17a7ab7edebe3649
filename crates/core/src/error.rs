//! Error types for the membound domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Buffer operations
//! return [`ContextError`]; collaborator failures are [`BackendError`] and
//! convert into it.

use thiserror::Error;

/// Errors raised by the context buffer and its retention policies.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// A single incoming item is larger than the whole budget.
    #[error("message needs {required} tokens but the budget is {capacity} tokens")]
    CapacityUnreservable { required: usize, capacity: usize },

    /// A policy's external dependency failed or timed out.
    ///
    /// The buffer recovers from this locally by substituting sliding eviction;
    /// it is never returned from `append`.
    #[error("policy '{policy}' unavailable: {reason}")]
    PolicyUnavailable { policy: String, reason: String },

    /// Rejected at construction time; never silently defaulted.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A backend error outside the fallback path, propagated unmodified.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ContextError {
    pub fn unavailable(policy: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::PolicyUnavailable {
            policy: policy.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

/// Errors from external collaborators (embedding, summarizer, generation).
///
/// Retry policy belongs to the adapters that produce these; the core never
/// retries.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Embedding backend failed: {0}")]
    Embedding(String),

    #[error("Embedding backend returned {got} vectors for {expected} inputs")]
    EmbeddingShape { expected: usize, got: usize },

    #[error("Summarizer backend failed: {0}")]
    Summarizer(String),

    #[error("Generation backend failed: {0}")]
    Generation(String),

    #[error("Tokenizer failed: {0}")]
    Tokenizer(String),

    #[error("{backend} call timed out after {timeout_ms}ms")]
    Timeout { backend: String, timeout_ms: u64 },

    #[error("In-flight computation was abandoned: {0}")]
    Abandoned(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_error_displays_sizes() {
        let err = ContextError::CapacityUnreservable {
            required: 40,
            capacity: 30,
        };
        assert!(err.to_string().contains("40"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn backend_error_converts_into_context_error() {
        let err: ContextError = BackendError::Summarizer("connection refused".into()).into();
        assert!(matches!(err, ContextError::Backend(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn timeout_displays_backend_and_budget() {
        let err = BackendError::Timeout {
            backend: "embedding".into(),
            timeout_ms: 250,
        };
        assert!(err.to_string().contains("embedding"));
        assert!(err.to_string().contains("250ms"));
    }
}
