//! Span domain types.
//!
//! A span is the atomic unit the context buffer retains or evicts: one
//! message, or a synthetic summary standing in for several of them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Monotonic sequence number identifying a span within one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(pub u64);

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for SpanId {
    fn from(seq: u64) -> Self {
        SpanId(seq)
    }
}

/// Who produced a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Synthetic span produced by compression
    Summary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Summary => "summary",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 digest of a span's exact text.
///
/// Depends only on the bytes of the text, never on span identity, so the same
/// text always maps to the same cache entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        Self(digest.into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Eight hex chars is plenty to tell entries apart in logs.
        write!(f, "ContentHash({})", &self.to_string()[..8])
    }
}

/// A retained unit of conversation content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Stable identity, assigned on creation
    pub id: SpanId,

    /// Who produced the content
    pub role: Role,

    /// The raw text
    pub text: String,

    /// Token cost of `text`. Counted by the tokenizer on creation; summary
    /// spans carry the count of the produced summary text.
    pub tokens: usize,

    /// Lookup key into the embedding cache, once an embedding was requested
    #[serde(skip)]
    pub embedding_key: Option<ContentHash>,

    /// Externally supplied importance, overriding the configured scorer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,

    /// Logical creation time (buffer clock, not wall-clock)
    pub created_at: u64,

    /// Spans this summary replaced. Telemetry only; summaries are lossy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaced: Vec<SpanId>,
}

impl Span {
    pub fn new(id: SpanId, role: Role, text: impl Into<String>, tokens: usize, created_at: u64) -> Self {
        Self {
            id,
            role,
            text: text.into(),
            tokens,
            embedding_key: None,
            importance: None,
            created_at,
            replaced: Vec::new(),
        }
    }

    /// Build a summary span standing in for `replaced`.
    pub fn summary(
        id: SpanId,
        text: impl Into<String>,
        tokens: usize,
        created_at: u64,
        replaced: Vec<SpanId>,
    ) -> Self {
        Self {
            replaced,
            ..Self::new(id, Role::Summary, text, tokens, created_at)
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn is_summary(&self) -> bool {
        self.role == Role::Summary
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.text)
    }
}

/// Total token cost of a run of spans.
pub fn total_tokens(spans: &[Span]) -> usize {
    spans.iter().map(|s| s.tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_depends_only_on_text() {
        let a = Span::new(SpanId(1), Role::User, "same words", 3, 1);
        let b = Span::new(SpanId(9), Role::Assistant, "same words", 3, 7);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), ContentHash::of("same words."));
    }

    #[test]
    fn content_hash_hex_is_64_chars() {
        let hex = ContentHash::of("").to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("e3b0c442"));
    }

    #[test]
    fn summary_span_keeps_provenance() {
        let span = Span::summary(SpanId(5), "recap", 2, 5, vec![SpanId(1), SpanId(2)]);
        assert!(span.is_summary());
        assert_eq!(span.replaced, vec![SpanId(1), SpanId(2)]);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Summary).unwrap();
        assert_eq!(json, "\"summary\"");
    }

    #[test]
    fn total_tokens_sums_counts() {
        let spans = vec![
            Span::new(SpanId(1), Role::User, "a", 4, 1),
            Span::new(SpanId(2), Role::Assistant, "b", 6, 2),
        ];
        assert_eq!(total_tokens(&spans), 10);
    }
}
