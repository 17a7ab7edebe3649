//! # membound core
//!
//! Domain types, traits, and error definitions for the membound context
//! manager. This crate has **no runtime dependencies** beyond serde and
//! hashing: it defines the domain model that the other crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (tokenizer, embedding service, summarizer,
//! generator, telemetry sink) is a trait here. Implementations live in their
//! respective crates or in the embedding application, which keeps test
//! doubles trivial and the dependency graph pointing inward.

pub mod backend;
pub mod error;
pub mod span;
pub mod stats;
pub mod tokenizer;

// Re-export key types at crate root for ergonomics
pub use backend::{EmbeddingBackend, GenerationBackend, Summarizer, Vector};
pub use error::{BackendError, ContextError};
pub use span::{ContentHash, Role, Span, SpanId, total_tokens};
pub use stats::{Stats, StatsSnapshot, TelemetrySink};
pub use tokenizer::Tokenizer;
