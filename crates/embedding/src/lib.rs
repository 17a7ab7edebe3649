//! Embedding support for membound.
//!
//! - [`EmbeddingCache`]: content-hash keyed, LRU-bounded, single-flight store
//!   shared between sessions through an `Arc`
//! - [`HashingEmbedder`]: deterministic local backend
//! - [`cosine_similarity`]: the similarity used by semantic retention

pub mod cache;
pub mod hashing;
pub mod vector;

pub use cache::{CacheStats, EmbeddingCache, SharedVector};
pub use hashing::HashingEmbedder;
pub use vector::{cosine_similarity, l2_normalize};
