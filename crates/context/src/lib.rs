//! Bounded-memory context management for conversational model sessions.
//!
//! A [`ContextBuffer`] holds the spans of one conversation under a hard
//! token budget. When an append would overflow it, the active [`Policy`]
//! decides what to evict or compress:
//!
//! - **Sliding**: oldest spans first
//! - **Importance**: knapsack over per-span scores
//! - **Semantic**: near-duplicates collapse via a shared [`EmbeddingCache`]
//! - **Rolling summary**: the oldest block becomes one summary span
//! - **Hybrid**: sliding for part of the overflow, importance for the rest
//!
//! The assembler renders what is left into a prompt, and [`Session`] drives
//! a generation backend turn by turn.
//!
//! [`EmbeddingCache`]: membound_embedding::EmbeddingCache

pub mod assembler;
pub mod buffer;
pub mod knapsack;
pub mod policy;
pub mod qa_gate;
pub mod session;
pub mod summarizer;
pub mod token;

pub use assembler::{AssembleOptions, AssembledContext, Gap, Segment, assemble};
pub use buffer::{AppendResult, ContextBuffer, ContextBufferBuilder};
pub use policy::{ImportanceScorer, Policy, RecencyScorer};
pub use qa_gate::{QaGate, QaReport};
pub use session::{Session, TurnOutcome};
pub use summarizer::ExtractiveSummarizer;
pub use token::{HeuristicTokenizer, span_cost};

#[cfg(feature = "hf-tokenizer")]
pub use token::HfTokenizer;
