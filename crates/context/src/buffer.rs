//! The context buffer: ordered spans under a hard token budget.
//!
//! Every public mutation leaves `Σ tokens ≤ max_tokens`. Overflowing
//! appends run the active [`Policy`] against a working copy; the copy is
//! committed only once it fits, so a failing policy never leaves the buffer
//! half-modified. A policy that reports [`ContextError::PolicyUnavailable`]
//! (backend error or timeout) is replaced by sliding eviction for that call
//! and counted in `policy_fallbacks`.

use crate::assembler::{self, AssembleOptions, AssembledContext};
use crate::policy::rolling_summary::{self, SummaryParams};
use crate::policy::{ImportanceScorer, Policy, RecencyScorer, Working, hybrid, importance, semantic, sliding};
use crate::token::{HeuristicTokenizer, span_cost};
use membound_config::ContextConfig;
use membound_core::{
    BackendError, ContextError, Role, Span, SpanId, Stats, Summarizer, TelemetrySink, Tokenizer, total_tokens,
};
use membound_embedding::EmbeddingCache;
use membound_telemetry::NoopSink;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(2);

/// What one append did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResult {
    /// Sequence number of the appended span
    pub id: SpanId,
    pub tokens: usize,
    /// Spans removed outright
    pub evicted: Vec<SpanId>,
    /// Spans folded into a summary
    pub compressed: Vec<SpanId>,
    /// Summary span created, if any
    pub summary: Option<SpanId>,
    /// Whether the policy had to run
    pub reclaimed: bool,
    /// Whether sliding eviction stood in for an unavailable policy
    pub fell_back: bool,
    /// Time spent reclaiming, when the policy ran
    pub policy_latency_us: Option<u64>,
}

/// Single-writer, per-session context store.
pub struct ContextBuffer {
    spans: Vec<Span>,
    max_tokens: usize,
    policy: Policy,
    tokenizer: Arc<dyn Tokenizer>,
    embeddings: Option<Arc<EmbeddingCache>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    scorer: Arc<dyn ImportanceScorer>,
    telemetry: Arc<dyn TelemetrySink>,
    backend_timeout: Duration,
    stats: Stats,
    next_seq: u64,
    origin: u64,
}

impl ContextBuffer {
    pub fn builder(max_tokens: usize) -> ContextBufferBuilder {
        ContextBufferBuilder::new(max_tokens)
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    /// Read-only ordered view of the retained spans.
    pub fn snapshot(&self) -> &[Span] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        total_tokens(&self.spans)
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    pub fn embedding_cache(&self) -> Option<&Arc<EmbeddingCache>> {
        self.embeddings.as_ref()
    }

    /// Render the retained spans into a prompt.
    pub fn assemble(&self, options: &AssembleOptions) -> AssembledContext {
        assembler::assemble(&self.spans, SpanId(self.origin), options)
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    pub async fn append(&mut self, text: impl Into<String>, role: Role) -> Result<AppendResult, ContextError> {
        self.append_scored(text, role, None).await
    }

    /// Append with an explicit importance score, which overrides the
    /// importance scorer for this span.
    pub async fn append_scored(
        &mut self,
        text: impl Into<String>,
        role: Role,
        importance: Option<f64>,
    ) -> Result<AppendResult, ContextError> {
        let text = text.into();
        let tokens = span_cost(self.tokenizer.as_ref(), &text);
        if tokens > self.max_tokens {
            return Err(ContextError::CapacityUnreservable {
                required: tokens,
                capacity: self.max_tokens,
            });
        }

        let budget = self.max_tokens - tokens;
        let mut work = Working::new(Vec::new(), self.next_seq);
        let reclaimed = self.total_tokens() > budget;
        let mut fell_back = false;
        let mut policy_latency_us = None;

        if reclaimed {
            let started = Instant::now();
            work = Working::new(self.spans.clone(), self.next_seq);
            match self.reclaim(&mut work, budget).await {
                Ok(()) => {}
                Err(err @ ContextError::PolicyUnavailable { .. }) => {
                    warn!(
                        policy = self.policy.name(),
                        error = %err,
                        "Policy unavailable, falling back to sliding eviction"
                    );
                    fell_back = true;
                    work = Working::new(self.spans.clone(), self.next_seq);
                    sliding::reclaim(&mut work, budget);
                }
                Err(err) => return Err(err),
            }
            if work.total() > budget {
                sliding::reclaim(&mut work, budget);
            }
            policy_latency_us = Some(u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX));
        } else {
            std::mem::swap(&mut work.spans, &mut self.spans);
        }

        // Commit
        let (id, created_at) = work.mint();
        let mut span = Span::new(id, role, text, tokens, created_at);
        span.importance = importance;
        work.spans.push(span);

        self.spans = std::mem::take(&mut work.spans);
        self.next_seq = work.next_seq();
        self.stats.tokens_seen += tokens as u64;
        self.stats.evictions += work.evicted.len() as u64;
        self.stats.compressions += work.compressed.len() as u64;
        if reclaimed {
            self.stats.policy_calls += 1;
        }
        if fell_back {
            self.stats.policy_fallbacks += 1;
        }
        self.stats.last_policy_latency_us = policy_latency_us;
        self.stats.tokens_retained = self.total_tokens() as u64;
        debug_assert!(self.total_tokens() <= self.max_tokens);

        debug!(
            id = %id,
            tokens,
            retained = self.stats.tokens_retained,
            evicted = work.evicted.len(),
            compressed = work.compressed.len(),
            latency_us = ?policy_latency_us,
            "append"
        );
        self.publish();

        Ok(AppendResult {
            id,
            tokens,
            evicted: work.evicted,
            compressed: work.compressed,
            summary: work.summaries.first().copied(),
            reclaimed,
            fell_back,
            policy_latency_us,
        })
    }

    /// Clear all spans. Cumulative counters (`tokens_seen`, `policy_calls`,
    /// `policy_fallbacks`) survive; per-content counters and the last policy
    /// latency are cleared.
    pub fn reset(&mut self) {
        self.spans.clear();
        self.origin = self.next_seq;
        self.stats.tokens_retained = 0;
        self.stats.evictions = 0;
        self.stats.compressions = 0;
        self.stats.last_policy_latency_us = None;
        self.publish();
    }

    /// Clear all spans and zero every counter.
    pub fn reset_all(&mut self) {
        self.spans.clear();
        self.origin = self.next_seq;
        self.stats = Stats::default();
        self.publish();
    }

    fn publish(&self) {
        self.telemetry.publish(&self.stats.snapshot());
    }

    // ── Policy dispatch ───────────────────────────────────────────────────

    async fn reclaim(&self, work: &mut Working, budget: usize) -> Result<(), ContextError> {
        debug!(policy = self.policy.name(), budget, held = work.total(), "reclaiming");
        match &self.policy {
            Policy::Sliding => {
                sliding::reclaim(work, budget);
                Ok(())
            }
            Policy::Importance => {
                importance::reclaim(work, budget, self.scorer.as_ref());
                Ok(())
            }
            Policy::Hybrid {
                fast_evict_fraction,
            } => {
                hybrid::reclaim(work, budget, *fast_evict_fraction, self.scorer.as_ref());
                Ok(())
            }
            Policy::Semantic {
                similarity_threshold,
            } => {
                let cache = self
                    .embeddings
                    .as_deref()
                    .ok_or_else(|| ContextError::invalid("semantic policy requires an embedding cache"))?;
                self.bounded(semantic::reclaim(work, budget, cache, *similarity_threshold))
                    .await
            }
            Policy::RollingSummary {
                max_summary_tokens,
                qa_gate,
            } => {
                let summarizer = self
                    .summarizer
                    .as_deref()
                    .ok_or_else(|| ContextError::invalid("rolling summary policy requires a summarizer"))?;
                let params = SummaryParams {
                    summarizer,
                    tokenizer: self.tokenizer.as_ref(),
                    max_summary_tokens: *max_summary_tokens,
                    qa_gate: *qa_gate,
                };
                self.bounded(rolling_summary::reclaim(work, budget, params)).await
            }
        }
    }

    /// Run a backend-dependent policy under the backend timeout.
    async fn bounded<F>(&self, fut: F) -> Result<(), ContextError>
    where
        F: Future<Output = Result<(), ContextError>>,
    {
        match tokio::time::timeout(self.backend_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(self.backend_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(ContextError::unavailable(
                    self.policy.name(),
                    BackendError::Timeout {
                        backend: self.policy.name().to_string(),
                        timeout_ms,
                    },
                ))
            }
        }
    }
}

impl std::fmt::Debug for ContextBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuffer")
            .field("policy", &self.policy)
            .field("max_tokens", &self.max_tokens)
            .field("spans", &self.spans.len())
            .field("stats", &self.stats)
            .finish()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────

/// Assembles a [`ContextBuffer`] and validates its wiring.
pub struct ContextBufferBuilder {
    max_tokens: usize,
    policy: Policy,
    tokenizer: Arc<dyn Tokenizer>,
    embeddings: Option<Arc<EmbeddingCache>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    scorer: Arc<dyn ImportanceScorer>,
    telemetry: Arc<dyn TelemetrySink>,
    backend_timeout: Duration,
}

impl ContextBufferBuilder {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            policy: Policy::Sliding,
            tokenizer: Arc::new(HeuristicTokenizer),
            embeddings: None,
            summarizer: None,
            scorer: Arc::new(RecencyScorer::default()),
            telemetry: Arc::new(NoopSink),
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// Budget, policy, timeout and scorer weights from a loaded config.
    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.max_tokens)
            .policy(Policy::from_config(config))
            .backend_timeout(Duration::from_millis(config.backend_timeout_ms))
            .scorer(Arc::new(RecencyScorer::from_config(&config.importance)))
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Share an embedding cache with this buffer.
    pub fn embedding_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.embeddings = Some(cache);
        self
    }

    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn ImportanceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    pub fn backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ContextBuffer, ContextError> {
        if self.max_tokens == 0 {
            return Err(ContextError::invalid("max_tokens must be > 0"));
        }
        if self.backend_timeout.is_zero() {
            return Err(ContextError::invalid("backend timeout must be > 0"));
        }
        self.policy.validate()?;

        match &self.policy {
            Policy::Semantic { .. } if self.embeddings.is_none() => {
                return Err(ContextError::invalid("semantic policy requires an embedding cache"));
            }
            Policy::RollingSummary { .. } if self.summarizer.is_none() => {
                return Err(ContextError::invalid("rolling summary policy requires a summarizer"));
            }
            _ => {}
        }

        debug!(
            policy = self.policy.name(),
            max_tokens = self.max_tokens,
            tokenizer = self.tokenizer.name(),
            "context buffer ready"
        );

        Ok(ContextBuffer {
            spans: Vec::new(),
            max_tokens: self.max_tokens,
            policy: self.policy,
            tokenizer: self.tokenizer,
            embeddings: self.embeddings,
            summarizer: self.summarizer,
            scorer: self.scorer,
            telemetry: self.telemetry,
            backend_timeout: self.backend_timeout,
            stats: Stats::default(),
            next_seq: 1,
            origin: 1,
        })
    }
}
