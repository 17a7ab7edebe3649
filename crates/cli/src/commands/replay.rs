//! Replays a transcript through a freshly built context buffer.

use crate::transcript::Turn;
use membound_config::ContextConfig;
use membound_context::{AppendResult, AssembleOptions, AssembledContext, ContextBufferBuilder, ExtractiveSummarizer};
use membound_core::{ContextError, Role, StatsSnapshot, TelemetrySink};
use membound_embedding::{CacheStats, EmbeddingCache, HashingEmbedder};
use membound_telemetry::{FanoutSink, MetricsCollector, MetricsSummary, NoopSink, TracingSink};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct TurnRow {
    pub turn: usize,
    pub role: Role,
    #[serde(flatten)]
    pub result: AppendResult,
    pub retained: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rejected {
    pub turn: usize,
    pub required: usize,
    pub capacity: usize,
}

/// Everything one replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub policy: String,
    pub max_tokens: usize,
    pub turns: Vec<TurnRow>,
    pub rejected: Vec<Rejected>,
    pub stats: StatsSnapshot,
    pub metrics: MetricsSummary,
    pub cache: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AssembledContext>,
}

/// Replay `turns` under `config`. Oversized turns are reported and skipped;
/// any other error aborts the replay.
pub async fn run(
    config: &ContextConfig,
    turns: &[Turn],
    cache: Arc<EmbeddingCache>,
    trace: bool,
    keep_context: bool,
) -> Result<Report, ContextError> {
    let collector = Arc::new(MetricsCollector::new(config.telemetry.window));
    let sink: Arc<dyn TelemetrySink> = match (config.telemetry.enabled, trace) {
        (false, _) => Arc::new(NoopSink),
        (true, false) => collector.clone(),
        (true, true) => Arc::new(
            FanoutSink::new()
                .with(collector.clone())
                .with(Arc::new(TracingSink::new(config.policy.as_str()))),
        ),
    };

    let mut buffer = ContextBufferBuilder::from_config(config)
        .embedding_cache(cache.clone())
        .summarizer(Arc::new(ExtractiveSummarizer::default()))
        .telemetry(sink)
        .build()?;

    let mut rows = Vec::with_capacity(turns.len());
    let mut rejected = Vec::new();
    for (idx, turn) in turns.iter().enumerate() {
        match buffer
            .append_scored(turn.text.clone(), turn.role, turn.importance)
            .await
        {
            Ok(result) => rows.push(TurnRow {
                turn: idx + 1,
                role: turn.role,
                result,
                retained: buffer.total_tokens(),
            }),
            Err(ContextError::CapacityUnreservable { required, capacity }) => {
                warn!(turn = idx + 1, required, capacity, "Turn larger than the whole budget, skipped");
                rejected.push(Rejected {
                    turn: idx + 1,
                    required,
                    capacity,
                });
            }
            Err(e) => return Err(e),
        }
    }

    let context = keep_context.then(|| buffer.assemble(&AssembleOptions::from(&config.assembler)));

    Ok(Report {
        policy: buffer.policy().to_string(),
        max_tokens: buffer.max_tokens(),
        turns: rows,
        rejected,
        stats: buffer.stats().snapshot(),
        metrics: collector.summary(),
        cache: cache.stats(),
        context,
    })
}

/// A cache backed by the local hashing embedder, sized from config.
pub fn local_cache(config: &ContextConfig) -> Arc<EmbeddingCache> {
    Arc::new(EmbeddingCache::new(
        Arc::new(HashingEmbedder::default()),
        config.embedding.cache_capacity,
    ))
}
