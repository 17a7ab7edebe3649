//! End-to-end integration tests for membound.
//!
//! These exercise the full pipeline from configuration to generated reply:
//! config parsing, buffer construction, chat turns through a scripted
//! generator, and telemetry delivery.

use std::sync::Arc;

use membound_config::{ContextConfig, PolicyKind};
use membound_context::{AssembleOptions, ContextBufferBuilder, ExtractiveSummarizer, Session};
use membound_core::{BackendError, ContextError, GenerationBackend, Role};
use membound_embedding::{EmbeddingCache, HashingEmbedder};
use membound_telemetry::{BroadcastSink, FanoutSink, MetricsCollector};

// ── Mock Generator ───────────────────────────────────────────────────────

/// Returns scripted replies in sequence and records every prompt.
struct ScriptedGenerator {
    replies: std::sync::Mutex<Vec<String>>,
    prompts: std::sync::Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ScriptedGenerator {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn generate(&self, prompt: &str, _max_output_tokens: usize) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| BackendError::Generation("script exhausted".into()))
    }
}

fn config(toml: &str) -> ContextConfig {
    ContextConfig::from_toml(toml).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_chat_under_sliding_budget() {
    let cfg = config("policy = \"sliding\"\nmax_tokens = 40\n");
    let generator = Arc::new(ScriptedGenerator::new(&[
        "Sure, what is the topic of the report?",
        "Got it. The summary report is on caching.",
        "Done, the draft is ready for review now.",
    ]));
    let buffer = ContextBufferBuilder::from_config(&cfg).build().unwrap();
    let mut session = Session::new(buffer, generator.clone());

    for msg in [
        "Please help me write a report.",
        "It is about the caching layer.",
        "Please finish the draft.",
    ] {
        let outcome = session.turn(msg, 64).await.unwrap();
        assert!(!outcome.reply.is_empty());
        assert!(session.buffer().total_tokens() <= 40);
    }

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].starts_with("user: Please help me"));
    // Oldest turns have slid out by the third prompt
    assert!(!prompts[2].contains("write a report"));
    assert!(session.buffer().stats().evictions > 0);
}

#[tokio::test]
async fn e2e_rolling_summary_stays_within_budget() {
    let cfg = config(
        "policy = \"rolling_summary\"\nmax_tokens = 48\n\n[summary]\nmax_summary_tokens = 16\nqa_gate = true\nqa_threshold = 0.5\n",
    );
    let buffer = ContextBufferBuilder::from_config(&cfg)
        .summarizer(Arc::new(ExtractiveSummarizer::default()))
        .build()
        .unwrap();
    let generator = Arc::new(ScriptedGenerator::new(&["ok", "ok", "ok", "ok", "ok", "ok"]));
    let mut session = Session::new(buffer, generator.clone());

    for msg in [
        "Release 42 shipped. Everything else about it was routine and dull.",
        "We spent the afternoon discussing lunch options at length.",
        "Then we argued about tabs and spaces for a while longer.",
        "Finally someone asked what shipped this morning, then left.",
    ] {
        session.turn(msg, 8).await.unwrap();
    }

    let buf = session.buffer();
    assert!(buf.total_tokens() <= 48);
    assert!(buf.stats().policy_calls > 0);
    assert!(buf.stats().compressions + buf.stats().evictions > 0);
    assert_eq!(buf.stats().policy_fallbacks, 0);
}

#[tokio::test]
async fn e2e_semantic_sessions_share_cache_and_stream_stats() {
    let cfg = config("policy = \"semantic\"\nmax_tokens = 24\n\n[semantic]\nsimilarity_threshold = 0.9\n");
    let cache = Arc::new(EmbeddingCache::new(
        Arc::new(HashingEmbedder::default()),
        cfg.embedding.cache_capacity,
    ));
    let broadcast = BroadcastSink::new(64);
    let mut rx = broadcast.subscribe();
    let collector = Arc::new(MetricsCollector::new(cfg.telemetry.window));
    let sink = FanoutSink::new()
        .with(Arc::new(broadcast.clone()))
        .with(collector.clone());

    let mut buffer = ContextBufferBuilder::from_config(&cfg)
        .embedding_cache(cache.clone())
        .telemetry(Arc::new(sink))
        .build()
        .unwrap();

    for _ in 0..4 {
        buffer.append("status update: all green", Role::User).await.unwrap();
        buffer.append("acknowledged, thanks", Role::Assistant).await.unwrap();
    }

    // Repeats collapse to their newest copies
    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.stats().evictions, 4);
    assert!(cache.stats().hits > 0);
    assert_eq!(cache.stats().entries, 2);
    assert_eq!(collector.summary().total_turns, 8);
    assert!(collector.export_prometheus().contains("membound_turns_total 8\n"));

    let mut received = 0;
    while rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 8);

    let ctx = buffer.assemble(&AssembleOptions::from(&cfg.assembler));
    assert!(ctx.prompt.contains("status update: all green"));
    assert!(!ctx.gaps.is_empty());
}

#[tokio::test]
async fn e2e_generation_failure_surfaces() {
    let cfg = ContextConfig {
        policy: PolicyKind::Importance,
        ..ContextConfig::default()
    };
    let buffer = ContextBufferBuilder::from_config(&cfg).build().unwrap();
    let mut session = Session::new(buffer, Arc::new(ScriptedGenerator::new(&[])));

    let err = session.turn("hello?", 16).await.unwrap_err();
    assert!(matches!(err, ContextError::Backend(BackendError::Generation(_))));
}

#[test]
fn e2e_invalid_config_is_rejected() {
    assert!(ContextConfig::from_toml("policy = \"fifo\"").is_err());
    assert!(ContextConfig::from_toml("max_tokens = 0").is_err());
    assert!(ContextConfig::from_toml("[hybrid]\nfast_evict_fraction = 1.5").is_err());
}
