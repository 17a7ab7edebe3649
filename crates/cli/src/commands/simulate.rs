//! `membound simulate` — Replay a transcript under one policy.

use super::{load_config, replay};
use crate::transcript;
use membound_config::{ContextConfig, PolicyKind};
use std::path::Path;

pub struct SimulateOptions {
    pub policy: Option<PolicyKind>,
    pub max_tokens: Option<usize>,
    pub show_context: bool,
    pub json: bool,
    pub verbose: bool,
}

pub async fn run(
    config_path: Option<&Path>,
    transcript_path: &Path,
    opts: SimulateOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    apply_flags(&mut config, opts.policy, opts.max_tokens)?;

    let turns = transcript::load(transcript_path).await?;
    let cache = replay::local_cache(&config);
    let report = replay::run(&config, &turns, cache, opts.verbose, opts.show_context).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Policy {} · budget {} tokens · {} turns", report.policy, report.max_tokens, turns.len());
    println!("─────────────────────────────────────────────────────────────────");
    println!(
        "{:>4} {:<10} {:>5} {:>6} {:>8} {:>7} {:>10} {:>8}",
        "turn", "role", "id", "tokens", "retained", "evicted", "compressed", "fallback"
    );
    for row in &report.turns {
        let r = &row.result;
        println!(
            "{:>4} {:<10} {:>5} {:>6} {:>8} {:>7} {:>10} {:>8}",
            row.turn,
            row.role.as_str(),
            r.id.to_string(),
            r.tokens,
            row.retained,
            r.evicted.len(),
            r.compressed.len(),
            if r.fell_back { "yes" } else { "" }
        );
    }
    for skipped in &report.rejected {
        println!(
            "{:>4} skipped: needs {} tokens, budget is {}",
            skipped.turn, skipped.required, skipped.capacity
        );
    }

    let s = &report.stats;
    println!();
    println!("  Tokens seen:       {}", s.tokens_seen);
    println!("  Tokens retained:   {}", s.tokens_retained);
    println!("  Compression ratio: {:.3}", s.compression_ratio);
    println!("  Evictions:         {}", s.evictions);
    println!("  Compressions:      {}", s.compressions);
    println!("  Policy calls:      {}", s.policy_calls);
    println!("  Fallbacks:         {}", s.policy_fallbacks);
    let m = &report.metrics;
    if m.policy_turns > 0 {
        println!(
            "  Policy latency:    p50 {:.3}ms · p95 {:.3}ms · p99 {:.3}ms · max {:.3}ms",
            m.policy_latency_p50_ms, m.policy_latency_p95_ms, m.policy_latency_p99_ms, m.policy_latency_max_ms
        );
    }
    if report.cache.backend_calls > 0 {
        println!(
            "  Embedding cache:   {} hits, {} misses, {} entries",
            report.cache.hits, report.cache.misses, report.cache.entries
        );
    }

    if let Some(ctx) = &report.context {
        println!();
        println!("Assembled context ({} tokens):", ctx.span_tokens);
        for gap in &ctx.gaps {
            println!("  [gap {}..={}]", gap.first, gap.last);
        }
        println!("{}", ctx.prompt);
    }

    Ok(())
}

/// Apply command-line overrides on top of the loaded config.
pub fn apply_flags(
    config: &mut ContextConfig,
    policy: Option<PolicyKind>,
    max_tokens: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(policy) = policy {
        config.policy = policy;
    }
    if let Some(max_tokens) = max_tokens {
        config.max_tokens = max_tokens;
    }
    config.validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let mut config = ContextConfig::default();
        apply_flags(&mut config, Some(PolicyKind::Hybrid), Some(99)).unwrap();
        assert_eq!(config.policy, PolicyKind::Hybrid);
        assert_eq!(config.max_tokens, 99);
    }

    #[test]
    fn zero_budget_flag_is_rejected() {
        let mut config = ContextConfig::default();
        assert!(apply_flags(&mut config, None, Some(0)).is_err());
    }
}
