//! `membound compare` — Replay a transcript under every policy.

use super::simulate::apply_flags;
use super::{load_config, replay};
use crate::transcript;
use futures::future::join_all;
use membound_config::PolicyKind;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    transcript_path: &Path,
    max_tokens: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut base = load_config(config_path)?;
    apply_flags(&mut base, None, max_tokens)?;
    let turns = transcript::load(transcript_path).await?;

    // One cache for every run: only the semantic policy embeds, but a shared
    // store is how sessions are meant to use it.
    let cache = replay::local_cache(&base);
    let runs = PolicyKind::ALL.into_iter().map(|kind| {
        let mut config = base.clone();
        config.policy = kind;
        let cache = cache.clone();
        let turns = &turns;
        async move { replay::run(&config, turns, cache, false, false).await }
    });
    let reports = join_all(runs)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!("Budget {} tokens · {} turns", base.max_tokens, turns.len());
    println!("──────────────────────────────────────────────────────────────────────────");
    println!(
        "{:<16} {:>8} {:>6} {:>7} {:>8} {:>8} {:>6} {:>9} {:>8}",
        "policy", "retained", "seen", "ratio", "evicted", "compress", "calls", "fallbacks", "p95 ms"
    );
    for report in &reports {
        let s = &report.stats;
        println!(
            "{:<16} {:>8} {:>6} {:>7.3} {:>8} {:>8} {:>6} {:>9} {:>8.3}",
            report.policy,
            s.tokens_retained,
            s.tokens_seen,
            s.compression_ratio,
            s.evictions,
            s.compressions,
            s.policy_calls,
            s.policy_fallbacks,
            report.metrics.policy_latency_p95_ms
        );
    }

    let skipped = reports.first().map_or(0, |r| r.rejected.len());
    if skipped > 0 {
        println!();
        println!("  ⚠️  {skipped} turn(s) exceed the budget and were skipped");
    }

    Ok(())
}
