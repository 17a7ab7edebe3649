//! Rolling-window metrics over the most recent buffer snapshots.
//!
//! Ratios and latency percentiles cover the window; token and eviction
//! totals come from the latest snapshot. [`MetricsCollector::export_prometheus`]
//! renders the summary in the Prometheus text exposition format.

use chrono::{DateTime, Utc};
use membound_core::{StatsSnapshot, TelemetrySink};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One recorded turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSample {
    pub recorded_at: DateTime<Utc>,
    pub snapshot: StatsSnapshot,
    /// Whether this turn incremented `policy_fallbacks`
    pub fell_back: bool,
}

/// Aggregates over the collector's window plus cumulative totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_turns: u64,
    pub window_turns: usize,
    pub total_tokens_seen: u64,
    pub total_tokens_retained: u64,
    pub total_evictions: u64,
    pub total_compressions: u64,
    pub total_fallbacks: u64,
    pub avg_compression_ratio: f64,
    pub min_compression_ratio: f64,
    pub max_compression_ratio: f64,
    /// Fraction of windowed turns on which a policy fell back to sliding
    pub fallback_rate: f64,
    /// Windowed turns that ran a policy; the latency figures cover these
    pub policy_turns: usize,
    pub policy_latency_p50_ms: f64,
    pub policy_latency_p95_ms: f64,
    pub policy_latency_p99_ms: f64,
    pub policy_latency_max_ms: f64,
}

#[derive(Debug, Default)]
struct State {
    turns: VecDeque<TurnSample>,
    total_turns: u64,
    last: Option<StatsSnapshot>,
}

/// Thread-safe collector; implements [`TelemetrySink`] so it can be handed
/// straight to a buffer.
#[derive(Debug)]
pub struct MetricsCollector {
    window: usize,
    state: RwLock<State>,
}

impl MetricsCollector {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            state: RwLock::new(State::default()),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a snapshot as one turn.
    pub fn observe(&self, snapshot: &StatsSnapshot) {
        let mut state = self.write();
        let fell_back = state
            .last
            .as_ref()
            .map_or(snapshot.policy_fallbacks > 0, |prev| {
                snapshot.policy_fallbacks > prev.policy_fallbacks
            });

        if state.turns.len() == self.window {
            state.turns.pop_front();
        }
        state.turns.push_back(TurnSample {
            recorded_at: Utc::now(),
            snapshot: snapshot.clone(),
            fell_back,
        });
        state.total_turns += 1;
        state.last = Some(snapshot.clone());
    }

    /// The windowed samples, oldest first.
    pub fn recent(&self) -> Vec<TurnSample> {
        self.read().turns.iter().cloned().collect()
    }

    pub fn summary(&self) -> MetricsSummary {
        let state = self.read();
        let Some(last) = state.last.as_ref() else {
            return MetricsSummary::default();
        };

        let ratios: Vec<f64> = state
            .turns
            .iter()
            .map(|t| t.snapshot.compression_ratio)
            .collect();
        let n = ratios.len().max(1) as f64;
        let fallbacks = state.turns.iter().filter(|t| t.fell_back).count();

        let mut latencies: Vec<f64> = state
            .turns
            .iter()
            .filter_map(|t| t.snapshot.policy_latency_ms())
            .collect();
        latencies.sort_by(f64::total_cmp);

        MetricsSummary {
            total_turns: state.total_turns,
            window_turns: state.turns.len(),
            total_tokens_seen: last.tokens_seen,
            total_tokens_retained: last.tokens_retained,
            total_evictions: last.evictions,
            total_compressions: last.compressions,
            total_fallbacks: last.policy_fallbacks,
            avg_compression_ratio: ratios.iter().sum::<f64>() / n,
            min_compression_ratio: ratios.iter().copied().fold(f64::INFINITY, f64::min),
            max_compression_ratio: ratios.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            fallback_rate: fallbacks as f64 / n,
            policy_turns: latencies.len(),
            policy_latency_p50_ms: percentile(&latencies, 0.50),
            policy_latency_p95_ms: percentile(&latencies, 0.95),
            policy_latency_p99_ms: percentile(&latencies, 0.99),
            policy_latency_max_ms: latencies.last().copied().unwrap_or(0.0),
        }
    }

    /// The summary in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let s = self.summary();
        let mut out = String::new();

        let counters: [(&str, &str, u64); 5] = [
            ("membound_turns_total", "Buffer mutations observed", s.total_turns),
            ("membound_tokens_seen_total", "Tokens ever appended", s.total_tokens_seen),
            ("membound_evictions_total", "Spans evicted", s.total_evictions),
            ("membound_compressions_total", "Spans folded into summaries", s.total_compressions),
            ("membound_policy_fallbacks_total", "Sliding stood in for an unavailable policy", s.total_fallbacks),
        ];
        for (name, help, value) in counters {
            metric(&mut out, name, help, "counter");
            let _ = writeln!(out, "{name} {value}");
        }

        let gauges: [(&str, &str, f64); 3] = [
            ("membound_tokens_retained", "Tokens currently held", s.total_tokens_retained as f64),
            ("membound_compression_ratio", "Mean retained/seen ratio over the window", s.avg_compression_ratio),
            ("membound_fallback_rate", "Share of windowed turns that fell back", s.fallback_rate),
        ];
        for (name, help, value) in gauges {
            metric(&mut out, name, help, "gauge");
            let _ = writeln!(out, "{name} {value:.3}");
        }

        let name = "membound_policy_latency_ms";
        metric(&mut out, name, "Policy reclaim latency over the window", "summary");
        for (q, value) in [
            ("0.5", s.policy_latency_p50_ms),
            ("0.95", s.policy_latency_p95_ms),
            ("0.99", s.policy_latency_p99_ms),
            ("1", s.policy_latency_max_ms),
        ] {
            let _ = writeln!(out, "{name}{{quantile=\"{q}\"}} {value:.3}");
        }
        let _ = writeln!(out, "{name}_count {}", s.policy_turns);
        out
    }

    /// Drop every recorded turn.
    pub fn clear(&self) {
        *self.write() = State::default();
    }
}

fn metric(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

/// Nearest-rank percentile of ascending `sorted`; 0 when empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
    sorted[idx]
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(100)
    }
}

impl TelemetrySink for MetricsCollector {
    fn publish(&self, snapshot: &StatsSnapshot) {
        self.observe(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(seen: u64, retained: u64, evictions: u64, fallbacks: u64) -> StatsSnapshot {
        StatsSnapshot {
            tokens_seen: seen,
            tokens_retained: retained,
            evictions,
            compressions: 0,
            compression_ratio: retained as f64 / seen as f64,
            policy_calls: fallbacks,
            policy_fallbacks: fallbacks,
            policy_latency_us: None,
        }
    }

    fn timed(seen: u64, latency_us: Option<u64>) -> StatsSnapshot {
        StatsSnapshot {
            policy_latency_us: latency_us,
            ..snap(seen, 10, 0, 0)
        }
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let collector = MetricsCollector::new(5);
        assert_eq!(collector.summary(), MetricsSummary::default());
    }

    #[test]
    fn window_keeps_only_recent_turns() {
        let collector = MetricsCollector::new(3);
        for i in 1..=5 {
            collector.observe(&snap(i * 10, 10, 0, 0));
        }
        let summary = collector.summary();
        assert_eq!(summary.total_turns, 5);
        assert_eq!(summary.window_turns, 3);
        assert_eq!(collector.recent()[0].snapshot.tokens_seen, 30);
        assert_eq!(summary.total_tokens_seen, 50);
    }

    #[test]
    fn ratios_are_aggregated() {
        let collector = MetricsCollector::new(10);
        collector.observe(&snap(10, 10, 0, 0));
        collector.observe(&snap(20, 10, 1, 0));
        collector.observe(&snap(40, 10, 3, 0));

        let summary = collector.summary();
        assert!((summary.max_compression_ratio - 1.0).abs() < 1e-9);
        assert!((summary.min_compression_ratio - 0.25).abs() < 1e-9);
        assert!((summary.avg_compression_ratio - (1.0 + 0.5 + 0.25) / 3.0).abs() < 1e-9);
        assert_eq!(summary.total_evictions, 3);
    }

    #[test]
    fn fallback_rate_counts_turns_that_fell_back() {
        let collector = MetricsCollector::new(10);
        collector.observe(&snap(10, 10, 0, 0));
        collector.observe(&snap(20, 10, 1, 1));
        collector.observe(&snap(30, 10, 2, 1));
        collector.observe(&snap(40, 10, 3, 2));

        let summary = collector.summary();
        assert_eq!(summary.total_fallbacks, 2);
        assert!((summary.fallback_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let sorted: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.50), 11.0);
        assert_eq!(percentile(&sorted, 0.95), 20.0);
        assert_eq!(percentile(&sorted, 0.99), 20.0);
        assert_eq!(percentile(&[3.0], 0.5), 3.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn latency_covers_only_turns_that_ran_a_policy() {
        let collector = MetricsCollector::new(10);
        collector.observe(&timed(10, None));
        for (i, us) in [4_000, 1_000, 3_000, 2_000].into_iter().enumerate() {
            collector.observe(&timed(20 + i as u64, Some(us)));
        }

        let summary = collector.summary();
        assert_eq!(summary.window_turns, 5);
        assert_eq!(summary.policy_turns, 4);
        assert!((summary.policy_latency_p50_ms - 3.0).abs() < 1e-9);
        assert!((summary.policy_latency_p95_ms - 4.0).abs() < 1e-9);
        assert!((summary.policy_latency_max_ms - 4.0).abs() < 1e-9);
    }

    #[test]
    fn latency_window_drops_old_samples() {
        let collector = MetricsCollector::new(2);
        collector.observe(&timed(10, Some(90_000)));
        collector.observe(&timed(20, Some(1_000)));
        collector.observe(&timed(30, Some(2_000)));
        assert!((collector.summary().policy_latency_max_ms - 2.0).abs() < 1e-9);
    }

    #[test]
    fn prometheus_export_lists_every_metric() {
        let collector = MetricsCollector::new(10);
        collector.observe(&snap(40, 20, 3, 1));
        collector.observe(&timed(50, Some(1_500)));

        let text = collector.export_prometheus();
        assert!(text.contains("# TYPE membound_turns_total counter\nmembound_turns_total 2\n"));
        assert!(text.contains("membound_tokens_seen_total 50\n"));
        assert!(text.contains("# TYPE membound_compression_ratio gauge\n"));
        assert!(text.contains("# TYPE membound_policy_latency_ms summary\n"));
        assert!(text.contains("membound_policy_latency_ms{quantile=\"0.5\"} 1.500\n"));
        assert!(text.contains("membound_policy_latency_ms_count 1\n"));
        for line in text.lines().filter(|l| !l.starts_with('#')) {
            assert_eq!(line.split(' ').count(), 2, "malformed sample line: {line}");
        }
    }

    #[test]
    fn empty_export_is_well_formed() {
        let text = MetricsCollector::default().export_prometheus();
        assert!(text.contains("membound_turns_total 0\n"));
        assert!(text.contains("membound_policy_latency_ms_count 0\n"));
    }

    #[test]
    fn clear_resets_everything() {
        let collector = MetricsCollector::default();
        collector.publish(&snap(10, 5, 1, 0));
        collector.clear();
        assert_eq!(collector.summary().total_turns, 0);
        assert!(collector.recent().is_empty());
    }
}
