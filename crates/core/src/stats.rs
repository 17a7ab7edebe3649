//! Buffer statistics and the telemetry sink contract.
//!
//! The buffer pushes a [`StatsSnapshot`] to its sink after every mutating
//! operation. Sinks are fire-and-forget: `publish` cannot fail and must not
//! block the caller.

use serde::{Deserialize, Serialize};

/// Running counters derived from buffer mutations.
///
/// `tokens_seen`, `evictions`, `compressions`, `policy_calls` and
/// `policy_fallbacks` only ever grow, except across an explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Cumulative tokens ever appended
    pub tokens_seen: u64,
    /// Tokens currently held
    pub tokens_retained: u64,
    /// Spans fully removed
    pub evictions: u64,
    /// Spans replaced by a smaller summary span
    pub compressions: u64,
    /// Times a policy's reclaim routine ran
    pub policy_calls: u64,
    /// Times sliding eviction stood in for an unavailable policy
    pub policy_fallbacks: u64,
    /// Wall time of the policy call made by the latest mutation, fallback
    /// included; `None` when that mutation needed no policy
    pub last_policy_latency_us: Option<u64>,
}

impl Stats {
    /// `tokens_retained / tokens_seen`, or 1.0 before anything was seen.
    pub fn compression_ratio(&self) -> f64 {
        if self.tokens_seen == 0 {
            return 1.0;
        }
        self.tokens_retained as f64 / self.tokens_seen as f64
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tokens_seen: self.tokens_seen,
            tokens_retained: self.tokens_retained,
            evictions: self.evictions,
            compressions: self.compressions,
            compression_ratio: self.compression_ratio(),
            policy_calls: self.policy_calls,
            policy_fallbacks: self.policy_fallbacks,
            policy_latency_us: self.last_policy_latency_us,
        }
    }
}

/// What a telemetry sink receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub tokens_seen: u64,
    pub tokens_retained: u64,
    pub evictions: u64,
    pub compressions: u64,
    pub compression_ratio: f64,
    pub policy_calls: u64,
    pub policy_fallbacks: u64,
    /// Policy latency of the mutation behind this snapshot
    #[serde(default)]
    pub policy_latency_us: Option<u64>,
}

impl StatsSnapshot {
    pub fn policy_latency_ms(&self) -> Option<f64> {
        self.policy_latency_us.map(|us| us as f64 / 1000.0)
    }
}

/// Push-based consumer of stats snapshots.
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, snapshot: &StatsSnapshot);
}
