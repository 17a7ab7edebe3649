//! Retention policies.
//!
//! A policy runs only when an append would overflow the budget. It receives
//! a [`Working`] copy of the buffer's spans and the token budget the copy
//! must fit into (`max_tokens - incoming`), and removes or compresses spans
//! until it does. The buffer commits the working copy only once the policy
//! has finished, so a failed or timed-out policy leaves the buffer untouched.
//!
//! | Policy | Strategy |
//! |--------|----------|
//! | Sliding | Oldest spans evicted first |
//! | Importance | Knapsack over per-span scores |
//! | Semantic | Near-duplicates collapsed to their most recent span, then sliding |
//! | Rolling summary | Oldest block replaced by one summary span |
//! | Hybrid | Sliding for part of the overflow, importance for the rest |

pub mod hybrid;
pub mod importance;
pub mod rolling_summary;
pub mod semantic;
pub mod sliding;

pub use importance::{ImportanceScorer, RecencyScorer};

use crate::qa_gate::QaGate;
use membound_config::{ContextConfig, PolicyKind};
use membound_core::{ContextError, Span, SpanId, total_tokens};

/// The active policy and its configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Policy {
    #[default]
    Sliding,
    Importance,
    Semantic {
        similarity_threshold: f32,
    },
    RollingSummary {
        max_summary_tokens: usize,
        qa_gate: Option<QaGate>,
    },
    Hybrid {
        fast_evict_fraction: f32,
    },
}

impl Policy {
    pub fn semantic(similarity_threshold: f32) -> Self {
        Self::Semantic {
            similarity_threshold,
        }
    }

    pub fn rolling_summary(max_summary_tokens: usize) -> Self {
        Self::RollingSummary {
            max_summary_tokens,
            qa_gate: None,
        }
    }

    pub fn hybrid(fast_evict_fraction: f32) -> Self {
        Self::Hybrid {
            fast_evict_fraction,
        }
    }

    /// Build the configured policy. Summaries are capped at an eighth of
    /// the budget so they always leave room for new content.
    pub fn from_config(config: &ContextConfig) -> Self {
        match config.policy {
            PolicyKind::Sliding => Self::Sliding,
            PolicyKind::Importance => Self::Importance,
            PolicyKind::Semantic => Self::semantic(config.semantic.similarity_threshold),
            PolicyKind::RollingSummary => Self::RollingSummary {
                max_summary_tokens: config
                    .summary
                    .max_summary_tokens
                    .min((config.max_tokens / 8).max(1)),
                qa_gate: config
                    .summary
                    .qa_gate
                    .then(|| QaGate::new(config.summary.qa_threshold)),
            },
            PolicyKind::Hybrid => Self::hybrid(config.hybrid.fast_evict_fraction),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Sliding => PolicyKind::Sliding,
            Self::Importance => PolicyKind::Importance,
            Self::Semantic { .. } => PolicyKind::Semantic,
            Self::RollingSummary { .. } => PolicyKind::RollingSummary,
            Self::Hybrid { .. } => PolicyKind::Hybrid,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    pub fn validate(&self) -> Result<(), ContextError> {
        match self {
            Self::Semantic {
                similarity_threshold: t,
            } if !(*t > 0.0 && *t <= 1.0) => Err(ContextError::invalid(format!(
                "similarity threshold must be in (0, 1], got {t}"
            ))),
            Self::Hybrid {
                fast_evict_fraction: f,
            } if !(0.0..=1.0).contains(f) => Err(ContextError::invalid(format!(
                "fast evict fraction must be in [0, 1], got {f}"
            ))),
            Self::RollingSummary {
                max_summary_tokens: 0,
                ..
            } => Err(ContextError::invalid("max summary tokens must be > 0")),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Scratch copy of the buffer a policy mutates.
#[derive(Debug, Clone)]
pub struct Working {
    pub spans: Vec<Span>,
    /// Spans removed outright
    pub evicted: Vec<SpanId>,
    /// Spans folded into a summary
    pub compressed: Vec<SpanId>,
    /// Summary spans created
    pub summaries: Vec<SpanId>,
    next_seq: u64,
}

impl Working {
    pub fn new(spans: Vec<Span>, next_seq: u64) -> Self {
        Self {
            spans,
            evicted: Vec::new(),
            compressed: Vec::new(),
            summaries: Vec::new(),
            next_seq,
        }
    }

    pub fn total(&self) -> usize {
        total_tokens(&self.spans)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Allocate the next sequence number; it doubles as the logical clock.
    pub fn mint(&mut self) -> (SpanId, u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        (SpanId(seq), seq)
    }

    /// Evict from the head until the total fits `budget`. Returns the tokens freed.
    pub fn slide_to(&mut self, budget: usize) -> usize {
        let mut total = self.total();
        let excess = total.saturating_sub(budget);
        if excess == 0 {
            return 0;
        }
        let mut cut = 0;
        let mut freed = 0;
        while total > budget && cut < self.spans.len() {
            freed += self.spans[cut].tokens;
            total -= self.spans[cut].tokens;
            cut += 1;
        }
        self.evicted.extend(self.spans.drain(..cut).map(|s| s.id));
        freed
    }

    /// Evict from the head while the tokens freed stay within `limit`.
    /// Stops at the first span that would overshoot. Returns the tokens freed.
    pub fn slide_at_most(&mut self, limit: usize) -> usize {
        let mut cut = 0;
        let mut freed = 0;
        while let Some(head) = self.spans.get(cut) {
            if freed + head.tokens > limit {
                break;
            }
            freed += head.tokens;
            cut += 1;
        }
        self.evicted.extend(self.spans.drain(..cut).map(|s| s.id));
        freed
    }

    /// Keep spans matching `keep`, evicting the rest in order.
    pub fn retain(&mut self, mut keep: impl FnMut(&Span) -> bool) {
        let mut evicted = Vec::new();
        self.spans.retain(|span| {
            let kept = keep(span);
            if !kept {
                evicted.push(span.id);
            }
            kept
        });
        self.evicted.extend(evicted);
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{ids, spans};
    use super::*;

    #[test]
    fn slide_to_evicts_from_head() {
        let mut work = Working::new(spans(&[20, 20, 20]), 4);
        let freed = work.slide_to(30);
        assert_eq!(freed, 40);
        assert_eq!(ids(&work.spans), vec![3]);
        assert_eq!(work.evicted, vec![SpanId(1), SpanId(2)]);
    }

    #[test]
    fn slide_to_within_budget_is_noop() {
        let mut work = Working::new(spans(&[5, 5]), 3);
        assert_eq!(work.slide_to(10), 0);
        assert!(work.evicted.is_empty());
    }

    #[test]
    fn slide_at_most_stops_before_overshooting() {
        let mut work = Working::new(spans(&[3, 4, 2]), 4);
        assert_eq!(work.slide_at_most(6), 3);
        assert_eq!(ids(&work.spans), vec![2, 3]);
        assert_eq!(work.slide_at_most(0), 0);
        assert_eq!(work.evicted, vec![SpanId(1)]);
    }

    #[test]
    fn retain_records_evictions_in_order() {
        let mut work = Working::new(spans(&[1, 2, 3, 4]), 5);
        work.retain(|s| s.id.0 % 2 == 0);
        assert_eq!(ids(&work.spans), vec![2, 4]);
        assert_eq!(work.evicted, vec![SpanId(1), SpanId(3)]);
    }

    #[test]
    fn mint_is_monotonic() {
        let mut work = Working::new(Vec::new(), 7);
        assert_eq!(work.mint(), (SpanId(7), 7));
        assert_eq!(work.mint(), (SpanId(8), 8));
        assert_eq!(work.next_seq(), 9);
    }

    #[test]
    fn policy_validation() {
        assert!(Policy::semantic(0.0).validate().is_err());
        assert!(Policy::semantic(1.0).validate().is_ok());
        assert!(Policy::hybrid(1.5).validate().is_err());
        assert!(Policy::hybrid(0.0).validate().is_ok());
        assert!(Policy::rolling_summary(0).validate().is_err());
        assert!(Policy::Sliding.validate().is_ok());
    }

    #[test]
    fn from_config_caps_summary_size() {
        let mut config = ContextConfig {
            policy: PolicyKind::RollingSummary,
            max_tokens: 400,
            ..ContextConfig::default()
        };
        config.summary.qa_gate = true;
        let policy = Policy::from_config(&config);
        assert_eq!(
            policy,
            Policy::RollingSummary {
                max_summary_tokens: 50,
                qa_gate: Some(QaGate::new(config.summary.qa_threshold)),
            }
        );
        assert_eq!(policy.name(), "rolling_summary");
    }
}
