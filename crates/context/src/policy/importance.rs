//! Importance-based retention via knapsack selection.

use super::Working;
use crate::knapsack::{self, Item};
use membound_config::ImportanceConfig;
use membound_core::{Role, Span};
use tracing::debug;

/// Knapsack value of the highest-scoring span in an instance.
const VALUE_SCALE: f64 = 1e9;

/// Assigns a value to each span; higher is more worth keeping.
pub trait ImportanceScorer: Send + Sync {
    fn name(&self) -> &str;

    /// `age` is the number of spans newer than `span` in the buffer.
    fn score(&self, span: &Span, age: usize) -> f64;
}

/// Role weight decayed geometrically with age.
#[derive(Debug, Clone)]
pub struct RecencyScorer {
    decay: f64,
    system: f64,
    user: f64,
    assistant: f64,
    summary: f64,
}

impl RecencyScorer {
    pub fn new(decay: f64) -> Self {
        Self {
            decay,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ImportanceConfig) -> Self {
        Self {
            decay: config.recency_decay,
            system: config.system_weight,
            user: config.user_weight,
            assistant: config.assistant_weight,
            summary: config.summary_weight,
        }
    }

    fn weight(&self, role: Role) -> f64 {
        match role {
            Role::System => self.system,
            Role::User => self.user,
            Role::Assistant => self.assistant,
            Role::Summary => self.summary,
        }
    }
}

impl Default for RecencyScorer {
    fn default() -> Self {
        Self::from_config(&ImportanceConfig::default())
    }
}

impl ImportanceScorer for RecencyScorer {
    fn name(&self) -> &str {
        "recency"
    }

    fn score(&self, span: &Span, age: usize) -> f64 {
        let age = i32::try_from(age).unwrap_or(i32::MAX);
        self.weight(span.role) * self.decay.powi(age)
    }
}

fn usable(score: f64) -> bool {
    score.is_finite() && score > 0.0
}

/// Scale `score` against the instance maximum. Any positive score is worth
/// at least 1.
fn quantize(score: f64, max_score: f64) -> u64 {
    if !usable(score) || !usable(max_score) {
        return 0;
    }
    ((score / max_score).min(1.0) * VALUE_SCALE).round().max(1.0) as u64
}

/// Keep the highest-value subset of spans that fits `budget`.
///
/// A span's explicit importance overrides the scorer.
pub fn reclaim(work: &mut Working, budget: usize, scorer: &dyn ImportanceScorer) {
    if work.total() <= budget {
        return;
    }

    let len = work.spans.len();
    let scores: Vec<f64> = work
        .spans
        .iter()
        .enumerate()
        .map(|(pos, span)| {
            span.importance
                .unwrap_or_else(|| scorer.score(span, len - 1 - pos))
        })
        .collect();
    let max_score = scores.iter().copied().filter(|s| usable(*s)).fold(0.0, f64::max);
    let items: Vec<Item> = work
        .spans
        .iter()
        .zip(&scores)
        .map(|(span, score)| Item::new(span.id, quantize(*score, max_score), span.tokens))
        .collect();

    let capacity = i64::try_from(budget).unwrap_or(i64::MAX);
    let selection = knapsack::select(&items, capacity);
    let before = work.evicted.len();
    work.retain(|span| selection.contains(span.id));

    debug!(
        scorer = scorer.name(),
        kept = work.spans.len(),
        evicted = work.evicted.len() - before,
        value = selection.value,
        weight = selection.weight,
        budget,
        "importance selection"
    );
}
