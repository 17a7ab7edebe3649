//! Hybrid: cheap sliding eviction for part of the overflow, knapsack for the rest.

use super::{ImportanceScorer, Working, importance};
use tracing::debug;

pub fn reclaim(work: &mut Working, budget: usize, fast_evict_fraction: f32, scorer: &dyn ImportanceScorer) {
    let total = work.total();
    if total <= budget {
        return;
    }
    let overflow = total - budget;
    let fast = ((overflow as f64) * f64::from(fast_evict_fraction)).ceil() as usize;
    let fast = fast.min(overflow);

    let freed = work.slide_at_most(fast);
    debug!(overflow, fast, freed, "hybrid fast eviction");

    importance::reclaim(work, budget, scorer);
}
