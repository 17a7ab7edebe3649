//! FIFO eviction of whole spans.

use super::Working;
use tracing::debug;

pub fn reclaim(work: &mut Working, budget: usize) {
    let before = work.evicted.len();
    let freed = work.slide_to(budget);
    debug!(evicted = work.evicted.len() - before, freed, budget, "sliding eviction");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_support::{ids, spans};

    #[test]
    fn evicts_oldest_until_fit() {
        let mut work = Working::new(spans(&[10, 10, 10, 10]), 5);
        reclaim(&mut work, 25);
        assert_eq!(ids(&work.spans), vec![3, 4]);
        assert_eq!(work.total(), 20);
    }

    #[test]
    fn zero_budget_empties_the_buffer() {
        let mut work = Working::new(spans(&[3, 4]), 3);
        reclaim(&mut work, 0);
        assert!(work.spans.is_empty());
        assert_eq!(work.evicted.len(), 2);
    }
}
