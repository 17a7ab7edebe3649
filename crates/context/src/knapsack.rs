//! 0/1 knapsack selection.
//!
//! Dynamic programming over integer capacity. Among all subsets within the
//! capacity the result has maximum total value, then minimum total weight,
//! then retains the highest sequence numbers where several subsets tie.
//!
//! The choice table holds one bit per (item, capacity) cell and is capped at
//! [`MAX_TABLE_CELLS`]. Larger instances are solved over coarsened weights:
//! every weight is rounded up and the capacity rounded down by the same
//! factor, so the result still fits but may keep slightly less than the
//! exact optimum.

use membound_core::SpanId;

/// Upper bound on choice-table cells (4 MiB of bits).
pub const MAX_TABLE_CELLS: usize = 1 << 25;

/// One candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub id: SpanId,
    pub value: u64,
    pub weight: usize,
}

impl Item {
    pub fn new(id: impl Into<SpanId>, value: u64, weight: usize) -> Self {
        Self {
            id: id.into(),
            value,
            weight,
        }
    }
}

/// The chosen subset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Selected ids, ascending
    pub ids: Vec<SpanId>,
    pub value: u64,
    pub weight: usize,
}

impl Selection {
    pub fn contains(&self, id: SpanId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }
}

/// (value, weight): higher value wins, then lower weight.
#[derive(Clone, Copy, Default)]
struct Cell {
    value: u64,
    weight: usize,
}

impl Cell {
    fn beats_or_ties(&self, other: &Cell) -> bool {
        self.value > other.value || (self.value == other.value && self.weight <= other.weight)
    }
}

/// Select the optimal subset of `items` whose weights sum to at most
/// `capacity`. A negative capacity selects nothing.
pub fn select(items: &[Item], capacity: i64) -> Selection {
    if capacity < 0 || items.is_empty() {
        return Selection::default();
    }

    let mut sorted: Vec<Item> = items.to_vec();
    sorted.sort_by_key(|item| item.id);

    let total: usize = sorted.iter().map(|i| i.weight).sum();
    let cap = usize::try_from(capacity).unwrap_or(usize::MAX).min(total);
    let scale = sorted
        .len()
        .saturating_mul(cap.saturating_add(1))
        .div_ceil(MAX_TABLE_CELLS)
        .max(1);
    let weight = |item: &Item| item.weight.div_ceil(scale);
    let cap = cap / scale;
    let width = cap + 1;

    // dp[c]: best cell over the items seen so far with weight <= c
    let mut dp = vec![Cell::default(); width];
    // Bit i * width + c: item i is in the preferred subset for capacity c
    let mut take = ChoiceTable::new(sorted.len() * width);

    for (i, item) in sorted.iter().enumerate() {
        let w = weight(item);
        if w > cap {
            continue;
        }
        for c in (w..width).rev() {
            let base = dp[c - w];
            let with = Cell {
                value: base.value.saturating_add(item.value),
                weight: base.weight + w,
            };
            // Ties go to taking: later items have higher sequence numbers
            if with.beats_or_ties(&dp[c]) {
                dp[c] = with;
                take.set(i * width + c);
            }
        }
    }

    let mut picked = Vec::new();
    let mut c = cap;
    for (i, item) in sorted.iter().enumerate().rev() {
        if take.get(i * width + c) {
            picked.push(*item);
            c -= weight(item);
        }
    }
    picked.reverse();

    Selection {
        ids: picked.iter().map(|i| i.id).collect(),
        value: picked.iter().fold(0u64, |v, i| v.saturating_add(i.value)),
        weight: picked.iter().map(|i| i.weight).sum(),
    }
}

/// Flat bitset.
struct ChoiceTable(Vec<u64>);

impl ChoiceTable {
    fn new(bits: usize) -> Self {
        Self(vec![0; bits.div_ceil(64)])
    }

    fn set(&mut self, bit: usize) {
        self.0[bit / 64] |= 1u64 << (bit % 64);
    }

    fn get(&self, bit: usize) -> bool {
        self.0[bit / 64] & (1u64 << (bit % 64)) != 0
    }
}
