//! Semantic deduplication: near-duplicate spans collapse to the most recent.

use super::{Working, sliding};
use membound_core::ContextError;
use membound_embedding::{EmbeddingCache, cosine_similarity};
use std::collections::HashMap;
use tracing::debug;

/// Cluster every span by embedding similarity, keep the most recent span of
/// each cluster, then slide if still over `budget`.
///
/// Any embedding failure maps to [`ContextError::PolicyUnavailable`].
pub async fn reclaim(
    work: &mut Working,
    budget: usize,
    cache: &EmbeddingCache,
    threshold: f32,
) -> Result<(), ContextError> {
    if work.spans.is_empty() {
        return Ok(());
    }

    let texts: Vec<String> = work.spans.iter().map(|s| s.text.clone()).collect();
    let vectors = cache
        .get_or_compute(&texts)
        .await
        .map_err(|e| ContextError::unavailable("semantic", e))?;

    for span in &mut work.spans {
        span.embedding_key = Some(span.content_hash());
    }

    let labels = cluster(&vectors, threshold);
    let mut newest: HashMap<usize, usize> = HashMap::new();
    for (idx, label) in labels.iter().enumerate() {
        let slot = newest.entry(*label).or_insert(idx);
        if work.spans[idx].id > work.spans[*slot].id {
            *slot = idx;
        }
    }

    let keep: Vec<bool> = (0..work.spans.len())
        .map(|idx| newest.get(&labels[idx]) == Some(&idx))
        .collect();
    let before = work.evicted.len();
    let mut pos = 0;
    work.retain(|_| {
        let kept = keep[pos];
        pos += 1;
        kept
    });

    debug!(
        clusters = newest.len(),
        deduplicated = work.evicted.len() - before,
        threshold,
        "semantic clustering"
    );

    sliding::reclaim(work, budget);
    Ok(())
}

/// Single-linkage clustering: spans whose cosine similarity reaches
/// `threshold` share a label, transitively.
pub fn cluster<V: AsRef<[f32]>>(vectors: &[V], threshold: f32) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..vectors.len()).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            if cosine_similarity(vectors[i].as_ref(), vectors[j].as_ref()) >= threshold {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    (0..vectors.len()).map(|i| find(&mut parent, i)).collect()
}
