//! Rolling summary: the oldest block of spans is folded into one summary.

use super::{Working, sliding};
use crate::qa_gate::QaGate;
use crate::token::span_cost;
use membound_core::{ContextError, Span, SpanId, Summarizer, Tokenizer};
use tracing::{debug, warn};

pub struct SummaryParams<'a> {
    pub summarizer: &'a dyn Summarizer,
    pub tokenizer: &'a dyn Tokenizer,
    pub max_summary_tokens: usize,
    pub qa_gate: Option<QaGate>,
}

/// Replace the shortest head block that frees enough room with a summary.
///
/// If the summary is not small enough, or fails the QA gate, the block is
/// evicted instead. Summarizer failures map to
/// [`ContextError::PolicyUnavailable`].
pub async fn reclaim(
    work: &mut Working,
    budget: usize,
    params: SummaryParams<'_>,
) -> Result<(), ContextError> {
    let total = work.total();
    if total <= budget {
        return Ok(());
    }
    let required = total - budget;

    // The block must exceed `required` so the summary has room
    let mut block_len = 0;
    let mut block_sum = 0;
    for span in &work.spans {
        block_len += 1;
        block_sum += span.tokens;
        if block_sum > required {
            break;
        }
    }
    if block_sum <= required {
        debug!(required, "nothing to keep; sliding");
        sliding::reclaim(work, budget);
        return Ok(());
    }

    let room = block_sum - required;
    let target = room.min(params.max_summary_tokens);
    let source = work.spans[..block_len]
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let summary = params
        .summarizer
        .summarize(&source, target)
        .await
        .map_err(|e| ContextError::unavailable("rolling_summary", e))?;
    let tokens = span_cost(params.tokenizer, &summary);

    if summary.trim().is_empty() || tokens > room {
        debug!(
            summary_tokens = tokens,
            room,
            block = block_len,
            "summary does not fit; evicting block"
        );
        sliding::reclaim(work, budget);
        return Ok(());
    }

    if let Some(gate) = params.qa_gate {
        let report = gate.check(&source, &summary);
        if !report.passed {
            warn!(
                fidelity = report.fidelity,
                threshold = gate.threshold(),
                ungrounded = ?report.ungrounded,
                "Summary failed QA gate; evicting block"
            );
            sliding::reclaim(work, budget);
            return Ok(());
        }
    }

    let replaced: Vec<SpanId> = work.spans.drain(..block_len).map(|s| s.id).collect();
    work.compressed.extend(replaced.iter().copied());
    let (id, created_at) = work.mint();
    work.summaries.push(id);
    debug!(
        summary = %id,
        replaced = replaced.len(),
        block_tokens = block_sum,
        summary_tokens = tokens,
        "rolling summary"
    );
    work.spans
        .insert(0, Span::summary(id, summary, tokens, created_at, replaced));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_support::ids;
    use crate::summarizer::ExtractiveSummarizer;
    use crate::token::HeuristicTokenizer;
    use async_trait::async_trait;
    use membound_core::{BackendError, Role};
    use std::sync::Arc;

    /// Returns a fixed text regardless of input.
    struct Canned(&'static str);

    #[async_trait]
    impl Summarizer for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn summarize(&self, _text: &str, _target: usize) -> Result<String, BackendError> {
            Ok(self.0.to_string())
        }
    }

    fn span(seq: u64, text: &str) -> Span {
        let tokens = span_cost(&HeuristicTokenizer, text);
        Span::new(SpanId(seq), Role::User, text, tokens, seq)
    }

    fn params(summarizer: &dyn Summarizer) -> SummaryParams<'_> {
        SummaryParams {
            summarizer,
            tokenizer: &HeuristicTokenizer,
            max_summary_tokens: 64,
            qa_gate: None,
        }
    }

    fn conversation() -> Vec<Span> {
        vec![
            // 40 bytes each: 10 tokens
            span(1, "Ship the release. Then verify the logs!!"),
            span(2, "Rollback plan is ready. Ping on-call now"),
            span(3, "Metrics look fine after the canary stage"),
        ]
    }

    #[tokio::test]
    async fn oldest_block_becomes_summary() {
        let summarizer = Canned("release shipped");
        let mut work = Working::new(conversation(), 4);

        reclaim(&mut work, 25, params(&summarizer)).await.unwrap();

        // Block {1} (10 tokens) must free 5: a 4-token summary fits
        assert_eq!(ids(&work.spans), vec![4, 2, 3]);
        let head = &work.spans[0];
        assert!(head.is_summary());
        assert_eq!(head.tokens, 4);
        assert_eq!(head.replaced, vec![SpanId(1)]);
        assert_eq!(work.compressed, vec![SpanId(1)]);
        assert!(work.evicted.is_empty());
        assert!(work.total() <= 25);
    }

    #[tokio::test]
    async fn extractive_summary_shrinks_block() {
        let summarizer = ExtractiveSummarizer::new(Arc::new(HeuristicTokenizer));
        let mut work = Working::new(conversation(), 4);

        reclaim(&mut work, 25, params(&summarizer)).await.unwrap();

        assert!(work.spans[0].is_summary());
        assert_eq!(work.spans[0].text, "Ship the release.");
        assert!(work.total() <= 25);
    }

    #[tokio::test]
    async fn oversized_summary_evicts_block() {
        let summarizer = Canned("this summary is far too long to be of any use here at all");
        let mut work = Working::new(conversation(), 4);

        reclaim(&mut work, 25, params(&summarizer)).await.unwrap();

        assert_eq!(ids(&work.spans), vec![2, 3]);
        assert_eq!(work.evicted, vec![SpanId(1)]);
        assert!(work.compressed.is_empty());
    }

    #[tokio::test]
    async fn ungrounded_summary_is_rejected_by_gate() {
        let summarizer = Canned("Bob paid 99");
        let mut work = Working::new(conversation(), 4);
        let mut p = params(&summarizer);
        p.qa_gate = Some(QaGate::new(1.0));

        reclaim(&mut work, 25, p).await.unwrap();

        assert!(work.spans.iter().all(|s| !s.is_summary()));
        assert_eq!(ids(&work.spans), vec![2, 3]);
    }

    #[tokio::test]
    async fn summarizer_failure_is_policy_unavailable() {
        struct Broken;

        #[async_trait]
        impl Summarizer for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            async fn summarize(&self, _t: &str, _n: usize) -> Result<String, BackendError> {
                Err(BackendError::Summarizer("model offline".into()))
            }
        }

        let mut work = Working::new(conversation(), 4);
        let err = reclaim(&mut work, 25, params(&Broken)).await.unwrap_err();
        assert!(matches!(err, ContextError::PolicyUnavailable { .. }));
    }

    #[tokio::test]
    async fn zero_budget_slides_everything() {
        let summarizer = Canned("x");
        let mut work = Working::new(conversation(), 4);
        reclaim(&mut work, 0, params(&summarizer)).await.unwrap();
        assert!(work.spans.is_empty());
        assert_eq!(work.evicted.len(), 3);
    }
}
