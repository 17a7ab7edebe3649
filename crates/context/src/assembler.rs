//! Sparse context assembly.
//!
//! Renders retained spans, in buffer order, into one linear prompt and
//! records where each span landed so positions in the prompt can be mapped
//! back to sequence numbers. Evicted spans leave gaps in the sequence; gaps
//! are reported alongside the prompt but never marked inside it. Only a
//! summary span, being content itself, stands in for what it replaced.
//!
//! # Determinism
//!
//! Identical spans and options always produce identical output.

use membound_config::AssemblerConfig;
use membound_core::{Role, Span, SpanId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

// ── Types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembleOptions {
    /// Inserted between consecutive spans
    pub separator: String,
    /// Prefix each span with `role: `
    pub role_tags: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            separator: "\n".into(),
            role_tags: true,
        }
    }
}

impl From<&AssemblerConfig> for AssembleOptions {
    fn from(config: &AssemblerConfig) -> Self {
        Self {
            separator: config.separator.clone(),
            role_tags: config.role_tags,
        }
    }
}

/// Where one span sits in the assembled prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SpanId,
    pub role: Role,
    /// Byte range of the rendered span, role tag included
    pub bytes: Range<usize>,
    /// Range within the budgeted token sequence (span token counts only)
    pub tokens: Range<usize>,
}

/// A maximal run of sequence numbers no longer in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub first: SpanId,
    pub last: SpanId,
}

impl Gap {
    /// Number of missing sequence numbers.
    pub fn count(&self) -> u64 {
        self.last.0 - self.first.0 + 1
    }

    pub fn contains(&self, id: SpanId) -> bool {
        (self.first..=self.last).contains(&id)
    }
}

/// The rendered prompt plus its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub prompt: String,
    /// One per span, in prompt order
    pub segments: Vec<Segment>,
    /// Missing sequence runs, ascending
    pub gaps: Vec<Gap>,
    /// Sum of span token counts; role tags and separators are not budgeted
    pub span_tokens: usize,
}

impl AssembledContext {
    /// Sequence number of the span rendered at byte `pos`, or `None` for
    /// separators and out-of-range positions.
    pub fn sequence_at_byte(&self, pos: usize) -> Option<SpanId> {
        find(&self.segments, pos, |s| &s.bytes)
    }

    /// Sequence number owning token position `pos` of the budgeted sequence.
    pub fn sequence_at_token(&self, pos: usize) -> Option<SpanId> {
        find(&self.segments, pos, |s| &s.tokens)
    }

    /// Sequence numbers in prompt order.
    pub fn sequence(&self) -> Vec<SpanId> {
        self.segments.iter().map(|s| s.id).collect()
    }
}

fn find(segments: &[Segment], pos: usize, range: impl Fn(&Segment) -> &Range<usize>) -> Option<SpanId> {
    let idx = segments.partition_point(|s| range(s).end <= pos);
    segments
        .get(idx)
        .filter(|s| range(s).contains(&pos))
        .map(|s| s.id)
}

// ── Assembly ──────────────────────────────────────────────────────────────

/// Assemble `spans`. `origin` is the first sequence number of the buffer's
/// current lifetime; anything missing from `origin` up to the newest
/// retained span is reported as a gap.
pub fn assemble(spans: &[Span], origin: SpanId, options: &AssembleOptions) -> AssembledContext {
    let mut prompt = String::new();
    let mut segments = Vec::with_capacity(spans.len());
    let mut token_pos = 0;

    for (i, span) in spans.iter().enumerate() {
        if i > 0 {
            prompt.push_str(&options.separator);
        }
        let start = prompt.len();
        if options.role_tags {
            prompt.push_str(span.role.as_str());
            prompt.push_str(": ");
        }
        prompt.push_str(&span.text);

        segments.push(Segment {
            id: span.id,
            role: span.role,
            bytes: start..prompt.len(),
            tokens: token_pos..token_pos + span.tokens,
        });
        token_pos += span.tokens;
    }

    AssembledContext {
        prompt,
        segments,
        gaps: gaps(spans, origin),
        span_tokens: token_pos,
    }
}

fn gaps(spans: &[Span], origin: SpanId) -> Vec<Gap> {
    let present: BTreeSet<u64> = spans.iter().map(|s| s.id.0).collect();
    let Some(&newest) = present.last() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut run: Option<(u64, u64)> = None;
    for seq in origin.0..newest {
        if present.contains(&seq) {
            if let Some((first, last)) = run.take() {
                out.push(Gap {
                    first: SpanId(first),
                    last: SpanId(last),
                });
            }
        } else {
            run = Some(run.map_or((seq, seq), |(first, _)| (first, seq)));
        }
    }
    if let Some((first, last)) = run {
        out.push(Gap {
            first: SpanId(first),
            last: SpanId(last),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(seq: u64, role: Role, text: &str, tokens: usize) -> Span {
        Span::new(SpanId(seq), role, text, tokens, seq)
    }

    #[test]
    fn empty_buffer_assembles_to_nothing() {
        let ctx = assemble(&[], SpanId(1), &AssembleOptions::default());
        assert!(ctx.prompt.is_empty());
        assert!(ctx.segments.is_empty());
        assert!(ctx.gaps.is_empty());
    }

    #[test]
    fn spans_render_in_buffer_order_with_tags() {
        let spans = vec![
            span(1, Role::System, "be brief", 2),
            span(2, Role::User, "hi", 1),
        ];
        let ctx = assemble(&spans, SpanId(1), &AssembleOptions::default());
        assert_eq!(ctx.prompt, "system: be brief\nuser: hi");
        assert_eq!(ctx.segments[1].bytes, 17..25);
        assert_eq!(ctx.span_tokens, 3);
    }

    #[test]
    fn positions_map_back_to_sequence_numbers() {
        let opts = AssembleOptions {
            separator: "|".into(),
            role_tags: false,
        };
        let spans = vec![span(3, Role::User, "abc", 1), span(7, Role::Assistant, "de", 1)];
        let ctx = assemble(&spans, SpanId(1), &opts);
        assert_eq!(ctx.prompt, "abc|de");
        assert_eq!(ctx.sequence_at_byte(0), Some(SpanId(3)));
        assert_eq!(ctx.sequence_at_byte(2), Some(SpanId(3)));
        assert_eq!(ctx.sequence_at_byte(3), None);
        assert_eq!(ctx.sequence_at_byte(4), Some(SpanId(7)));
        assert_eq!(ctx.sequence_at_byte(6), None);
        assert_eq!(ctx.sequence_at_token(1), Some(SpanId(7)));
        assert_eq!(ctx.sequence_at_token(2), None);
    }

    #[test]
    fn gaps_cover_missing_runs() {
        let spans = vec![span(3, Role::User, "a", 1), span(4, Role::User, "b", 1), span(7, Role::User, "c", 1)];
        let ctx = assemble(&spans, SpanId(1), &AssembleOptions::default());
        assert_eq!(
            ctx.gaps,
            vec![
                Gap { first: SpanId(1), last: SpanId(2) },
                Gap { first: SpanId(5), last: SpanId(6) },
            ]
        );
        assert_eq!(ctx.gaps[1].count(), 2);
        assert!(ctx.gaps[0].contains(SpanId(2)));
    }

    #[test]
    fn summary_at_head_is_not_a_gap() {
        // Summary #4 replaced #1 and #2; it sits first but carries a later id
        let spans = vec![
            Span::summary(SpanId(4), "recap", 1, 4, vec![SpanId(1), SpanId(2)]),
            span(3, Role::User, "c", 1),
            span(5, Role::User, "d", 1),
        ];
        let ctx = assemble(&spans, SpanId(1), &AssembleOptions::default());
        assert_eq!(ctx.sequence(), vec![SpanId(4), SpanId(3), SpanId(5)]);
        assert_eq!(ctx.gaps, vec![Gap { first: SpanId(1), last: SpanId(2) }]);
        assert!(ctx.prompt.starts_with("summary: recap"));
    }

    #[test]
    fn serializes_with_ranges() {
        let spans = vec![span(2, Role::User, "hi", 1)];
        let ctx = assemble(&spans, SpanId(1), &AssembleOptions::default());
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["gaps"][0]["first"], 1);
        assert_eq!(json["segments"][0]["bytes"]["start"], 0);
        assert_eq!(json["span_tokens"], 1);
    }
}
