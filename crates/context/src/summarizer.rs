//! Extractive summarizer: keeps leading sentences that fit the target.

use async_trait::async_trait;
use membound_core::{BackendError, Summarizer, Tokenizer};
use std::sync::Arc;

use crate::token::HeuristicTokenizer;

/// Deterministic local summarizer.
///
/// Keeps whole leading sentences while they fit `target_tokens`; when even
/// the first sentence is too long, keeps leading words instead.
pub struct ExtractiveSummarizer {
    tokenizer: Arc<dyn Tokenizer>,
}

impl ExtractiveSummarizer {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    pub fn extract(&self, text: &str, target_tokens: usize) -> String {
        let fits = |candidate: &str| self.tokenizer.count(candidate) <= target_tokens;

        let mut out = take_while_fits(sentences(text), &fits);
        if out.is_empty() {
            out = take_while_fits(text.split_whitespace(), &fits);
        }
        if out.is_empty() {
            for ch in text.trim().chars() {
                out.push(ch);
                if !fits(&out) {
                    out.pop();
                    break;
                }
            }
        }
        out
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicTokenizer))
    }
}

fn take_while_fits<'a>(parts: impl Iterator<Item = &'a str>, fits: &dyn Fn(&str) -> bool) -> String {
    let mut out = String::new();
    for part in parts {
        let candidate = if out.is_empty() {
            part.to_string()
        } else {
            format!("{out} {part}")
        };
        if !fits(&candidate) {
            break;
        }
        out = candidate;
    }
    out
}

/// Split after `.`, `!` or `?`, trimming whitespace.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, text: &str, target_tokens: usize) -> Result<String, BackendError> {
        Ok(self.extract(text, target_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_leading_sentences_within_target() {
        let s = ExtractiveSummarizer::default();
        // 15 bytes + 1 + 16 bytes = 32 bytes = 8 tokens
        let out = s.extract("First sentence. Second one here. Third is long enough.", 8);
        assert_eq!(out, "First sentence. Second one here.");
    }

    #[test]
    fn falls_back_to_words_for_long_first_sentence() {
        let s = ExtractiveSummarizer::default();
        let out = s.extract("alpha beta gamma delta epsilon zeta eta theta", 3);
        assert_eq!(out, "alpha beta");
        assert!(HeuristicTokenizer.count(&out) <= 3);
    }

    #[test]
    fn falls_back_to_chars_for_one_long_word() {
        let s = ExtractiveSummarizer::default();
        let out = s.extract("supercalifragilistic", 2);
        assert_eq!(out, "supercal");
    }

    #[test]
    fn zero_target_yields_empty() {
        assert!(ExtractiveSummarizer::default().extract("Anything.", 0).is_empty());
    }

    #[tokio::test]
    async fn summarize_never_fails() {
        let s = ExtractiveSummarizer::default();
        let out = s.summarize("One. Two. Three.", 100).await.unwrap();
        assert_eq!(out, "One. Two. Three.");
    }
}
