//! Summary fidelity check.
//!
//! Extracts checkable facts from a summary (numbers and dates, proper
//! names, quoted strings) and requires that a minimum fraction of them also
//! occur among the facts of the source text.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static NUMBER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\d+\.\d+\b",
        r"\b\d+\b",
        r"\d{1,2}/\d{1,2}/\d{2,4}",
        r"\d{1,2}-\d{1,2}-\d{2,4}",
    ]
    .into_iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static QUOTE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r#""([^"]+)""#, r"'([^']+)'"]
        .into_iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    /// Facts found in the summary
    pub facts: usize,
    /// Summary facts absent from the source
    pub ungrounded: Vec<String>,
    /// `1 - ungrounded / facts`, or 1.0 with no facts
    pub fidelity: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QaGate {
    threshold: f64,
}

impl QaGate {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn check(&self, source: &str, summary: &str) -> QaReport {
        if summary.trim().is_empty() {
            return QaReport {
                facts: 0,
                ungrounded: Vec::new(),
                fidelity: 1.0,
                passed: true,
            };
        }

        let known = facts(source);
        let claimed = facts(summary);
        let ungrounded: Vec<String> = claimed.difference(&known).cloned().collect();

        let fidelity = if claimed.is_empty() {
            1.0
        } else {
            1.0 - ungrounded.len() as f64 / claimed.len() as f64
        };

        QaReport {
            facts: claimed.len(),
            ungrounded,
            fidelity,
            passed: fidelity >= self.threshold,
        }
    }
}

/// Every fact, tagged by kind so a number never matches a name.
fn facts(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();

    for re in NUMBER_PATTERNS.iter() {
        out.extend(re.find_iter(text).map(|m| format!("num:{}", m.as_str())));
    }

    for re in QUOTE_PATTERNS.iter() {
        out.extend(
            re.captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| format!("quote:{}", m.as_str())),
        );
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        let clean: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        let capitalized = clean.chars().next().is_some_and(char::is_uppercase);
        let sentence_start = i == 0 || words[i - 1].ends_with(['.', '!', '?']);
        if capitalized && !sentence_start {
            out.insert(format!("name:{clean}"));
        }
    }

    out
}
