//! Character and word error rates.

use crate::text;
use serde::{Deserialize, Serialize};

/// Levenshtein edit distance between two token sequences.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let m = a.len();
    let n = b.len();

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

fn scoring_chars(value: &str) -> Vec<char> {
    text::normalize_for_scoring(value)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Character error rate of `hypothesis` against `reference`.
///
/// Case, whitespace and punctuation are ignored. Returns `None` when either
/// side is empty after normalization.
pub fn character_error_rate(reference: &str, hypothesis: &str) -> Option<f64> {
    let reference = scoring_chars(reference);
    let hypothesis = scoring_chars(hypothesis);
    if reference.is_empty() || hypothesis.is_empty() {
        return None;
    }
    Some(edit_distance(&reference, &hypothesis) as f64 / reference.len() as f64)
}

/// Word error rate over whitespace-delimited tokens after normalization.
pub fn word_error_rate(reference: &str, hypothesis: &str) -> Option<f64> {
    let reference = text::normalize_for_scoring(reference);
    let hypothesis = text::normalize_for_scoring(hypothesis);
    let reference: Vec<&str> = reference.split_whitespace().collect();
    let hypothesis: Vec<&str> = hypothesis.split_whitespace().collect();
    if reference.is_empty() || hypothesis.is_empty() {
        return None;
    }
    Some(edit_distance(&reference, &hypothesis) as f64 / reference.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cer: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wer: Option<f64>,
    pub reference_chars: usize,
    pub hypothesis_chars: usize,
}

impl AccuracyMetrics {
    pub fn compute(reference: &str, hypothesis: &str) -> Self {
        Self {
            cer: character_error_rate(reference, hypothesis),
            wer: word_error_rate(reference, hypothesis),
            reference_chars: scoring_chars(reference).len(),
            hypothesis_chars: scoring_chars(hypothesis).len(),
        }
    }
}
