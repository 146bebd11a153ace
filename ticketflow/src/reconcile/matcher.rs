//! Maps a free-text predicted label onto one of a dropdown's options.

use crate::types::{DropdownOption, FieldResolution};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.78;

static SEPARATOR_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("separator pattern is valid"));

/// Similarity in `[0, 1]` between two normalised labels.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

impl<F> SimilarityScorer for F
where
    F: Fn(&str, &str) -> f64 + Send + Sync,
{
    fn score(&self, a: &str, b: &str) -> f64 {
        self(a, b)
    }
}

/// Ratcliff/Obershelp ratio: `2 * M / (len(a) + len(b))`, where `M` counts
/// the characters in the matching blocks found by repeatedly taking the
/// longest common run and recursing on both sides of it. The default
/// threshold is tuned for this measure.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchingBlocksRatio;

impl SimilarityScorer for MatchingBlocksRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let total = a.len() + b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * matching_chars(&a, &b) as f64 / total as f64
    }
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, (alo, ahi), (blo, bhi));
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common run inside the two windows as `(start_a, start_b, len)`.
/// Ties keep the run that starts earliest in `a`, then in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let width = bhi - blo + 1;
    let mut prev = vec![0usize; width];
    for i in alo..ahi {
        let mut row = vec![0usize; width];
        for j in blo..bhi {
            if a[i] == b[j] {
                let run = prev[j - blo] + 1;
                row[j - blo + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        prev = row;
    }
    best
}

/// Stricter edit-distance alternative.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizedLevenshtein;

impl SimilarityScorer for NormalizedLevenshtein {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b)
    }
}

/// Lowercases and collapses whitespace, punctuation and separators to single
/// spaces: `"IT-Support"`, `"it_support"` and `"IT  support!"` all become
/// `"it support"`.
pub fn normalize_label(label: &str) -> String {
    SEPARATOR_RUN
        .replace_all(&label.to_lowercase(), " ")
        .trim()
        .to_string()
}

#[derive(Clone)]
pub struct DropdownMatcher {
    threshold: f64,
    scorer: Arc<dyn SimilarityScorer>,
}

impl Default for DropdownMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl DropdownMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            scorer: Arc::new(MatchingBlocksRatio),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Case-insensitive equality, then normalised equality, then the best
    /// fuzzy score if it reaches the threshold. Ties keep the first option.
    pub fn resolve(&self, options: &[DropdownOption], requested: &str) -> FieldResolution {
        let requested = requested.trim();
        let usable: Vec<&DropdownOption> = options.iter().filter(|o| !o.id.is_empty()).collect();
        if requested.is_empty() || usable.is_empty() {
            return FieldResolution::miss(requested, 0.0);
        }

        let lowered = requested.to_lowercase();
        if let Some(option) = usable
            .iter()
            .find(|o| o.label.trim().to_lowercase() == lowered)
        {
            return exact(requested, option);
        }

        let normalized = normalize_label(requested);
        let candidates: Vec<(String, &DropdownOption)> = usable
            .iter()
            .map(|o| (normalize_label(&o.label), *o))
            .collect();
        if let Some((_, option)) = candidates.iter().find(|(label, _)| *label == normalized) {
            return exact(requested, option);
        }

        let mut best: Option<(&DropdownOption, f64)> = None;
        for (label, option) in &candidates {
            let score = self.scorer.score(&normalized, label);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((*option, score));
            }
        }

        match best {
            Some((option, score)) if score >= self.threshold => {
                debug!(
                    "Fuzzy-matched '{}' to '{}' (score {:.3})",
                    requested, option.label, score
                );
                FieldResolution {
                    requested: requested.to_string(),
                    resolved_option: Some(option.clone()),
                    exact: false,
                    score,
                }
            }
            Some((_, score)) => FieldResolution::miss(requested, score),
            None => FieldResolution::miss(requested, 0.0),
        }
    }
}

fn exact(requested: &str, option: &DropdownOption) -> FieldResolution {
    FieldResolution {
        requested: requested.to_string(),
        resolved_option: Some(option.clone()),
        exact: true,
        score: 1.0,
    }
}
