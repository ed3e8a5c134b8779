//! String similarity ratios in `[0, 1]`.
//!
//! Two interchangeable implementations sit behind [`SimilarityKind`]: a
//! token-set ratio (order-insensitive, tolerant of extra words) and a plain
//! indel edit-distance ratio. Callers only rely on the `[0, 1]` range and on
//! identical inputs scoring `1.0`.

use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SimilarityKind {
    #[default]
    TokenSet,
    Edit,
}

impl SimilarityKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "token_set" | "token-set" | "tokenset" => Some(SimilarityKind::TokenSet),
            "edit" | "indel" | "ratio" => Some(SimilarityKind::Edit),
            _ => None,
        }
    }

    pub fn score(&self, a: &str, b: &str) -> f64 {
        match self {
            SimilarityKind::TokenSet => token_set_ratio(a, b),
            SimilarityKind::Edit => ratio(a, b),
        }
    }
}

/// Default similarity used by the matcher.
pub fn similarity(a: &str, b: &str) -> f64 {
    SimilarityKind::default().score(a, b)
}

/// Length of the longest common subsequence, by chars.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Normalized indel similarity: `2 * lcs / (len(a) + len(b))`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(&a, &b)) as f64 / total as f64
}

fn join(tokens: &BTreeSet<&str>) -> String {
    tokens.iter().copied().collect::<Vec<_>>().join(" ")
}

/// Token-set ratio: compares the shared tokens against each side's full
/// token set and keeps the best pairing. A query whose tokens are a subset of
/// the target's scores `1.0`.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let shared: BTreeSet<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: BTreeSet<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: BTreeSet<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !shared.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 1.0;
    }

    let diff_a = join(&only_a);
    let diff_b = join(&only_b);
    if shared.is_empty() {
        return ratio(&diff_a, &diff_b);
    }

    let sect = join(&shared);
    let combined_a = format!("{sect} {diff_a}");
    let combined_b = format!("{sect} {diff_b}");
    ratio(&sect, &combined_a)
        .max(ratio(&sect, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}
