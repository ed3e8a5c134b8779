//! Candidate matcher: grades one pool entry against a query.

use crate::models::{Candidate, MatchReason};
use crate::query::similarity::SimilarityKind;

/// Score awarded to a prefix match. Kept below `1.0` so exact matches always
/// outrank prefix matches.
pub const PREFIX_SCORE: f64 = 0.92;
pub const EXACT_SCORE: f64 = 1.0;

fn prep(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Classify `symbol` / `name` against `query`.
///
/// Exact beats prefix beats fuzzy; each check short-circuits. An empty name
/// contributes nothing to the exact and prefix tiers.
pub fn classify_with(
    kind: SimilarityKind,
    query: &str,
    symbol: &str,
    name: Option<&str>,
) -> (MatchReason, f64) {
    let q = prep(query);
    let sym = prep(symbol);
    let name = name.map(prep).unwrap_or_default();

    if q == sym || (!name.is_empty() && q == name) {
        return (MatchReason::Exact, EXACT_SCORE);
    }
    if sym.starts_with(&q) || (!name.is_empty() && name.starts_with(&q)) {
        return (MatchReason::Prefix, PREFIX_SCORE);
    }
    let by_symbol = kind.score(&q, &sym);
    let by_name = if name.is_empty() {
        0.0
    } else {
        kind.score(&q, &name)
    };
    (MatchReason::Fuzzy, by_symbol.max(by_name))
}

/// [`classify_with`] using the default similarity.
pub fn classify(query: &str, symbol: &str, name: Option<&str>) -> (MatchReason, f64) {
    classify_with(SimilarityKind::default(), query, symbol, name)
}

/// Grades pool entries against one query and keeps those at or above
/// `min_score`.
#[derive(Clone, Copy, Debug)]
pub struct Matcher {
    pub min_score: f64,
    pub similarity: SimilarityKind,
}

impl Matcher {
    pub fn new(min_score: f64, similarity: SimilarityKind) -> Self {
        Self {
            min_score,
            similarity,
        }
    }

    /// Returns `None` for a blank query or a score below the threshold.
    pub fn candidate(
        &self,
        query: &str,
        symbol: &str,
        name: Option<&str>,
        index: Option<&str>,
    ) -> Option<Candidate> {
        if query.trim().is_empty() {
            return None;
        }
        let (reason, score) = classify_with(self.similarity, query, symbol, name);
        if score < self.min_score {
            return None;
        }
        Some(Candidate {
            symbol: symbol.to_string(),
            name: name.map(str::to_string),
            index: index.map(str::to_string),
            reason,
            score,
        })
    }
}
