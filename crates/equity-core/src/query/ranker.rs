//! Result ranking: score order with tier tie-breaks, then top-k.

use std::cmp::Ordering;

use crate::models::{Candidate, MatchReason};

fn tier_rank(reason: MatchReason) -> u8 {
    match reason {
        MatchReason::Exact => 0,
        MatchReason::Prefix => 1,
        MatchReason::Fuzzy => 2,
    }
}

/// Order candidates by score (descending), exact before prefix before fuzzy on
/// equal scores, and keep at most `top_k`. Remaining ties keep input order.
pub fn rank(mut candidates: Vec<Candidate>, top_k: i64) -> Vec<Candidate> {
    if top_k <= 0 {
        return vec![];
    }
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| tier_rank(a.reason).cmp(&tier_rank(b.reason)))
    });
    candidates.truncate(top_k as usize);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(symbol: &str, reason: MatchReason, score: f64) -> Candidate {
        Candidate {
            symbol: symbol.to_string(),
            name: None,
            index: None,
            reason,
            score,
        }
    }

    #[test]
    fn higher_score_first() {
        let out = rank(
            vec![
                cand("A", MatchReason::Fuzzy, 0.7),
                cand("B", MatchReason::Prefix, 0.92),
                cand("C", MatchReason::Exact, 1.0),
            ],
            10,
        );
        let symbols: Vec<&str> = out.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["C", "B", "A"]);
    }

    #[test]
    fn tier_breaks_equal_scores() {
        let out = rank(
            vec![
                cand("FUZZ", MatchReason::Fuzzy, 0.92),
                cand("PRE", MatchReason::Prefix, 0.92),
            ],
            10,
        );
        assert_eq!(out[0].symbol, "PRE");
    }

    #[test]
    fn equal_fuzzy_scores_keep_input_order() {
        let out = rank(
            vec![
                cand("X", MatchReason::Fuzzy, 0.7),
                cand("Y", MatchReason::Fuzzy, 0.7),
                cand("Z", MatchReason::Fuzzy, 0.7),
            ],
            10,
        );
        let symbols: Vec<&str> = out.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn truncates_and_handles_non_positive_top_k() {
        let pool = vec![
            cand("A", MatchReason::Exact, 1.0),
            cand("B", MatchReason::Prefix, 0.92),
        ];
        assert_eq!(rank(pool.clone(), 1).len(), 1);
        assert!(rank(pool.clone(), 0).is_empty());
        assert!(rank(pool, -3).is_empty());
    }
}
