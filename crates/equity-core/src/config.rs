//! Search defaults and their environment overrides.

use crate::query::guards::{clamp_limit, clamp_min_score, clamp_top_k, MAX_CANDIDATE_LIMIT};
use crate::query::similarity::SimilarityKind;

pub const DEFAULT_TOP_K: i64 = 10;
pub const DEFAULT_MIN_SCORE: f64 = 0.65;
pub const DEFAULT_CANDIDATE_LIMIT: i64 = 500;

pub const ENV_TOP_K: &str = "EQUITY_SEARCH_TOP_K";
pub const ENV_MIN_SCORE: &str = "EQUITY_SEARCH_MIN_SCORE";
pub const ENV_CANDIDATE_LIMIT: &str = "EQUITY_SEARCH_CANDIDATE_LIMIT";
pub const ENV_SIMILARITY: &str = "EQUITY_SEARCH_SIMILARITY";

/// Tunables for a search call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchConfig {
    pub top_k: i64,
    pub min_score: f64,
    /// Upper bound on rows pulled by `fetch_candidates`.
    pub candidate_limit: i64,
    pub similarity: SimilarityKind,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            similarity: SimilarityKind::TokenSet,
        }
    }
}

impl SearchConfig {
    /// Defaults overlaid with any `EQUITY_SEARCH_*` variables that parse.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SearchConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_TOP_K).and_then(|v| v.trim().parse::<i64>().ok()) {
            config.top_k = v;
        }
        if let Some(v) = lookup(ENV_MIN_SCORE).and_then(|v| v.trim().parse::<f64>().ok()) {
            config.min_score = v;
        }
        if let Some(v) = lookup(ENV_CANDIDATE_LIMIT).and_then(|v| v.trim().parse::<i64>().ok())
        {
            config.candidate_limit = v;
        }
        if let Some(kind) = lookup(ENV_SIMILARITY).and_then(|v| SimilarityKind::parse(&v)) {
            config.similarity = kind;
        }
        config.bounded()
    }

    /// Clamp every field into its guarded range.
    pub fn bounded(self) -> Self {
        Self {
            top_k: clamp_top_k(self.top_k),
            min_score: clamp_min_score(self.min_score),
            candidate_limit: clamp_limit(self.candidate_limit, MAX_CANDIDATE_LIMIT),
            similarity: self.similarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::guards::MAX_SEARCH_LIMIT;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = SearchConfig::default();
        assert_eq!(config.top_k, 10);
        assert_eq!(config.min_score, 0.65);
        assert_eq!(config.candidate_limit, 500);
        assert_eq!(config.similarity, SimilarityKind::TokenSet);
    }

    #[test]
    fn env_overrides_are_applied_and_clamped() {
        let config = SearchConfig::from_lookup(lookup_from(&[
            (ENV_TOP_K, "1000"),
            (ENV_MIN_SCORE, " 0.8 "),
            (ENV_SIMILARITY, "edit"),
        ]));
        assert_eq!(config.top_k, MAX_SEARCH_LIMIT);
        assert_eq!(config.min_score, 0.8);
        assert_eq!(config.similarity, SimilarityKind::Edit);
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let config = SearchConfig::from_lookup(lookup_from(&[
            (ENV_TOP_K, "many"),
            (ENV_SIMILARITY, "semantic"),
        ]));
        assert_eq!(config, SearchConfig::default());
    }
}
