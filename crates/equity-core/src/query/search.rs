//! Symbol search backends: in-memory pools and the SQLite directory.

use std::collections::BTreeSet;
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::errors::EquityResult;
use crate::models::{Candidate, EquityRow, SymbolHit};
use crate::query::enrich::enrich;
use crate::query::guards::{clamp_min_score, clamp_top_k, truncate_query};
use crate::query::matcher::Matcher;
use crate::query::ranker::rank;
use crate::query::similarity::SimilarityKind;
use crate::store::database::SymbolStore;

fn wanted_indices(indices: Option<&[String]>) -> BTreeSet<String> {
    indices
        .unwrap_or_default()
        .iter()
        .map(|i| i.trim().to_uppercase())
        .filter(|i| !i.is_empty())
        .collect()
}

/// Search loaded constituent rows. Each matching row is its own hit, carrying
/// that row's index label; an empty or absent `indices` list disables the
/// index filter.
///
/// `top_k` and `min_score` are bounded as in [`SymbolDirectory::search`].
pub fn search_pool(
    rows: &[EquityRow],
    query: &str,
    indices: Option<&[String]>,
    top_k: i64,
    min_score: f64,
) -> Vec<SymbolHit> {
    search_pool_with(SimilarityKind::default(), rows, query, indices, top_k, min_score)
}

pub fn search_pool_with(
    similarity: SimilarityKind,
    rows: &[EquityRow],
    query: &str,
    indices: Option<&[String]>,
    top_k: i64,
    min_score: f64,
) -> Vec<SymbolHit> {
    let query = truncate_query(query);
    if query.trim().is_empty() {
        return vec![];
    }
    let wanted = wanted_indices(indices);
    let matcher = Matcher::new(clamp_min_score(min_score), similarity);

    let candidates: Vec<Candidate> = rows
        .par_iter()
        .filter(|row| wanted.is_empty() || wanted.contains(&row.index.trim().to_uppercase()))
        .filter_map(|row| matcher.candidate(&query, &row.symbol, Some(row.name.as_str()), Some(row.index.as_str())))
        .collect();
    let matched = candidates.len();

    let hits: Vec<SymbolHit> = rank(candidates, clamp_top_k(top_k))
        .into_iter()
        .map(|c| SymbolHit {
            symbol: c.symbol,
            name: c.name.unwrap_or_default(),
            indices: c.index.into_iter().collect(),
            score: c.score,
            reason: c.reason,
        })
        .collect();
    info!(
        query = %query,
        indices = ?wanted,
        pool = rows.len(),
        matched,
        returned = hits.len(),
        "search_done"
    );
    hits
}

/// Rank bare symbols against `query`. Hits carry no name or indices.
pub fn rank_symbols<S: AsRef<str>>(
    symbols: &[S],
    query: &str,
    min_score: f64,
    top_k: i64,
) -> Vec<SymbolHit> {
    let query = truncate_query(query);
    let matcher = Matcher::new(clamp_min_score(min_score), SimilarityKind::default());
    let candidates: Vec<Candidate> = symbols
        .iter()
        .filter_map(|s| matcher.candidate(&query, s.as_ref(), None, None))
        .collect();
    rank(candidates, clamp_top_k(top_k))
        .into_iter()
        .map(|c| SymbolHit {
            symbol: c.symbol,
            name: String::new(),
            indices: vec![],
            score: c.score,
            reason: c.reason,
        })
        .collect()
}

/// Pretty JSON array of hits; scores are rounded to three decimals.
pub fn render_results(hits: &[SymbolHit]) -> EquityResult<String> {
    Ok(serde_json::to_string_pretty(hits)?)
}

/// Store-backed directory: ingestion target plus search front-end.
pub struct SymbolDirectory {
    store: SymbolStore,
    config: SearchConfig,
}

impl SymbolDirectory {
    /// Open the store at `path` with configuration read from the environment.
    pub fn open(path: impl AsRef<Path>) -> EquityResult<Self> {
        Ok(Self::with_config(SymbolStore::open(path)?, SearchConfig::from_env()))
    }

    pub fn with_config(store: SymbolStore, config: SearchConfig) -> Self {
        Self {
            store,
            config: config.bounded(),
        }
    }

    pub fn store(&self) -> &SymbolStore {
        &self.store
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Fuzzy search over every stored equity (optionally restricted to
    /// members of `indices`): classify, rank, then join names and index
    /// labels. `None` for `top_k` or `min_score` falls back to the config.
    ///
    /// `top_k` is capped at [`MAX_SEARCH_LIMIT`](crate::query::guards::MAX_SEARCH_LIMIT)
    /// and `min_score` is clamped into `[0, 1]`, so a threshold above 1 still
    /// admits exact hits.
    pub fn search(
        &self,
        query: &str,
        indices: Option<&[String]>,
        top_k: Option<i64>,
        min_score: Option<f64>,
    ) -> EquityResult<Vec<SymbolHit>> {
        let query = truncate_query(query);
        if query.trim().is_empty() {
            return Ok(vec![]);
        }
        let top_k = clamp_top_k(top_k.unwrap_or(self.config.top_k));
        let min_score = clamp_min_score(min_score.unwrap_or(self.config.min_score));
        let matcher = Matcher::new(min_score, self.config.similarity);

        let pool = self.store.fetch_pool(indices)?;
        let candidates: Vec<Candidate> = pool
            .par_iter()
            .filter_map(|(symbol, name)| matcher.candidate(&query, symbol, name.as_deref(), None))
            .collect();
        debug!(pool = pool.len(), candidates = candidates.len(), "pool_classified");

        let ranked = rank(candidates, top_k);
        let hits = enrich(&self.store, ranked)?;
        info!(query = %query, top_k, min_score, returned = hits.len(), "search_done");
        Ok(hits)
    }

    /// Symbol lookup: exact/prefix candidates from the store, ranked on the
    /// symbol alone, then enriched.
    pub fn lookup(&self, query: &str) -> EquityResult<Vec<SymbolHit>> {
        let symbols = self.store.fetch_candidates(query, self.config.candidate_limit)?;
        let hits = rank_symbols(symbols.as_slice(), query, self.config.min_score, self.config.top_k);
        let ranked: Vec<Candidate> = hits
            .into_iter()
            .map(|h| Candidate {
                symbol: h.symbol,
                name: None,
                index: None,
                reason: h.reason,
                score: h.score,
            })
            .collect();
        let out = enrich(&self.store, ranked)?;
        info!(query, candidates = symbols.len(), returned = out.len(), "lookup_done");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchReason;
    use crate::query::guards::MAX_SEARCH_LIMIT;

    fn row(symbol: &str, name: &str, index: &str) -> EquityRow {
        EquityRow {
            symbol: symbol.to_string(),
            name: name.to_string(),
            index: index.to_string(),
            isin: None,
            sector: None,
        }
    }

    fn pool() -> Vec<EquityRow> {
        vec![
            row("RELIANCE", "Reliance Industries Ltd", "NIFTY50"),
            row("INFY", "Infosys Ltd", "NIFTY50"),
            row("HDFCBANK", "HDFC Bank Ltd", "NIFTY100"),
        ]
    }

    fn directory() -> (tempfile::TempDir, SymbolDirectory) {
        let dir = tempfile::tempdir().unwrap();
        let store = SymbolStore::open(dir.path().join("universe.db")).unwrap();
        (dir, SymbolDirectory::with_config(store, SearchConfig::default()))
    }

    #[test]
    fn pool_exact_symbol_hit() {
        let hits = search_pool(&pool(), "INFY", None, 10, 0.65);
        assert_eq!(hits[0].symbol, "INFY");
        assert_eq!(hits[0].reason, MatchReason::Exact);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[0].indices, vec!["NIFTY50"]);
    }

    #[test]
    fn pool_prefix_on_name() {
        let hits = search_pool(&pool(), "reli", None, 10, 0.65);
        assert_eq!(hits[0].symbol, "RELIANCE");
        assert!(hits[0].score >= 0.92);
    }

    #[test]
    fn pool_index_filter_excludes_other_indices() {
        let only_50 = vec!["nifty50 ".to_string()];
        assert!(search_pool(&pool(), "HDFC", Some(only_50.as_slice()), 10, 0.65).is_empty());
        let hits = search_pool(&pool(), "HDFC", None, 10, 0.65);
        assert_eq!(hits[0].symbol, "HDFCBANK");
    }

    #[test]
    fn pool_blank_query_and_zero_top_k() {
        assert!(search_pool(&pool(), "   ", None, 10, 0.0).is_empty());
        assert!(search_pool(&pool(), "INFY", None, 0, 0.0).is_empty());
    }

    #[test]
    fn pool_bounds_top_k_and_min_score() {
        let rows: Vec<EquityRow> = (0..150)
            .map(|i| row(&format!("AA{i:03}"), "", "NIFTY500"))
            .collect();
        let hits = search_pool(&rows, "AA", None, 500, 0.65);
        assert_eq!(hits.len(), MAX_SEARCH_LIMIT as usize);

        let exact = search_pool(&pool(), "INFY", None, 10, 1.5);
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].reason, MatchReason::Exact);
    }

    #[test]
    fn pool_duplicate_symbols_yield_one_hit_per_row() {
        let mut rows = pool();
        rows.push(row("INFY", "Infosys Ltd", "NIFTY100"));
        let hits = search_pool(&rows, "INFY", None, 10, 0.65);
        let infy: Vec<&SymbolHit> = hits.iter().filter(|h| h.symbol == "INFY").collect();
        assert_eq!(infy.len(), 2);
    }

    #[test]
    fn rank_symbols_orders_exact_first() {
        let hits = rank_symbols(&["RELIANCE", "REL"], "rel", 0.65, 10);
        assert_eq!(hits[0].symbol, "REL");
        assert_eq!(hits[0].reason, MatchReason::Exact);
        assert_eq!(hits[1].reason, MatchReason::Prefix);
    }

    #[test]
    fn render_rounds_scores() {
        let hits = vec![SymbolHit {
            symbol: "INFY".to_string(),
            name: "Infosys Ltd".to_string(),
            indices: vec![],
            score: 0.123_456,
            reason: MatchReason::Fuzzy,
        }];
        let text = render_results(&hits).unwrap();
        assert!(text.contains("\"score\": 0.123"));
        assert!(text.contains("\"reason\": \"fuzzy\""));
    }

    #[test]
    fn directory_search_enriches_hits() {
        let (_dir, directory) = directory();
        let store = directory.store();
        store.upsert(["RELIANCE", "INFY", "HDFCBANK"]).unwrap();
        store
            .upsert_names([("RELIANCE", "Reliance Industries Ltd"), ("INFY", "Infosys Ltd")], None)
            .unwrap();
        store.upsert_membership(["RELIANCE", "INFY"], "NIFTY50").unwrap();
        store.upsert_membership(["HDFCBANK"], "NIFTY100").unwrap();
        store.upsert_membership(["RELIANCE"], "NIFTY100").unwrap();

        let hits = directory.search("reliance", None, None, None).unwrap();
        assert_eq!(hits[0].symbol, "RELIANCE");
        assert_eq!(hits[0].reason, MatchReason::Exact);
        assert_eq!(hits[0].name, "Reliance Industries Ltd");
        assert_eq!(hits[0].indices, vec!["NIFTY100", "NIFTY50"]);

        let hdfc = directory.search("HDFC", None, None, None).unwrap();
        assert_eq!(hdfc[0].symbol, "HDFCBANK");
        assert_eq!(hdfc[0].name, "");

        let filtered = directory
            .search("HDFC", Some(&["NIFTY50".to_string()][..]), None, None)
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn directory_lookup_round_trip() {
        let (_dir, directory) = directory();
        let store = directory.store();
        store.upsert(["RELIANCE", "INFY"]).unwrap();
        store.upsert_membership(["RELIANCE"], "NIFTY50").unwrap();

        let hits = directory.lookup("RELI").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "RELIANCE");
        assert_eq!(hits[0].reason, MatchReason::Prefix);
        assert_eq!(hits[0].indices, vec!["NIFTY50"]);
    }
}
