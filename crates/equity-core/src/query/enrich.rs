//! Enrichment join: decorate ranked candidates with names and index labels.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::errors::EquityResult;
use crate::models::{Candidate, EquityRow, SymbolHit};

/// Lookup side of the enrichment join. Keys of the returned maps are the
/// upper-cased symbols; missing symbols are simply absent.
pub trait EnrichmentSource {
    fn names_for(&self, symbols: &[String]) -> EquityResult<HashMap<String, String>>;
    fn indices_for(&self, symbols: &[String]) -> EquityResult<HashMap<String, Vec<String>>>;
}

/// Attach display names and memberships without touching score, reason, or
/// order. Unknown symbols get an empty name and an empty index list.
pub fn enrich<S: EnrichmentSource + ?Sized>(
    source: &S,
    ranked: Vec<Candidate>,
) -> EquityResult<Vec<SymbolHit>> {
    let symbols: Vec<String> = ranked.iter().map(|c| c.symbol.clone()).collect();
    let names = source.names_for(&symbols)?;
    let indices = source.indices_for(&symbols)?;
    debug!(
        hits = symbols.len(),
        names_found = names.len(),
        with_indices = indices.len(),
        "enrichment_join"
    );

    Ok(ranked
        .into_iter()
        .map(|c| {
            let key = c.symbol.to_uppercase();
            let name = names
                .get(&key)
                .cloned()
                .or(c.name)
                .unwrap_or_default();
            let index_list = indices.get(&key).cloned().unwrap_or_default();
            SymbolHit {
                symbol: c.symbol,
                name,
                indices: index_list,
                score: c.score,
                reason: c.reason,
            }
        })
        .collect())
}

/// Distinct, alphabetically sorted labels.
pub fn sorted_labels<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    labels
        .into_iter()
        .map(Into::into)
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

/// In-memory pools enrich from their own rows.
impl EnrichmentSource for [EquityRow] {
    fn names_for(&self, symbols: &[String]) -> EquityResult<HashMap<String, String>> {
        let wanted: BTreeSet<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        let mut out = HashMap::new();
        for row in self {
            let key = row.symbol.to_uppercase();
            if wanted.contains(&key) && !row.name.is_empty() {
                out.entry(key).or_insert_with(|| row.name.clone());
            }
        }
        Ok(out)
    }

    fn indices_for(&self, symbols: &[String]) -> EquityResult<HashMap<String, Vec<String>>> {
        let wanted: BTreeSet<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        let mut grouped: HashMap<String, BTreeSet<String>> = HashMap::new();
        for row in self {
            let key = row.symbol.to_uppercase();
            if wanted.contains(&key) {
                grouped.entry(key).or_default().insert(row.index.clone());
            }
        }
        Ok(grouped
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchReason;

    fn row(symbol: &str, name: &str, index: &str) -> EquityRow {
        EquityRow {
            symbol: symbol.to_string(),
            name: name.to_string(),
            index: index.to_string(),
            isin: None,
            sector: None,
        }
    }

    fn cand(symbol: &str, score: f64) -> Candidate {
        Candidate {
            symbol: symbol.to_string(),
            name: None,
            index: None,
            reason: MatchReason::Fuzzy,
            score,
        }
    }

    #[test]
    fn attaches_sorted_distinct_indices_and_names() {
        let pool = vec![
            row("RELIANCE", "Reliance Industries Ltd", "NIFTY100"),
            row("RELIANCE", "Reliance Industries Ltd", "NIFTY50"),
            row("RELIANCE", "Reliance Industries Ltd", "NIFTY50"),
        ];
        let hits = enrich(pool.as_slice(), vec![cand("reliance", 0.9)]).unwrap();
        assert_eq!(hits[0].name, "Reliance Industries Ltd");
        assert_eq!(hits[0].indices, vec!["NIFTY100", "NIFTY50"]);
        assert_eq!(hits[0].symbol, "reliance");
    }

    #[test]
    fn misses_degrade_to_empty_values_and_order_is_kept() {
        let pool = vec![row("INFY", "Infosys Ltd", "NIFTY50")];
        let hits = enrich(pool.as_slice(), vec![cand("TCS", 0.8), cand("INFY", 0.7)]).unwrap();
        assert_eq!(hits[0].symbol, "TCS");
        assert_eq!(hits[0].name, "");
        assert!(hits[0].indices.is_empty());
        assert_eq!(hits[0].score, 0.8);
        assert_eq!(hits[1].symbol, "INFY");
    }

    #[test]
    fn sorted_labels_dedups() {
        assert_eq!(sorted_labels(["B", "A", "B"]), vec!["A", "B"]);
    }
}
