//! Ingestion: raw sources into the symbol store.

use std::path::Path;

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::errors::EquityResult;
use crate::extract::extract_symbols;
use crate::extract::names::{extract_name_pairs, NameOptions};
use crate::models::{EquityRow, IngestReport, IngestStatus, MembershipUpsert, NameUpsert};
use crate::store::database::SymbolStore;

/// Source tag recorded for names taken from a broker instrument master.
pub const INSTRUMENT_MASTER_SOURCE: &str = "dhan-csv:INSTRUMENT=EQUITY";
/// Source tag recorded for names taken from index constituent files.
pub const CONSTITUENTS_SOURCE: &str = "index-csv";

/// Extract tickers from `text`, add them to the store, and optionally record
/// them as members of `index_label`.
///
/// A source that parses but yields no valid ticker is not an error: the run
/// is logged and reported with [`IngestStatus::Empty`] and nothing is
/// written.
pub fn ingest_symbols(
    store: &SymbolStore,
    text: &str,
    index_label: Option<&str>,
) -> EquityResult<IngestReport> {
    let symbols = extract_symbols(text)?;
    let before = store.count()?;
    let index = index_label
        .map(|l| l.trim().to_uppercase())
        .filter(|l| !l.is_empty());

    if symbols.is_empty() {
        warn!(index = ?index, "no_valid_symbols_parsed");
        return Ok(IngestReport {
            status: IngestStatus::Empty,
            found: 0,
            before,
            inserted: 0,
            total: before,
            index,
            membership_inserted: 0,
            membership_total: 0,
        });
    }

    let total = store.upsert(&symbols)?;
    let membership = match &index {
        Some(label) => store.upsert_membership(&symbols, label)?,
        None => MembershipUpsert::default(),
    };

    let report = IngestReport {
        status: IngestStatus::Ok,
        found: symbols.len(),
        before,
        inserted: total.saturating_sub(before),
        total,
        index,
        membership_inserted: membership.inserted,
        membership_total: membership.total_for_index,
    };
    info!(
        found = report.found,
        before = report.before,
        inserted = report.inserted,
        total = report.total,
        index = ?report.index,
        "ingest_complete"
    );
    Ok(report)
}

pub fn ingest_symbols_from_path(
    store: &SymbolStore,
    path: &Path,
    index_label: Option<&str>,
) -> EquityResult<IngestReport> {
    let bytes = std::fs::read(path)?;
    ingest_symbols(store, &String::from_utf8_lossy(&bytes), index_label)
}

/// Parse an instrument master and upsert its symbol → name pairs.
pub fn ingest_names(
    store: &SymbolStore,
    text: &str,
    opts: &NameOptions,
    source: Option<&str>,
) -> EquityResult<NameUpsert> {
    let pairs = extract_name_pairs(text, opts)?;
    if pairs.is_empty() {
        warn!("no_name_pairs_parsed");
    }
    store.upsert_names(&pairs, Some(source.unwrap_or(INSTRUMENT_MASTER_SOURCE)))
}

/// Outcome of [`ingest_rows`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowsIngest {
    pub total: usize,
    pub names: NameUpsert,
    pub memberships: IndexMap<String, MembershipUpsert>,
}

/// Persist loaded constituent rows: symbols, names, and one membership
/// batch per index label (rows labelled `UNKNOWN` included).
pub fn ingest_rows(store: &SymbolStore, rows: &[EquityRow]) -> EquityResult<RowsIngest> {
    let total = store.upsert(rows.iter().map(|r| r.symbol.as_str()))?;
    let names = store.upsert_names(
        rows.iter().map(|r| (r.symbol.as_str(), r.name.as_str())),
        Some(CONSTITUENTS_SOURCE),
    )?;

    let mut by_index: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for row in rows {
        by_index.entry(row.index.as_str()).or_default().push(row.symbol.as_str());
    }
    let mut memberships = IndexMap::new();
    for (label, symbols) in by_index {
        memberships.insert(label.to_string(), store.upsert_membership(symbols, label)?);
    }
    Ok(RowsIngest {
        total,
        names,
        memberships,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::loader::load_rows;

    fn temp_store() -> (tempfile::TempDir, SymbolStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SymbolStore::open(dir.path().join("universe.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn ingest_reports_counts_and_membership() {
        let (_dir, store) = temp_store();
        let first = ingest_symbols(&store, "SYMBOL,OPEN\nTCS,1\nINFY,2\n", Some("nifty50")).unwrap();
        assert!(first.is_success());
        assert_eq!((first.found, first.before, first.inserted, first.total), (2, 0, 2, 2));
        assert_eq!(first.index.as_deref(), Some("NIFTY50"));
        assert_eq!((first.membership_inserted, first.membership_total), (2, 2));

        let second = ingest_symbols(&store, "SYMBOL,OPEN\nTCS,1\nITC,2\n", None).unwrap();
        assert_eq!((second.found, second.before, second.inserted, second.total), (2, 2, 1, 3));
        assert_eq!(second.membership_total, 0);
    }

    #[test]
    fn empty_source_is_non_fatal() {
        let (_dir, store) = temp_store();
        store.upsert(["TCS"]).unwrap();
        let report = ingest_symbols(&store, "SYMBOL,OPEN\nNIFTY 50,1\n", Some("NIFTY50")).unwrap();
        assert_eq!(report.status, IngestStatus::Empty);
        assert!(!report.is_success());
        assert_eq!(report.total, 1);
        assert_eq!(store.fetch_all().unwrap(), vec!["TCS"]);
    }

    #[test]
    fn ingests_from_a_file() {
        let (dir, store) = temp_store();
        let path = dir.path().join("nifty50.csv");
        std::fs::write(&path, "SYMBOL,OPEN\nINFY,1\n").unwrap();
        let report = ingest_symbols_from_path(&store, &path, Some("NIFTY50")).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(store.fetch_indices_for_symbol("INFY").unwrap(), vec!["NIFTY50"]);
    }

    #[test]
    fn missing_header_still_fails() {
        let (_dir, store) = temp_store();
        assert!(ingest_symbols(&store, "NAME\nTCS\n", None).is_err());
    }

    #[test]
    fn names_from_instrument_master() {
        let (_dir, store) = temp_store();
        let text = "SEM_INSTRUMENT_NAME,SEM_TRADING_SYMBOL,SM_SYMBOL_NAME\nEQUITY,INFY-EQ,Infosys Limited\n";
        let res = ingest_names(&store, text, &NameOptions::default(), None).unwrap();
        assert_eq!(res.inserted, 1);
        let stored = store.fetch_name("INFY").unwrap().unwrap();
        assert_eq!(stored.source.as_deref(), Some(INSTRUMENT_MASTER_SOURCE));
    }

    #[test]
    fn rows_are_persisted_per_index() {
        let (_dir, store) = temp_store();
        let rows = load_rows(
            "SYMBOL,NAME,INDEX\nRELIANCE,Reliance Industries Ltd,NIFTY50\nHDFCBANK,HDFC Bank Ltd,NIFTY100\nRELIANCE,Reliance Industries Ltd,NIFTY100\n",
            None,
        )
        .unwrap();
        let res = ingest_rows(&store, &rows).unwrap();
        assert_eq!(res.total, 2);
        assert_eq!(res.names.inserted, 2);
        assert_eq!(res.memberships["NIFTY100"].total_for_index, 2);
        assert_eq!(store.fetch_indices_for_symbol("RELIANCE").unwrap(), vec!["NIFTY100", "NIFTY50"]);
    }
}
