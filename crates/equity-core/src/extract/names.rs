//! Symbol → company-name pairs from broker instrument masters.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::errors::{EquityError, EquityResult};
use crate::extract::resolve_column_index;
use crate::extract::tabular::{parse_table, Table};

pub const INSTRUMENT_COLUMNS: &[&str] = &["SEM_INSTRUMENT_NAME", "INSTRUMENT", "INSTRUMENT_TYPE"];
pub const DISPLAY_COLUMNS: &[&str] = &[
    "DISPLAY_NAME",
    "TRADING_SYMBOL",
    "TRADING_SYMBOL_NAME",
    "SEM_TRADING_SYMBOL",
    "SEM_CUSTOM_SYMBOL",
    "SYMBOL",
    "SCRIP_SYMBOL",
];
pub const NAME_COLUMNS: &[&str] = &[
    "SYMBOL_NAME",
    "SECURITY_NAME",
    "COMPANY_NAME",
    "NAME",
    "SM_SYMBOL_NAME",
];
pub const SERIES_COLUMNS: &[&str] = &["SERIES", "SEM_SERIES"];
pub const EQUITY_SERIES: &[&str] = &["EQ", "BE", "BZ"];
const SERIES_SUFFIXES: &[&str] = &["-EQ", "-BE", "-BZ"];
const EQUITY_INSTRUMENT: &str = "EQUITY";

#[derive(Clone, Debug, Default)]
pub struct NameOptions {
    /// Proceed without the instrument filter when it cannot be applied.
    pub force: bool,
}

/// `Trading Symbol` -> `TRADING_SYMBOL`.
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_uppercase().replace(' ', "_")
}

/// Upper-case and drop a trailing series suffix (`INFY-EQ` -> `INFY`).
pub fn strip_series_suffix(raw: &str) -> String {
    let s = raw.trim().to_uppercase();
    for suffix in SERIES_SUFFIXES {
        if let Some(stripped) = s.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    s
}

fn equity_rows<'a>(table: &'a Table, opts: &NameOptions) -> EquityResult<Vec<&'a Vec<String>>> {
    let Some(col) = resolve_column_index(&table.headers, INSTRUMENT_COLUMNS) else {
        if opts.force {
            warn!("instrument_column_missing_unfiltered");
            return Ok(table.rows.iter().collect());
        }
        return Err(EquityError::MissingColumn(format!(
            "No instrument column; expected one of {INSTRUMENT_COLUMNS:?}"
        )));
    };
    debug!(column = %table.headers[col], "instrument_column");
    let rows: Vec<&Vec<String>> = table
        .rows
        .iter()
        .filter(|r| r[col].trim().eq_ignore_ascii_case(EQUITY_INSTRUMENT))
        .collect();
    if rows.is_empty() && !opts.force {
        return Err(EquityError::Parse(format!(
            "No rows with {}='{EQUITY_INSTRUMENT}'",
            table.headers[col]
        )));
    }
    Ok(rows)
}

/// Extract (symbol, name) pairs from a parsed instrument master, keeping the
/// first name seen for each symbol.
pub fn name_pairs_from_table(
    table: &Table,
    opts: &NameOptions,
) -> EquityResult<IndexMap<String, String>> {
    let mut table = table.clone();
    table.headers = table.headers.iter().map(|h| normalize_header(h)).collect();

    let rows = equity_rows(&table, opts)?;
    let disp = resolve_column_index(&table.headers, DISPLAY_COLUMNS);
    let name = resolve_column_index(&table.headers, NAME_COLUMNS);
    let (Some(disp), Some(name)) = (disp, name) else {
        return Err(EquityError::MissingColumn(format!(
            "Could not find display/name columns. Present: {:?}",
            table.headers.iter().take(15).collect::<Vec<_>>()
        )));
    };
    let series = resolve_column_index(&table.headers, SERIES_COLUMNS);

    let total = rows.len();
    let mut pairs = IndexMap::new();
    for row in rows {
        if let Some(col) = series {
            let value = row[col].trim().to_uppercase();
            if !EQUITY_SERIES.contains(&value.as_str()) {
                continue;
            }
        }
        let symbol = strip_series_suffix(&row[disp]);
        let company = row[name].trim();
        if symbol.is_empty() || company.is_empty() {
            continue;
        }
        pairs.entry(symbol).or_insert_with(|| company.to_string());
    }
    info!(equity_rows = total, pairs = pairs.len(), "name_pairs_extracted");
    Ok(pairs)
}

/// Parse instrument-master text and extract name pairs.
pub fn extract_name_pairs(text: &str, opts: &NameOptions) -> EquityResult<IndexMap<String, String>> {
    let table = parse_table(text)?;
    name_pairs_from_table(&table, opts)
}
