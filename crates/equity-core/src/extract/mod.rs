//! Symbol extraction: raw tabular or HTML text to a canonical ticker set.

pub mod html;
pub mod loader;
pub mod names;
pub mod tabular;

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::errors::{EquityError, EquityResult};
use crate::models::SymbolSet;
use tabular::Table;

/// Header prefix identifying the ticker column.
pub const SYMBOL_HEADER: &str = "SYMBOL";

static TICKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z0-9&.\-]+$").unwrap());

/// Trim and upper-case a raw field value.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// True when `value` matches the ticker grammar `[A-Z0-9&.-]+`.
pub fn is_ticker(value: &str) -> bool {
    TICKER_RE.is_match(value)
}

/// Normalize `raw` and keep it only if it is a ticker and not the header
/// token itself. Index summary rows such as `NIFTY 50` fail the grammar.
pub fn canonical_symbol(raw: &str) -> Option<String> {
    let value = normalize_symbol(raw);
    if value == SYMBOL_HEADER || !is_ticker(&value) {
        return None;
    }
    Some(value)
}

/// Return the first header equal (case-insensitively, ignoring surrounding
/// whitespace) to one of `candidates`, trying candidates in order.
pub fn resolve_column<H, C>(headers: &[H], candidates: &[C]) -> Option<String>
where
    H: AsRef<str>,
    C: AsRef<str>,
{
    resolve_column_index(headers, candidates).map(|i| headers[i].as_ref().to_string())
}

/// Position variant of [`resolve_column`].
pub fn resolve_column_index<H, C>(headers: &[H], candidates: &[C]) -> Option<usize>
where
    H: AsRef<str>,
    C: AsRef<str>,
{
    candidates.iter().find_map(|cand| {
        let wanted = cand.as_ref().trim().to_uppercase();
        headers
            .iter()
            .position(|h| h.as_ref().trim().to_uppercase() == wanted)
    })
}

/// Index of the first column whose header starts with `SYMBOL`.
pub fn find_symbol_column<H: AsRef<str>>(headers: &[H]) -> EquityResult<usize> {
    headers
        .iter()
        .position(|h| h.as_ref().trim().to_uppercase().starts_with(SYMBOL_HEADER))
        .ok_or_else(EquityError::missing_symbol_column)
}

/// Parse `text` as an HTML table when it contains one, else as delimited text.
pub fn read_table(text: &str) -> EquityResult<Table> {
    if html::is_html(text) {
        debug!("source_detected_html");
        html::parse_html_table(text)
    } else {
        tabular::parse_table(text)
    }
}

/// Canonical tickers from the `SYMBOL*` column of a table, in first-seen
/// order.
pub fn symbols_from_table(table: &Table) -> EquityResult<SymbolSet> {
    let col = find_symbol_column(&table.headers)?;
    let mut rejected = 0usize;
    let mut out = SymbolSet::new();
    for raw in table.column(col) {
        match canonical_symbol(raw) {
            Some(sym) => {
                out.insert(sym);
            }
            None => rejected += 1,
        }
    }
    debug!(
        column = %table.headers[col],
        kept = out.len(),
        rejected,
        "symbol_column_filtered"
    );
    Ok(out)
}

/// Extract the canonical ticker set from raw source text.
///
/// A missing `SYMBOL*` column fails with [`EquityError::MissingColumn`];
/// malformed rows are skipped.
pub fn extract_symbols(text: &str) -> EquityResult<SymbolSet> {
    let table = read_table(text)?;
    let symbols = symbols_from_table(&table)?;
    info!(
        symbols = symbols.len(),
        rows = table.rows.len(),
        skipped = table.skipped,
        "symbols_extracted"
    );
    Ok(symbols)
}

/// Read a file (lossily decoded as UTF-8) and extract its tickers.
pub fn extract_symbols_from_path(path: &Path) -> EquityResult<SymbolSet> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    debug!(path = %path.display(), bytes = bytes.len(), "source_read");
    extract_symbols(&text)
}
