//! Minimal HTML table reader for exchange downloads that are served as an
//! HTML page under a `.csv` name.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{EquityError, EquityResult};
use crate::extract::tabular::Table;

static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table>").unwrap());
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap());
static TH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<th\b[^>]*>(.*?)</th>").unwrap());
static TD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<.*?>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// True when the text contains a complete `<table>` block.
pub fn is_html(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("<table") && lower.contains("</table>")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn cells(row: &str, re: &Regex) -> Vec<String> {
    re.captures_iter(row)
        .map(|cap| {
            let inner = TAG_RE.replace_all(&cap[1], "");
            let decoded = decode_entities(&inner);
            WS_RE.replace_all(&decoded, " ").trim().to_string()
        })
        .collect()
}

/// Parse the first `<table>` in `text`.
///
/// The header comes from the first row's `<th>` cells, falling back to its
/// `<td>` cells. Later rows without `<td>` cells are ignored; the rest are
/// padded or truncated to the header width.
pub fn parse_html_table(text: &str) -> EquityResult<Table> {
    let table = TABLE_RE
        .captures(text)
        .map(|cap| cap[1].to_string())
        .ok_or_else(|| EquityError::Parse("No table found".to_string()))?;
    let rows: Vec<&str> = ROW_RE
        .captures_iter(&table)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect();
    let Some((first, rest)) = rows.split_first() else {
        return Err(EquityError::Parse("No rows in table".to_string()));
    };

    let mut header = cells(first, &TH_RE);
    if header.is_empty() {
        header = cells(first, &TD_RE);
    }
    if header.is_empty() {
        return Err(EquityError::Parse("HTML table has no header".to_string()));
    }

    let width = header.len();
    let data: Vec<Vec<String>> = rest
        .iter()
        .map(|row| cells(row, &TD_RE))
        .filter(|tds| !tds.is_empty())
        .map(|mut tds| {
            tds.resize(width, String::new());
            tds
        })
        .collect();
    Ok(Table::from_cells(header, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<table class="data">
  <thead><tr><th>SYMBOL</th><th>OPEN</th></tr></thead>
  <tbody>
    <tr><td><a href="/q/INFY">INFY</a></td><td>1</td></tr>
    <tr><td>M&amp;M</td></tr>
    <tr><td>ITC</td><td>2</td><td>extra</td></tr>
    <tr></tr>
  </tbody>
</table>
</body></html>
"#;

    #[test]
    fn detects_tables() {
        assert!(is_html(PAGE));
        assert!(!is_html("SYMBOL,OPEN\nTCS,1"));
        assert!(!is_html("<TABLE> never closed"));
    }

    #[test]
    fn parses_header_and_fits_rows() {
        let table = parse_html_table(PAGE).unwrap();
        assert_eq!(table.headers, vec!["SYMBOL", "OPEN"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["INFY".to_string(), "1".to_string()],
                vec!["M&M".to_string(), String::new()],
                vec!["ITC".to_string(), "2".to_string()],
            ]
        );
    }

    #[test]
    fn td_header_fallback() {
        let html = "<table><tr><td>Symbol</td></tr><tr><td>TCS</td></tr></table>";
        let table = parse_html_table(html).unwrap();
        assert_eq!(table.headers, vec!["Symbol"]);
        assert_eq!(table.rows, vec![vec!["TCS".to_string()]]);
    }

    #[test]
    fn table_without_rows_is_an_error() {
        let err = parse_html_table("<table></table>").unwrap_err();
        assert_eq!(err.to_string(), "Parse error: No rows in table");
    }
}
