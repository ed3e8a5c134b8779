//! Delimited-text parsing with a fallback chain of parser configurations.
//!
//! Exchange downloads are frequently malformed: BOMs, stray quotes, NULs,
//! and headers split over two physical lines. Each strategy below is tried in
//! turn until one accepts the text; the last always does. Individual bad
//! records are skipped.

use tracing::debug;

use crate::errors::{EquityError, EquityResult};

pub const DELIMITER: char = ',';

/// Header plus data rows, every row padded to the header width.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Records dropped as malformed while parsing.
    pub skipped: usize,
}

impl Table {
    /// Build a table from raw cells, trimming headers and fitting each row to
    /// the header width. Rows with non-empty overflow cells are skipped.
    pub fn from_cells(headers: Vec<String>, raw_rows: Vec<Vec<String>>) -> Self {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let width = headers.len();
        let mut rows = Vec::with_capacity(raw_rows.len());
        let mut skipped = 0;
        for mut row in raw_rows {
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            if row.len() > width {
                if row[width..].iter().any(|c| !c.trim().is_empty()) {
                    skipped += 1;
                    continue;
                }
                row.truncate(width);
            }
            row.resize(width, String::new());
            rows.push(row);
        }
        Self {
            headers,
            rows,
            skipped,
        }
    }

    /// Values of column `idx`, in row order.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .filter_map(move |row| row.get(idx).map(String::as_str))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// RFC 4180 quoting with doubled-quote escapes.
    Standard,
    /// Double-quote quoting without doubled-quote escapes; a backslash
    /// escapes the next character inside a quoted field.
    AlternateQuote,
    /// No quoting; a backslash escapes the delimiter.
    EscapedDelimiter,
    /// Stray quotes at line ends removed, then parsed without quoting and
    /// with surrounding quotes peeled off each cell. Never rejected.
    Sanitized,
}

pub const STRATEGIES: &[Strategy] = &[
    Strategy::Standard,
    Strategy::AlternateQuote,
    Strategy::EscapedDelimiter,
    Strategy::Sanitized,
];

const QUOTE: char = '"';
const ESCAPE: char = '\\';

type Records = (Vec<Vec<String>>, usize);

/// Strip NULs and a leading BOM, and normalise line endings to `\n`.
pub fn sanitize_text(text: &str) -> String {
    text.trim_start_matches('\u{feff}')
        .replace('\0', "")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

/// Merge a header split across two lines, e.g. `"SYMBOL \n,OPEN \n"` becomes
/// `"SYMBOL ,OPEN "`. Only the first non-blank line and its successor are
/// considered, and only when the successor starts with the delimiter.
pub fn merge_split_header(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let Some(first) = lines.iter().position(|ln| !ln.trim().is_empty()) else {
        return text.to_string();
    };
    if first + 1 >= lines.len() || !lines[first + 1].trim_start().starts_with(DELIMITER) {
        return text.to_string();
    }
    let merged = format!("{}{}", lines[first], lines[first + 1]);
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() - 1);
    out.extend_from_slice(&lines[..first]);
    out.push(&merged);
    out.extend_from_slice(&lines[first + 2..]);
    out.join("\n")
}

/// Whether the text ends inside a quoted field. Quotes only open a field at
/// its first character, matching the csv reader.
fn ends_inside_quotes(text: &str, doubled: bool, escape: Option<char>) -> bool {
    let mut in_quotes = false;
    let mut field_start = true;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if Some(c) == escape {
                chars.next();
            } else if c == QUOTE {
                if doubled && chars.peek() == Some(&QUOTE) {
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            continue;
        }
        match c {
            QUOTE if field_start => {
                in_quotes = true;
                field_start = false;
            }
            c if c == DELIMITER || c == '\n' => field_start = true,
            _ => field_start = false,
        }
    }
    in_quotes
}

fn is_blank(record: &[String]) -> bool {
    record.iter().all(|c| c.trim().is_empty())
}

fn header_width(records: &[Vec<String>]) -> usize {
    records
        .iter()
        .find(|r| !is_blank(r))
        .map(Vec::len)
        .unwrap_or(0)
}

fn read_csv(text: &str, strategy: Strategy) -> Records {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(DELIMITER as u8);
    match strategy {
        Strategy::Standard => {
            builder.quoting(true).quote(QUOTE as u8).double_quote(true);
        }
        Strategy::AlternateQuote => {
            builder
                .quoting(true)
                .quote(QUOTE as u8)
                .double_quote(false)
                .escape(Some(ESCAPE as u8));
        }
        Strategy::EscapedDelimiter | Strategy::Sanitized => {
            builder.quoting(false);
        }
    }
    let mut reader = builder.from_reader(text.as_bytes());

    let mut records: Vec<Vec<String>> = Vec::new();
    let mut skipped = 0;
    for result in reader.records() {
        match result {
            Ok(record) => records.push(record.iter().map(str::to_string).collect()),
            Err(_) => skipped += 1,
        }
    }
    (records, skipped)
}

/// Quoted strategies: rejected when the text ends inside a quoted field, or
/// when a multi-line field leaves its record a different width from the
/// header (a runaway quote that happened to close).
fn read_quoted(text: &str, strategy: Strategy) -> Option<Records> {
    let (doubled, escape) = match strategy {
        Strategy::AlternateQuote => (false, Some(ESCAPE)),
        _ => (true, None),
    };
    if ends_inside_quotes(text, doubled, escape) {
        return None;
    }
    let (records, skipped) = read_csv(text, strategy);
    let width = header_width(&records);
    let runaway = records
        .iter()
        .any(|r| r.len() != width && r.iter().any(|c| c.contains('\n')));
    (!runaway).then_some((records, skipped))
}

/// Split one line on unescaped delimiters, unescaping `\,` and `\\`.
fn split_escaped(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(next) => current.push(next),
                None => current.push(ESCAPE),
            },
            c if c == DELIMITER => cells.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    cells.push(current);
    cells
}

/// Rejected when a record overflows the header with non-empty cells or a
/// cell is still framed by a quote.
fn read_escaped(text: &str) -> Option<Records> {
    let records: Vec<Vec<String>> = text
        .lines()
        .filter(|ln| !ln.trim().is_empty())
        .map(split_escaped)
        .collect();
    let width = header_width(&records);
    let ragged = records
        .iter()
        .any(|r| r.len() > width && !is_blank(&r[width..]));
    let quoted = records.iter().flatten().any(|c| {
        let c = c.trim();
        c.starts_with(QUOTE) || c.ends_with(QUOTE)
    });
    (!ragged && !quoted).then_some((records, 0))
}

fn strip_stray_quotes(text: &str) -> String {
    text.replace("\"\n", "\n").replace("\",\n", ",\n")
}

fn read_sanitized(text: &str) -> Records {
    let (records, skipped) = read_csv(&strip_stray_quotes(text), Strategy::Sanitized);
    let records: Vec<Vec<String>> = records
        .into_iter()
        .map(|r| r.into_iter().map(|c| c.trim_matches(QUOTE).to_string()).collect())
        .collect();
    (records, skipped)
}

fn attempt(text: &str, strategy: Strategy) -> Option<Records> {
    match strategy {
        Strategy::Standard | Strategy::AlternateQuote => read_quoted(text, strategy),
        Strategy::EscapedDelimiter => read_escaped(text),
        Strategy::Sanitized => Some(read_sanitized(text)),
    }
}

fn into_table(records: Vec<Vec<String>>, parse_skipped: usize) -> Option<Table> {
    let mut iter = records.into_iter().skip_while(|r| is_blank(r));
    let headers = iter.next()?;
    let mut table = Table::from_cells(headers, iter.collect());
    table.skipped += parse_skipped;
    Some(table)
}

/// Parse delimited text into a [`Table`], walking the strategy chain.
///
/// Fails only when no strategy yields a header row.
pub fn parse_table(text: &str) -> EquityResult<Table> {
    parse_table_with_strategy(text).map(|(_, table)| table)
}

/// [`parse_table`], also reporting which strategy produced the table.
pub fn parse_table_with_strategy(text: &str) -> EquityResult<(Strategy, Table)> {
    let fixed = merge_split_header(&sanitize_text(text));
    if fixed.trim().is_empty() {
        return Err(EquityError::Parse("source is empty".to_string()));
    }

    for strategy in STRATEGIES {
        let Some((records, skipped)) = attempt(&fixed, *strategy) else {
            debug!(?strategy, "tabular_strategy_rejected");
            continue;
        };
        if let Some(table) = into_table(records, skipped) {
            debug!(
                ?strategy,
                columns = table.headers.len(),
                rows = table.rows.len(),
                skipped = table.skipped,
                "tabular_parsed"
            );
            return Ok((*strategy, table));
        }
    }
    Err(EquityError::Parse("no header row found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_split_header() {
        let text = "SYMBOL \n,OPEN \n\nTCS,1\n";
        assert_eq!(merge_split_header(text), "SYMBOL ,OPEN \n\nTCS,1");
    }

    #[test]
    fn leaves_regular_header_alone() {
        let text = "SYMBOL,OPEN\nTCS,1";
        assert_eq!(merge_split_header(text), text);
    }

    #[test]
    fn merge_skips_leading_blank_lines() {
        let text = "\n\nSYMBOL\n ,OPEN\nTCS,1";
        assert_eq!(merge_split_header(text), "\n\nSYMBOL ,OPEN\nTCS,1");
    }

    #[test]
    fn sanitize_strips_bom_nul_and_carriage_returns() {
        assert_eq!(sanitize_text("\u{feff}A,B\r\n1,\02\r3,4"), "A,B\n1,2\n3,4");
    }

    #[test]
    fn parse_pads_short_rows_and_trims_headers() {
        let table = parse_table(" SYMBOL , OPEN \nTCS\nINFY,2\n").unwrap();
        assert_eq!(table.headers, vec!["SYMBOL", "OPEN"]);
        assert_eq!(table.rows, vec![vec!["TCS", ""], vec!["INFY", "2"]]);
    }

    #[test]
    fn parse_skips_rows_with_extra_fields() {
        let table = parse_table("SYMBOL,OPEN\nTCS,1,surprise\nINFY,2,\n").unwrap();
        assert_eq!(table.rows, vec![vec!["INFY", "2"]]);
        assert_eq!(table.skipped, 1);
    }

    #[test]
    fn runaway_quote_falls_through_to_later_strategy() {
        let text = "SYMBOL,OPEN\n\"TCS,1\nINFY,2\nITC,3\n";
        let (strategy, table) = parse_table_with_strategy(text).unwrap();
        assert_eq!(strategy, Strategy::Sanitized);
        let symbols: Vec<&str> = table.column(0).collect();
        assert_eq!(symbols, vec!["TCS", "INFY", "ITC"]);
    }

    #[test]
    fn quoted_multiline_cell_stays_standard() {
        let text = "\"SYMBOL\",\"NAME\"\n\"TCS\",\"Tata\nConsultancy\"\n\"INFY\",\"Infosys\"\n";
        let (strategy, table) = parse_table_with_strategy(text).unwrap();
        assert_eq!(strategy, Strategy::Standard);
        assert_eq!(table.headers, vec!["SYMBOL", "NAME"]);
        assert_eq!(
            table.rows,
            vec![vec!["TCS", "Tata\nConsultancy"], vec!["INFY", "Infosys"]]
        );
    }

    #[test]
    fn backslash_escaped_quote_uses_alternate_quoting() {
        let text = "SYMBOL,NAME\nTCS,\"Tata Sons \\\"\"\nINFY,Infosys\n";
        let (strategy, table) = parse_table_with_strategy(text).unwrap();
        assert_eq!(strategy, Strategy::AlternateQuote);
        assert_eq!(table.rows, vec![vec!["TCS", "Tata Sons \""], vec!["INFY", "Infosys"]]);
    }

    #[test]
    fn escaped_delimiter_strategy_handles_backslash_commas() {
        let text = "SYMBOL,NAME\nTCS,Tata\\,\"Sons\nINFY,Infosys\n";
        let (strategy, table) = parse_table_with_strategy(text).unwrap();
        assert_eq!(strategy, Strategy::EscapedDelimiter);
        assert_eq!(table.rows, vec![vec!["TCS", "Tata,\"Sons"], vec!["INFY", "Infosys"]]);
    }

    #[test]
    fn stray_quotes_reach_sanitized_strategy() {
        let text = "SYMBOL,OPEN\n\"TCS,1\n'INFY,2\nITC,3\"\n";
        let (strategy, table) = parse_table_with_strategy(text).unwrap();
        assert_eq!(strategy, Strategy::Sanitized);
        let symbols: Vec<&str> = table.column(0).collect();
        assert_eq!(symbols, vec!["TCS", "'INFY", "ITC"]);
        assert_eq!(table.rows[2], vec!["ITC", "3"]);
    }

    #[test]
    fn quote_balance_follows_field_starts() {
        assert!(!ends_inside_quotes("A,\"b\"\"c\"\n", true, None));
        assert!(ends_inside_quotes("A,\"b\"\"\n", true, None));
        assert!(!ends_inside_quotes("A,b\"c\n", true, None));
        assert!(!ends_inside_quotes("A,\"b\\\"\"\n", false, Some('\\')));
    }

    #[test]
    fn escaped_delimiter_split() {
        assert_eq!(split_escaped(r"A\,B,C"), vec!["A,B", "C"]);
    }

    #[test]
    fn empty_source_is_a_parse_error() {
        assert!(matches!(parse_table(" \n\n"), Err(EquityError::Parse(_))));
    }
}
