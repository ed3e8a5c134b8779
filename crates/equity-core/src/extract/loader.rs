//! Index constituent files to in-memory [`EquityRow`] pools.
//!
//! Columns are resolved once per file through a fixed synonym table. A file
//! without an index column takes its label from the caller, or from the file
//! stem when loaded as part of a directory.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{EquityError, EquityResult};
use crate::extract::resolve_column_index;
use crate::extract::tabular::Table;
use crate::models::{EquityRow, UNKNOWN_INDEX};

pub const SYMBOL_SYNONYMS: &[&str] = &["SYMBOL"];
pub const NAME_SYNONYMS: &[&str] = &["NAME", "COMPANY NAME"];
pub const INDEX_SYNONYMS: &[&str] = &["INDEX"];
pub const ISIN_SYNONYMS: &[&str] = &["ISIN"];
pub const SECTOR_SYNONYMS: &[&str] = &["SECTOR"];

const SUPPORTED_EXTENSIONS: &[&str] = &["csv"];

struct ColumnMap {
    symbol: usize,
    name: usize,
    index: Option<usize>,
    isin: Option<usize>,
    sector: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> EquityResult<Self> {
        let symbol = resolve_column_index(headers, SYMBOL_SYNONYMS);
        let name = resolve_column_index(headers, NAME_SYNONYMS);
        let (Some(symbol), Some(name)) = (symbol, name) else {
            let mut missing = Vec::new();
            if symbol.is_none() {
                missing.push("symbol".to_string());
            }
            if name.is_none() {
                missing.push("name".to_string());
            }
            return Err(EquityError::MissingRequiredField(missing));
        };
        Ok(Self {
            symbol,
            name,
            index: resolve_column_index(headers, INDEX_SYNONYMS),
            isin: resolve_column_index(headers, ISIN_SYNONYMS),
            sector: resolve_column_index(headers, SECTOR_SYNONYMS),
        })
    }
}

fn optional_cell(row: &[String], idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| row.get(i))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalize a parsed table into rows. `forced_index` overrides any index
/// column; rows with a blank symbol or name are skipped.
pub fn rows_from_table(table: &Table, forced_index: Option<&str>) -> EquityResult<Vec<EquityRow>> {
    let cols = ColumnMap::resolve(&table.headers)?;
    let forced = forced_index.map(|s| s.trim().to_uppercase());

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut skipped = 0usize;
    for raw in &table.rows {
        let symbol = raw[cols.symbol].trim().to_uppercase();
        let name = raw[cols.name].trim().to_string();
        if symbol.is_empty() || name.is_empty() {
            skipped += 1;
            continue;
        }
        let index = match &forced {
            Some(label) => label.clone(),
            None => optional_cell(raw, cols.index)
                .map(|v| v.to_uppercase())
                .unwrap_or_else(|| UNKNOWN_INDEX.to_string()),
        };
        rows.push(EquityRow {
            symbol,
            name,
            index,
            isin: optional_cell(raw, cols.isin),
            sector: optional_cell(raw, cols.sector),
        });
    }
    if skipped > 0 {
        debug!(skipped, "rows_missing_symbol_or_name");
    }
    Ok(rows)
}

/// Parse constituent rows from delimited text.
pub fn load_rows(text: &str, forced_index: Option<&str>) -> EquityResult<Vec<EquityRow>> {
    let table = crate::extract::tabular::parse_table(text)?;
    rows_from_table(&table, forced_index)
}

/// Load one file. `forced_index` behaves as in [`rows_from_table`].
pub fn load_file(path: &Path, forced_index: Option<&str>) -> EquityResult<Vec<EquityRow>> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(EquityError::Parse(format!(
            "Unsupported file type: {}",
            path.display()
        )));
    }
    let bytes = std::fs::read(path)?;
    let rows = load_rows(&String::from_utf8_lossy(&bytes), forced_index)?;
    info!(file = %path.display(), rows = rows.len(), index = ?forced_index, "index_loaded");
    Ok(rows)
}

fn index_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_string_lossy().to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect()
}

/// Load every supported file directly inside `dir`, labelling rows with the
/// upper-cased file stem (`NIFTY50.csv` -> `NIFTY50`). Files are parsed in
/// parallel; the result keeps file-name order.
pub fn load_dir(dir: &Path) -> EquityResult<Vec<EquityRow>> {
    let files = index_files(dir);
    if files.is_empty() {
        return Err(EquityError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("No index files found in {}", dir.display()),
        )));
    }

    let parts: Vec<EquityResult<Vec<EquityRow>>> = files
        .par_iter()
        .map(|path| {
            let label = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_uppercase())
                .unwrap_or_default();
            load_file(path, Some(label.as_str()))
        })
        .collect();

    let mut rows = Vec::new();
    for part in parts {
        rows.extend(part?);
    }
    Ok(rows)
}

/// Load from files and/or directories, dropping duplicate (symbol, index)
/// pairs while keeping first occurrences.
pub fn load_sources<P: AsRef<Path>>(sources: &[P]) -> EquityResult<Vec<EquityRow>> {
    let mut all = Vec::new();
    for src in sources {
        let src = src.as_ref();
        if src.is_dir() {
            all.extend(load_dir(src)?);
        } else if src.is_file() {
            all.extend(load_file(src, None)?);
        } else {
            return Err(EquityError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Path not found: {}", src.display()),
            )));
        }
    }

    let mut seen: IndexSet<(String, String)> = IndexSet::new();
    all.retain(|row| seen.insert((row.symbol.clone(), row.index.clone())));
    info!(rows = all.len(), sources = sources.len(), "equities_loaded");
    Ok(all)
}
