//! Equity directory core: symbol extraction, a SQLite symbol store, and
//! exact/prefix/fuzzy symbol search with name and index enrichment.
//!
//! With the `python` feature the crate also builds as a Python extension
//! module (`equity_core`) via PyO3.

pub mod config;
pub mod errors;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod query;
pub mod store;

#[cfg(feature = "python")]
mod python;

pub use config::SearchConfig;
pub use errors::{EquityError, EquityResult};
pub use extract::extract_symbols;
pub use query::search::{render_results, SymbolDirectory};
pub use store::database::SymbolStore;

#[cfg(feature = "python")]
#[pyo3::pymodule]
fn equity_core(m: &pyo3::Bound<'_, pyo3::types::PyModule>) -> pyo3::PyResult<()> {
    use pyo3::types::PyModuleMethods;

    python::register(m)?;
    m.add("MAX_QUERY_LENGTH", query::guards::MAX_QUERY_LENGTH)?;
    m.add("MAX_SEARCH_LIMIT", query::guards::MAX_SEARCH_LIMIT)?;
    m.add("PREFIX_SCORE", query::matcher::PREFIX_SCORE)?;
    Ok(())
}
