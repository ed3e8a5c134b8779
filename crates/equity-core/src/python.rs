//! Python bindings (feature `python`).

use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::models::{round_score, SymbolHit};
use crate::query::search::SymbolDirectory;

fn hit_to_pydict<'py>(py: Python<'py>, hit: &SymbolHit) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("symbol", hit.symbol.as_str())?;
    dict.set_item("name", hit.name.as_str())?;
    dict.set_item("indices", hit.indices.clone())?;
    dict.set_item("score", round_score(hit.score))?;
    dict.set_item("reason", hit.reason.as_str())?;
    Ok(dict)
}

/// Canonical tickers from raw CSV or HTML text, in first-seen order.
#[pyfunction]
#[pyo3(name = "extract_symbols")]
fn py_extract_symbols(text: &str) -> PyResult<Vec<String>> {
    Ok(crate::extract::extract_symbols(text)?.into_iter().collect())
}

/// `(reason, score)` for one symbol/name pair.
#[pyfunction]
#[pyo3(name = "classify", signature = (query, symbol, name=None))]
fn py_classify(query: &str, symbol: &str, name: Option<&str>) -> (String, f64) {
    let (reason, score) = crate::query::matcher::classify(query, symbol, name);
    (reason.as_str().to_string(), score)
}

#[pyclass(name = "SymbolDirectory")]
pub struct PySymbolDirectory {
    inner: SymbolDirectory,
}

#[pymethods]
impl PySymbolDirectory {
    #[new]
    fn new(db_path: PathBuf) -> PyResult<Self> {
        Ok(Self {
            inner: SymbolDirectory::open(db_path)?,
        })
    }

    #[getter]
    fn db_path(&self) -> String {
        self.inner.store().path().to_string_lossy().into_owned()
    }

    fn upsert(&self, symbols: Vec<String>) -> PyResult<usize> {
        Ok(self.inner.store().upsert(&symbols)?)
    }

    /// Returns `(inserted, updated, total)`.
    #[pyo3(signature = (pairs, source=None))]
    fn upsert_names(
        &self,
        pairs: Vec<(String, String)>,
        source: Option<&str>,
    ) -> PyResult<(usize, usize, usize)> {
        let res = self.inner.store().upsert_names(pairs, source)?;
        Ok((res.inserted, res.updated, res.total))
    }

    /// Returns `(inserted, total_for_index)`.
    fn upsert_membership(&self, symbols: Vec<String>, index: &str) -> PyResult<(usize, usize)> {
        let res = self.inner.store().upsert_membership(&symbols, index)?;
        Ok((res.inserted, res.total_for_index))
    }

    fn fetch_all(&self) -> PyResult<Vec<String>> {
        Ok(self.inner.store().fetch_all()?)
    }

    #[pyo3(signature = (query, indices=None, top_k=None, min_score=None))]
    fn search(
        &self,
        py: Python<'_>,
        query: &str,
        indices: Option<Vec<String>>,
        top_k: Option<i64>,
        min_score: Option<f64>,
    ) -> PyResult<PyObject> {
        let hits = self
            .inner
            .search(query, indices.as_deref(), top_k, min_score)?;
        let dicts = hits
            .iter()
            .map(|h| hit_to_pydict(py, h))
            .collect::<PyResult<Vec<_>>>()?;
        let list = PyList::new(py, dicts)?;
        Ok(list.into_any().unbind())
    }
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(py_extract_symbols, m)?)?;
    m.add_function(wrap_pyfunction!(py_classify, m)?)?;
    m.add_class::<PySymbolDirectory>()?;
    Ok(())
}
