//! Error types for the equity directory.

/// Top-level error enum for the equity directory.
///
/// Schema-level problems (`MissingColumn`, `MissingRequiredField`) carry a
/// message that callers can match on verbatim; row-level problems never reach
/// this type because the extractor skips the offending rows.
#[derive(Debug, thiserror::Error)]
pub enum EquityError {
    #[error("{0}")]
    MissingColumn(String),

    #[error("Missing required columns: {0:?}")]
    MissingRequiredField(Vec<String>),

    #[error("Store unavailable at {path}: {reason}")]
    StoreUnavailable { path: String, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EquityError {
    /// The error raised when a source has no `SYMBOL*` header.
    pub fn missing_symbol_column() -> Self {
        EquityError::MissingColumn("No column starting with 'SYMBOL'".to_string())
    }
}

#[cfg(feature = "python")]
impl From<EquityError> for pyo3::PyErr {
    fn from(err: EquityError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match &err {
            EquityError::MissingColumn(_)
            | EquityError::MissingRequiredField(_)
            | EquityError::Parse(_)
            | EquityError::Query(_)
            | EquityError::Csv(_)
            | EquityError::Json(_) => PyValueError::new_err(err.to_string()),
            EquityError::StoreUnavailable { .. }
            | EquityError::Sqlite(_) => PyRuntimeError::new_err(err.to_string()),
            EquityError::Io(_) => PyIOError::new_err(err.to_string()),
        }
    }
}

pub type EquityResult<T> = Result<T, EquityError>;
