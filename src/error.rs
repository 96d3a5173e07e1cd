use crate::table::Field;
use thiserror::Error;

/// Failures raised by the analysis core.
///
/// Missing data points are not errors: they travel as `None` inside the
/// derived series. Only broken data contracts end up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("column '{field}' not found for ticker '{ticker}'")]
    MissingColumn { field: Field, ticker: String },

    #[error("no rows to analyze")]
    EmptyInput,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid price table: {0}")]
    InvalidTable(String),

    #[error("series are not aligned ({left} vs {right} points)")]
    Misaligned { left: usize, right: usize },
}
