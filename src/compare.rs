use crate::error::AnalysisError;
use crate::transform::{DerivedSeries, percent_change};

/// Independent daily returns of two close series sharing one date index.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub returns_a: DerivedSeries,
    pub returns_b: DerivedSeries,
}

pub fn return_column_name(ticker: &str) -> String {
    format!("{} Return %", ticker)
}

/// Both series must already be aligned on the same dates; join the source
/// tables first (`PriceTable::outer_join`) when they were fetched apart.
pub fn compare(
    close_a: &[Option<f64>],
    close_b: &[Option<f64>],
) -> Result<Comparison, AnalysisError> {
    if close_a.len() != close_b.len() {
        return Err(AnalysisError::Misaligned {
            left: close_a.len(),
            right: close_b.len(),
        });
    }

    Ok(Comparison {
        returns_a: percent_change(close_a),
        returns_b: percent_change(close_b),
    })
}

/// Same as [`compare`], with the return series named after their tickers.
pub fn compare_tickers(
    (ticker_a, close_a): (&str, &[Option<f64>]),
    (ticker_b, close_b): (&str, &[Option<f64>]),
) -> Result<Comparison, AnalysisError> {
    let mut comparison = compare(close_a, close_b)?;
    comparison.returns_a.name = return_column_name(ticker_a);
    comparison.returns_b.name = return_column_name(ticker_b);
    Ok(comparison)
}
