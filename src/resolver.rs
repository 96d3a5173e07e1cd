use crate::error::AnalysisError;
use crate::table::{Field, PriceTable};
use std::collections::HashSet;

/// `"<Field>_<Ticker>"`, the key a multi-ticker fetch flattens columns into.
pub fn qualified_name(field: Field, ticker: &str) -> String {
    format!("{}_{}", field, ticker)
}

/// Maps a canonical field to the column key actually present for `ticker`.
///
/// The ticker-qualified key wins; the bare field name is the fallback.
/// When neither exists the caller must not derive anything from that field.
pub fn resolve<'a, I>(field: Field, ticker: &str, available: I) -> Result<String, AnalysisError>
where
    I: IntoIterator<Item = &'a str>,
{
    let available: HashSet<&str> = available.into_iter().collect();
    let qualified = qualified_name(field, ticker);

    if available.contains(qualified.as_str()) {
        Ok(qualified)
    } else if available.contains(field.as_str()) {
        Ok(field.as_str().to_string())
    } else {
        Err(AnalysisError::MissingColumn {
            field,
            ticker: ticker.to_string(),
        })
    }
}

/// Resolves `field` for `ticker` and borrows the matching cells.
pub fn resolve_column<'t>(
    table: &'t PriceTable,
    field: Field,
    ticker: &str,
) -> Result<(String, &'t [Option<f64>]), AnalysisError> {
    let key = resolve(field, ticker, table.column_keys())?;
    let values = table
        .column(&key)
        .ok_or_else(|| AnalysisError::MissingColumn {
            field,
            ticker: ticker.to_string(),
        })?;
    Ok((key, values))
}
