//! Dated OHLCV columns, flattened per ticker when more than one symbol is loaded.

use crate::error::AnalysisError;
use crate::resolver::qualified_name;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Canonical daily price/volume fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Open => "Open",
            Field::High => "High",
            Field::Low => "Low",
            Field::Close => "Close",
            Field::Volume => "Volume",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AnalysisError::InvalidRequest(format!("unknown field '{}'", s)))
    }
}

/// Keeps `None` as the only "no value" marker; NaN and infinities never get stored.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: String,
    pub values: Vec<Option<f64>>,
}

/// Ordered daily records. Dates are strictly increasing and every column
/// carries exactly one cell per date.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl PriceTable {
    pub fn new(dates: Vec<NaiveDate>) -> Result<Self, AnalysisError> {
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(AnalysisError::InvalidTable(format!(
                "dates must be strictly increasing ({} followed by {})",
                pair[0], pair[1]
            )));
        }
        Ok(Self {
            dates,
            columns: Vec::new(),
        })
    }

    /// Builder form of [`PriceTable::insert_column`].
    pub fn with_column(
        mut self,
        key: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, AnalysisError> {
        self.insert_column(key, values)?;
        Ok(self)
    }

    /// Appends a column, or replaces the cells of an existing one with the same key.
    pub fn insert_column(
        &mut self,
        key: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), AnalysisError> {
        let key = key.into();
        if values.len() != self.dates.len() {
            return Err(AnalysisError::InvalidTable(format!(
                "column '{}' has {} cells for {} dates",
                key,
                values.len(),
                self.dates.len()
            )));
        }
        let values: Vec<Option<f64>> = values.into_iter().map(|v| v.and_then(finite)).collect();

        match self.columns.iter_mut().find(|c| c.key == key) {
            Some(existing) => existing.values = values,
            None => self.columns.push(Column { key, values }),
        }
        Ok(())
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.key.as_str())
    }

    pub fn column(&self, key: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.values.as_slice())
    }

    /// Renames bare canonical columns to `<Field>_<Ticker>`; other columns are left alone.
    pub fn qualify(mut self, ticker: &str) -> Self {
        for column in &mut self.columns {
            if let Some(field) = Field::ALL.into_iter().find(|f| f.as_str() == column.key) {
                column.key = qualified_name(field, ticker);
            }
        }
        self
    }

    /// Outer join on date. Dates present on one side only get `None` cells
    /// on the other side's columns.
    pub fn outer_join(&self, other: &PriceTable) -> Result<PriceTable, AnalysisError> {
        if let Some(dup) = other.column_keys().find(|k| self.column(k).is_some()) {
            return Err(AnalysisError::InvalidTable(format!(
                "column '{}' present on both sides of the join",
                dup
            )));
        }

        let dates: Vec<NaiveDate> = self
            .dates
            .iter()
            .chain(other.dates.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut joined = PriceTable::new(dates)?;
        for side in [self, other] {
            let position: HashMap<NaiveDate, usize> = side
                .dates
                .iter()
                .enumerate()
                .map(|(i, d)| (*d, i))
                .collect();
            for column in &side.columns {
                let values = joined
                    .dates
                    .iter()
                    .map(|d| position.get(d).and_then(|&i| column.values[i]))
                    .collect();
                joined.insert_column(column.key.clone(), values)?;
            }
        }
        Ok(joined)
    }

    /// The last `n` rows, or the whole table when it is shorter.
    pub fn tail(&self, n: usize) -> PriceTable {
        let start = self.dates.len().saturating_sub(n);
        PriceTable {
            dates: self.dates[start..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    key: c.key.clone(),
                    values: c.values[start..].to_vec(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_field_parsing_is_case_insensitive() {
        assert_eq!("close".parse::<Field>().unwrap(), Field::Close);
        assert_eq!(" VOLUME ".parse::<Field>().unwrap(), Field::Volume);
        assert!("adj close".parse::<Field>().is_err());
    }

    #[test]
    fn test_rejects_unsorted_or_duplicate_dates() {
        assert!(PriceTable::new(vec![day(2), day(1)]).is_err());
        assert!(PriceTable::new(vec![day(1), day(1)]).is_err());
        assert!(PriceTable::new(vec![day(1), day(2)]).is_ok());
    }

    #[test]
    fn test_column_length_must_match_dates() {
        let table = PriceTable::new(vec![day(1), day(2)]).unwrap();
        let err = table.with_column("Close", vec![Some(1.0)]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidTable(_)));
    }

    #[test]
    fn test_non_finite_cells_are_stored_as_missing() {
        let table = PriceTable::new(vec![day(1), day(2)])
            .unwrap()
            .with_column("Close", vec![Some(f64::NAN), Some(f64::INFINITY)])
            .unwrap();
        assert!(table.column("Close").unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn test_insert_column_replaces_existing_key() {
        let mut table = PriceTable::new(vec![day(1)])
            .unwrap()
            .with_column("MA20", vec![None])
            .unwrap();
        table.insert_column("MA20", vec![Some(3.0)]).unwrap();
        assert_eq!(table.columns().len(), 1);
        assert_eq!(table.column("MA20").unwrap(), &[Some(3.0)]);
    }

    #[test]
    fn test_qualify_only_renames_canonical_fields() {
        let table = PriceTable::new(vec![day(1)])
            .unwrap()
            .with_column("Close", vec![Some(1.0)])
            .unwrap()
            .with_column("MA20", vec![None])
            .unwrap()
            .qualify("AAPL");
        let keys: Vec<&str> = table.column_keys().collect();
        assert_eq!(keys, vec!["Close_AAPL", "MA20"]);
    }

    #[test]
    fn test_qualified_columns_resolve_to_themselves() {
        let table = PriceTable::new(vec![day(1)])
            .unwrap()
            .with_column("Open", vec![Some(1.0)])
            .unwrap()
            .with_column("Close", vec![Some(2.0)])
            .unwrap()
            .qualify("BRK-B");
        for field in [Field::Open, Field::Close] {
            let key = resolve(field, "BRK-B", table.column_keys()).unwrap();
            assert_eq!(key, qualified_name(field, "BRK-B"));
        }
        assert_eq!(table.column("Close_BRK-B").unwrap(), &[Some(2.0)]);
    }

    #[test]
    fn test_outer_join_fills_unmatched_dates_with_missing() {
        let left = PriceTable::new(vec![day(1), day(2)])
            .unwrap()
            .with_column("Close_AAPL", vec![Some(10.0), Some(11.0)])
            .unwrap();
        let right = PriceTable::new(vec![day(2), day(3)])
            .unwrap()
            .with_column("Close_MSFT", vec![Some(20.0), Some(21.0)])
            .unwrap();

        let joined = left.outer_join(&right).unwrap();
        assert_eq!(joined.dates(), &[day(1), day(2), day(3)]);
        assert_eq!(
            joined.column("Close_AAPL").unwrap(),
            &[Some(10.0), Some(11.0), None]
        );
        assert_eq!(
            joined.column("Close_MSFT").unwrap(),
            &[None, Some(20.0), Some(21.0)]
        );
    }

    #[test]
    fn test_outer_join_rejects_colliding_columns() {
        let left = PriceTable::new(vec![day(1)])
            .unwrap()
            .with_column("Close", vec![Some(1.0)])
            .unwrap();
        assert!(left.outer_join(&left.clone()).is_err());
    }

    #[test]
    fn test_tail_keeps_last_rows() {
        let table = PriceTable::new(vec![day(1), day(2), day(3)])
            .unwrap()
            .with_column("Close", vec![Some(1.0), Some(2.0), Some(3.0)])
            .unwrap();
        let tail = table.tail(2);
        assert_eq!(tail.dates(), &[day(2), day(3)]);
        assert_eq!(tail.column("Close").unwrap(), &[Some(2.0), Some(3.0)]);
        assert_eq!(table.tail(10).len(), 3);
    }
}
