use crate::error::AnalysisError;
use crate::storage_utils::{AsyncStorageManager, ExportConfig};
use crate::table::PriceTable;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

/// Encodes a table as comma-separated text: a `Date` column (ISO 8601)
/// followed by every column in table order. Missing cells stay empty.
pub fn to_csv(table: &PriceTable) -> Result<Vec<u8>> {
    if table.is_empty() {
        return Err(AnalysisError::EmptyInput.into());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());

    let header = std::iter::once("Date").chain(table.column_keys());
    writer.write_record(header)?;

    for (row, date) in table.dates().iter().enumerate() {
        let cells = std::iter::once(date.format("%Y-%m-%d").to_string()).chain(
            table
                .columns()
                .iter()
                .map(|c| c.values[row].map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(cells)?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("could not flush csv buffer: {}", e.error()))
}

/// Writes `<name>.csv` under the configured export directory and returns its path.
pub async fn export_table(
    storage: &AsyncStorageManager,
    config: &ExportConfig,
    name: &str,
    table: &PriceTable,
) -> Result<PathBuf> {
    let bytes = to_csv(table).with_context(|| format!("could not encode {}", name))?;
    let relative = format!("{}/{}.csv", config.dir.trim_end_matches('/'), name);
    let path = storage.save_bytes(&relative, &bytes).await?;

    info!(path = %path.display(), rows = table.len(), "exported analysis");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> PriceTable {
        let dates = vec![
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        ];
        PriceTable::new(dates)
            .unwrap()
            .with_column("Close", vec![Some(185.64), Some(184.25)])
            .unwrap()
            .with_column("Daily Return %", vec![None, Some(-0.75)])
            .unwrap()
    }

    #[test]
    fn test_csv_layout() {
        let text = String::from_utf8(to_csv(&sample()).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Date,Close,Daily Return %");
        assert_eq!(lines[1], "2024-01-02,185.64,");
        assert_eq!(lines[2], "2024-01-03,184.25,-0.75");
    }

    #[test]
    fn test_empty_table_is_not_exported() {
        let err = to_csv(&PriceTable::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalysisError>(),
            Some(&AnalysisError::EmptyInput)
        );
    }

    #[tokio::test]
    async fn test_export_table_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();

        let path = export_table(&storage, &ExportConfig::default(), "AAPL_analysis", &sample())
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("exports").join("AAPL_analysis.csv"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("Date,Close"));
    }
}
