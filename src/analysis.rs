//! Per-request analysis pipeline over a fetched price table.

use crate::compare::{Comparison, compare_tickers};
use crate::error::AnalysisError;
use crate::fetch;
use crate::kpi::{KpiSet, summarize};
use crate::request::TickerRequest;
use crate::resolver::resolve_column;
use crate::storage_utils::{AnalysisConfig, AppConfig};
use crate::table::{Field, PriceTable};
use crate::transform::{DerivedSeries, moving_average, percent_change};
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Resolved column keys of one ticker's OHLCV fields.
#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvColumns {
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

impl OhlcvColumns {
    fn resolve(table: &PriceTable, ticker: &str) -> Result<Self, AnalysisError> {
        let key = |field| resolve_column(table, field, ticker).map(|(key, _)| key);
        Ok(Self {
            open: key(Field::Open)?,
            high: key(Field::High)?,
            low: key(Field::Low)?,
            close: key(Field::Close)?,
            volume: key(Field::Volume)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleAnalysis {
    pub ticker: String,
    pub columns: OhlcvColumns,
    /// Source columns followed by the derived ones.
    pub table: PriceTable,
    pub short_ma: DerivedSeries,
    pub long_ma: DerivedSeries,
    pub returns: DerivedSeries,
    pub kpis: KpiSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonAnalysis {
    pub tickers: [String; 2],
    pub close_columns: [String; 2],
    pub table: PriceTable,
    pub comparison: Comparison,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisReport {
    /// The source returned no rows.
    Empty,
    Single(SingleAnalysis),
    Comparison(ComparisonAnalysis),
}

impl AnalysisReport {
    /// Base file name for the exported table, without extension.
    pub fn export_name(&self) -> Option<String> {
        match self {
            AnalysisReport::Empty => None,
            AnalysisReport::Single(single) => Some(format!("{}_analysis", single.ticker)),
            AnalysisReport::Comparison(cmp) => Some(format!(
                "{}_vs_{}_analysis",
                cmp.tickers[0], cmp.tickers[1]
            )),
        }
    }

    pub fn table(&self) -> Option<&PriceTable> {
        match self {
            AnalysisReport::Empty => None,
            AnalysisReport::Single(single) => Some(&single.table),
            AnalysisReport::Comparison(cmp) => Some(&cmp.table),
        }
    }
}

/// Derives moving averages, returns and KPIs (one ticker) or side-by-side
/// returns (two tickers) from an already loaded table.
pub fn analyze(
    request: &TickerRequest,
    table: &PriceTable,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, AnalysisError> {
    if table.is_empty() {
        warn!(tickers = ?request.tickers(), "no rows to analyze");
        return Ok(AnalysisReport::Empty);
    }

    match request.secondary() {
        None => analyze_single(request.primary(), table, config).map(AnalysisReport::Single),
        Some(secondary) => {
            analyze_pair(request.primary(), secondary, table).map(AnalysisReport::Comparison)
        }
    }
}

fn analyze_single(
    ticker: &str,
    table: &PriceTable,
    config: &AnalysisConfig,
) -> Result<SingleAnalysis, AnalysisError> {
    let columns = OhlcvColumns::resolve(table, ticker)?;
    let (_, close) = resolve_column(table, Field::Close, ticker)?;

    let short_ma = moving_average(close, config.short_window);
    let long_ma = moving_average(close, config.long_window);
    let returns = percent_change(close);
    let kpis = summarize(close, &returns.values);

    let mut enriched = table.clone();
    for series in [&short_ma, &long_ma, &returns] {
        enriched.insert_column(series.name.clone(), series.values.clone())?;
    }

    info!(
        ticker,
        rows = table.len(),
        returns = returns.defined().count(),
        "single ticker analysis complete"
    );

    Ok(SingleAnalysis {
        ticker: ticker.to_string(),
        columns,
        table: enriched,
        short_ma,
        long_ma,
        returns,
        kpis,
    })
}

fn analyze_pair(
    primary: &str,
    secondary: &str,
    table: &PriceTable,
) -> Result<ComparisonAnalysis, AnalysisError> {
    let (key_a, close_a) = resolve_column(table, Field::Close, primary)?;
    let (key_b, close_b) = resolve_column(table, Field::Close, secondary)?;
    if key_a == key_b {
        // a bare "Close" cannot belong to both tickers
        return Err(AnalysisError::MissingColumn {
            field: Field::Close,
            ticker: secondary.to_string(),
        });
    }

    let comparison = compare_tickers((primary, close_a), (secondary, close_b))?;

    let mut enriched = table.clone();
    for series in [&comparison.returns_a, &comparison.returns_b] {
        enriched.insert_column(series.name.clone(), series.values.clone())?;
    }

    info!(primary, secondary, rows = table.len(), "comparison analysis complete");

    Ok(ComparisonAnalysis {
        tickers: [primary.to_string(), secondary.to_string()],
        close_columns: [key_a, key_b],
        table: enriched,
        comparison,
    })
}

/// Runs the full analysis pipeline:
/// 1. Fetches daily bars for every requested ticker.
/// 2. Derives the analysis from the joined table.
pub async fn run_analysis_pipeline(
    request: &TickerRequest,
    config: &AppConfig,
) -> Result<AnalysisReport> {
    // Step 1: Download bars
    let table = fetch::fetch_price_table(request, &config.fetch).await?;

    // Step 2: Analyze
    analyze(request, &table, &config.analysis)
        .with_context(|| format!("analysis failed for {}", request.tickers().join(", ")))
}
