//! Daily bars from the Yahoo Finance chart endpoint.

use crate::request::TickerRequest;
use crate::resolver::qualified_name;
use crate::storage_utils::FetchConfig;
use crate::table::{Field, PriceTable};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, NaiveDate};
use reqwest::{Client, StatusCode};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::{debug, info, warn};

// --- Wire Format ---

#[derive(Deserialize, Debug)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug, Default)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteArrays>,
}

#[derive(Deserialize, Debug, Default)]
struct QuoteArrays {
    #[serde(default)]
    open: Vec<LenientF64>,
    #[serde(default)]
    high: Vec<LenientF64>,
    #[serde(default)]
    low: Vec<LenientF64>,
    #[serde(default)]
    close: Vec<LenientF64>,
    #[serde(default)]
    volume: Vec<LenientF64>,
}

impl QuoteArrays {
    fn field(&self, field: Field) -> &[LenientF64] {
        match field {
            Field::Open => &self.open,
            Field::High => &self.high,
            Field::Low => &self.low,
            Field::Close => &self.close,
            Field::Volume => &self.volume,
        }
    }
}

/// A number that may arrive as a float, an integer, a numeric string, or null.
#[derive(Debug, Clone, Copy, Default)]
struct LenientF64(Option<f64>);

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(None)
        } else {
            v.trim().parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

impl<'de> Deserialize<'de> for LenientF64 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LenientF64Visitor).map(LenientF64)
    }
}

// --- Parsing ---

/// Turns a chart response body into a single-ticker table with bare column
/// names. A provider-side "no data" answer becomes an empty table.
pub fn parse_chart(body: &[u8]) -> Result<PriceTable> {
    let envelope: ChartEnvelope =
        serde_json::from_slice(body).context("unexpected chart response format")?;

    if let Some(err) = envelope.chart.error {
        warn!(code = %err.code, description = %err.description, "provider returned no chart");
        return Ok(PriceTable::default());
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(PriceTable::default());
    };
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    // Yahoo occasionally repeats the latest session; keep the first occurrence.
    let mut rows: Vec<(usize, NaiveDate)> = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let Some(dt) = DateTime::from_timestamp(ts + result.meta.gmtoffset, 0) else {
            bail!("timestamp {} out of range", ts);
        };
        let date = dt.date_naive();
        if rows.last().is_some_and(|&(_, last)| date <= last) {
            debug!(%date, "skipping repeated session");
            continue;
        }
        rows.push((i, date));
    }

    let mut table = PriceTable::new(rows.iter().map(|&(_, d)| d).collect())?;
    for field in Field::ALL {
        let raw = quote.field(field);
        let values = rows
            .iter()
            .map(|&(i, _)| raw.get(i).and_then(|v| v.0))
            .collect();
        table = table.with_column(field.as_str(), values)?;
    }
    Ok(table)
}

// --- Fetching ---

pub fn chart_url(base_url: &str, ticker: &str) -> String {
    format!("{}/v8/finance/chart/{}", base_url.trim_end_matches('/'), ticker)
}

/// Unix seconds bounding `[start, end]`; the end bound is exclusive, so it
/// sits at midnight after `end`.
fn period_bounds(start: NaiveDate, end: NaiveDate) -> (i64, i64) {
    let midnight = |d: NaiveDate| d.and_hms_opt(0, 0, 0).map_or(0, |dt| dt.and_utc().timestamp());
    (midnight(start), midnight(end + Duration::days(1)))
}

async fn fetch_ticker(
    client: &Client,
    config: &FetchConfig,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceTable> {
    let (period1, period2) = period_bounds(start, end);
    let url = chart_url(&config.base_url, ticker);

    let response = client
        .get(&url)
        .query(&[
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", "1d".to_string()),
            ("events", "history".to_string()),
        ])
        .send()
        .await
        .with_context(|| format!("request for {} failed", ticker))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        bail!("rate limited by data provider while fetching {}", ticker);
    }

    let body = response.bytes().await?;

    // Unknown symbols come back as 404 with a chart.error body
    match parse_chart(&body) {
        Ok(table) => {
            debug!(ticker, rows = table.len(), "parsed chart");
            Ok(table)
        }
        Err(e) if !status.is_success() => {
            Err(e.context(format!("data provider returned {} for {}", status, ticker)))
        }
        Err(e) => Err(e.context(format!("could not read bars for {}", ticker))),
    }
}

/// Fetches every ticker of the request. One ticker keeps bare column names;
/// two tickers are fetched concurrently and outer-joined into
/// `<Field>_<Ticker>` columns. An empty table means "no data".
pub async fn fetch_price_table(request: &TickerRequest, config: &FetchConfig) -> Result<PriceTable> {
    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()?;

    let tickers = request.tickers();
    info!(tickers = ?tickers, start = %request.start(), end = %request.end(), "fetching daily bars");

    let tasks: Vec<_> = tickers
        .iter()
        .map(|t| fetch_ticker(&client, config, t, request.start(), request.end()))
        .collect();
    let results = futures::future::join_all(tasks).await;

    let mut tables = Vec::with_capacity(results.len());
    for (ticker, result) in tickers.into_iter().zip(results) {
        tables.push((ticker, result?));
    }
    join_tickers(tables)
}

/// Combines per-ticker tables. A ticker without rows keeps its
/// `<Field>_<Ticker>` columns, all missing, as long as another ticker has data.
pub fn join_tickers(tables: Vec<(&str, PriceTable)>) -> Result<PriceTable> {
    for (ticker, table) in &tables {
        if table.is_empty() {
            warn!(ticker, "no data returned");
        }
    }
    if tables.iter().all(|(_, table)| table.is_empty()) {
        return Ok(PriceTable::default());
    }

    match tables.as_slice() {
        [(_, only)] => Ok(only.clone()),
        [(a, first), (b, second)] => {
            let mut joined = first
                .clone()
                .qualify(a)
                .outer_join(&second.clone().qualify(b))?;
            for (ticker, table) in [(a, first), (b, second)] {
                if table.is_empty() {
                    for field in Field::ALL {
                        let missing = vec![None; joined.len()];
                        joined.insert_column(qualified_name(field, ticker), missing)?;
                    }
                }
            }
            Ok(joined)
        }
        _ => bail!("expected one or two tickers, got {}", tables.len()),
    }
}
