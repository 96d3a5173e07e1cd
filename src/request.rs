use crate::error::AnalysisError;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static TICKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9.\-^=]{1,15}$").expect("ticker pattern is valid"));

/// One analysis request: a primary ticker, an optional second ticker to
/// compare against, and an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerRequest {
    primary: String,
    secondary: Option<String>,
    start: NaiveDate,
    end: NaiveDate,
}

impl TickerRequest {
    /// Tickers are trimmed and upper-cased. A second ticker that is blank
    /// after trimming is ignored.
    pub fn new(
        primary: &str,
        secondary: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, AnalysisError> {
        let primary = normalize_ticker(primary)?
            .ok_or_else(|| AnalysisError::InvalidRequest("a ticker symbol is required".into()))?;

        let secondary = match secondary {
            Some(raw) => normalize_ticker(raw)?,
            None => None,
        };

        if secondary.as_deref() == Some(primary.as_str()) {
            return Err(AnalysisError::InvalidRequest(format!(
                "cannot compare '{}' with itself",
                primary
            )));
        }

        if start > end {
            return Err(AnalysisError::InvalidRequest(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }

        Ok(Self {
            primary,
            secondary,
            start,
            end,
        })
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&str> {
        self.secondary.as_deref()
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn tickers(&self) -> Vec<&str> {
        std::iter::once(self.primary.as_str())
            .chain(self.secondary.as_deref())
            .collect()
    }
}

fn normalize_ticker(raw: &str) -> Result<Option<String>, AnalysisError> {
    let ticker = raw.trim().to_ascii_uppercase();
    if ticker.is_empty() {
        return Ok(None);
    }
    if !TICKER_RE.is_match(&ticker) {
        return Err(AnalysisError::InvalidRequest(format!(
            "'{}' is not a valid ticker symbol",
            raw.trim()
        )));
    }
    Ok(Some(ticker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_ticker_request() {
        let req = TickerRequest::new(" aapl ", None, date(2023, 1, 1), date(2023, 6, 1)).unwrap();
        assert_eq!(req.primary(), "AAPL");
        assert_eq!(req.tickers(), vec!["AAPL"]);
        assert_eq!(req.secondary(), None);
    }

    #[test]
    fn test_blank_second_ticker_is_ignored() {
        let req = TickerRequest::new("AAPL", Some("   "), date(2023, 1, 1), date(2023, 1, 1)).unwrap();
        assert_eq!(req.secondary(), None);
    }

    #[test]
    fn test_two_ticker_request() {
        let req = TickerRequest::new("AAPL", Some(" msft"), date(2023, 1, 1), date(2024, 1, 1)).unwrap();
        assert_eq!(req.tickers(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_rejects_invalid_requests() {
        let (s, e) = (date(2023, 1, 1), date(2023, 2, 1));
        assert!(TickerRequest::new("", None, s, e).is_err());
        assert!(TickerRequest::new("AAPL", Some("aapl"), s, e).is_err());
        assert!(TickerRequest::new("AA PL", None, s, e).is_err());
        assert!(TickerRequest::new("AAPL", None, e, s).is_err());
    }

    #[test]
    fn test_accepts_index_and_fx_symbols() {
        let (s, e) = (date(2023, 1, 1), date(2023, 2, 1));
        assert!(TickerRequest::new("^GSPC", None, s, e).is_ok());
        assert!(TickerRequest::new("EURUSD=X", Some("BRK-B"), s, e).is_ok());
    }
}
