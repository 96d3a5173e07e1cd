use crate::table::finite;
use serde::Serialize;

/// Descriptive statistics for one ticker. Every figure is `None` when the
/// series it is drawn from has too few defined points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct KpiSet {
    pub highest: Option<f64>,
    pub lowest: Option<f64>,
    pub average: Option<f64>,
    pub max_daily_return: Option<f64>,
    pub volatility: Option<f64>,
}

impl KpiSet {
    /// `(label, value)` pairs in display order.
    pub fn entries(&self) -> [(&'static str, Option<f64>); 5] {
        [
            ("Highest Close Price", self.highest),
            ("Lowest Close Price", self.lowest),
            ("Average Close Price", self.average),
            ("Max Daily Return %", self.max_daily_return),
            ("Volatility (Std Dev %)", self.volatility),
        ]
    }
}

pub fn summarize(close: &[Option<f64>], returns: &[Option<f64>]) -> KpiSet {
    let prices: Vec<f64> = close.iter().flatten().copied().collect();
    let changes: Vec<f64> = returns.iter().flatten().copied().collect();

    KpiSet {
        highest: max(&prices),
        lowest: min(&prices),
        average: mean(&prices),
        max_daily_return: max(&changes),
        volatility: sample_std_dev(&changes),
    }
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    finite(values.iter().sum::<f64>() / values.len() as f64)
}

/// n - 1 denominator; needs at least two points.
fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let squares: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    finite((squares / (values.len() - 1) as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_close_statistics() {
        let close = vec![Some(10.0), None, Some(30.0), Some(20.0)];
        let kpis = summarize(&close, &[]);
        assert_eq!(kpis.highest, Some(30.0));
        assert_eq!(kpis.lowest, Some(10.0));
        assert!(approx(kpis.average.unwrap(), 20.0));
        assert!(kpis.highest >= kpis.average && kpis.average >= kpis.lowest);
    }

    #[test]
    fn test_return_statistics() {
        let returns = vec![None, Some(2.0), Some(4.0), Some(4.0), Some(4.0), Some(5.0), Some(5.0), Some(7.0), Some(9.0)];
        let kpis = summarize(&[Some(1.0)], &returns);
        assert_eq!(kpis.max_daily_return, Some(9.0));
        // sum of squared deviations from 5 is 32, over 7
        assert!(approx(kpis.volatility.unwrap(), (32.0_f64 / 7.0).sqrt()));
    }

    #[test]
    fn test_single_return_has_no_volatility() {
        let kpis = summarize(&[Some(1.0)], &[None, Some(3.0)]);
        assert_eq!(kpis.max_daily_return, Some(3.0));
        assert_eq!(kpis.volatility, None);
    }

    #[test]
    fn test_constant_returns_have_zero_volatility() {
        let kpis = summarize(&[], &[Some(1.5), Some(1.5), Some(1.5)]);
        assert_eq!(kpis.volatility, Some(0.0));
    }

    #[test]
    fn test_undefined_series_yield_undefined_kpis() {
        let kpis = summarize(&[None, None], &[None]);
        assert_eq!(kpis, KpiSet::default());
    }

    #[test]
    fn test_entries_follow_display_order() {
        let labels: Vec<&str> = KpiSet::default().entries().iter().map(|(l, _)| *l).collect();
        assert_eq!(labels[0], "Highest Close Price");
        assert_eq!(labels[4], "Volatility (Std Dev %)");
    }
}
