use crate::table::finite;
use tracing::debug;

pub const SHORT_WINDOW: usize = 20;
pub const LONG_WINDOW: usize = 50;
pub const DAILY_RETURN: &str = "Daily Return %";

/// A named sequence aligned 1:1 with the dates of the table it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSeries {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl DerivedSeries {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(|v| v.and_then(finite)).collect(),
        }
    }

    /// Only the points that carry a value, in order.
    pub fn defined(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().flatten().copied()
    }

    pub fn first_defined_index(&self) -> Option<usize> {
        self.values.iter().position(Option::is_some)
    }
}

pub fn moving_average_name(window: usize) -> String {
    format!("MA{}", window)
}

/// Trailing simple moving average.
///
/// Position `i` holds the mean of the `window` points ending at `i`, and
/// nothing when fewer than `window` consecutive defined points lead up to it.
/// A missing point restarts the window.
pub fn moving_average(close: &[Option<f64>], window: usize) -> DerivedSeries {
    let values: Vec<Option<f64>> = (0..close.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return None;
            }
            // no running total: each window is summed from its own points
            let sum: f64 = close[i + 1 - window..=i].iter().copied().sum::<Option<f64>>()?;
            finite(sum / window as f64)
        })
        .collect();

    let series = DerivedSeries::new(moving_average_name(window), values);
    if series.first_defined_index().is_none() {
        debug!(window, points = close.len(), "not enough data for moving average");
    }
    series
}

/// Period-over-period change in percent. The first point, points after a
/// gap, and divisions by a zero prior close carry no value.
pub fn percent_change(close: &[Option<f64>]) -> DerivedSeries {
    let values = std::iter::once(None)
        .chain(close.windows(2).map(|pair| match (pair[0], pair[1]) {
            (Some(prev), Some(current)) => finite((current - prev) / prev * 100.0),
            _ => None,
        }))
        .take(close.len())
        .collect();

    DerivedSeries::new(DAILY_RETURN, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    fn defined(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_moving_average_matches_trailing_mean() {
        let prices = [3.0, 5.0, 4.0, 10.0, 8.0, 1.5, 7.25];
        let close = defined(&prices);
        let ma = moving_average(&close, 3);

        assert_eq!(ma.name, "MA3");
        assert_eq!(ma.values.len(), prices.len());
        assert!(ma.values[..2].iter().all(Option::is_none));
        for i in 2..prices.len() {
            let expected = prices[i - 2..=i].iter().sum::<f64>() / 3.0;
            assert!(approx(ma.values[i].unwrap(), expected), "index {}", i);
        }
    }

    #[test]
    fn test_moving_average_shorter_than_window_is_undefined() {
        let ma = moving_average(&defined(&[1.0, 2.0, 3.0]), 20);
        assert!(ma.values.iter().all(Option::is_none));
        assert_eq!(ma.first_defined_index(), None);
    }

    #[test]
    fn test_moving_average_restarts_after_gap() {
        let close = vec![Some(1.0), Some(2.0), None, Some(4.0), Some(6.0), Some(8.0)];
        let ma = moving_average(&close, 2);
        assert_eq!(ma.values[0], None);
        assert_eq!(ma.values[1], Some(1.5));
        assert_eq!(ma.values[2], None);
        assert_eq!(ma.values[3], None);
        assert_eq!(ma.values[4], Some(5.0));
        assert_eq!(ma.values[5], Some(7.0));
    }

    #[test]
    fn test_moving_average_survives_magnitude_swings() {
        let close = defined(&[1e9, 0.001, 0.001, 0.001]);
        let ma = moving_average(&close, 2);

        assert!((ma.values[1].unwrap() - 500_000_000.0005).abs() < 1e-6);
        let last = ma.values[3].unwrap();
        assert!(((last - 0.001) / 0.001).abs() < 1e-9, "got {}", last);
        assert_eq!(ma.values[2], Some(0.001));
    }

    #[test]
    fn test_moving_average_zero_window() {
        let ma = moving_average(&defined(&[1.0, 2.0]), 0);
        assert_eq!(ma.values, vec![None::<f64>; 2]);
    }

    #[test]
    fn test_percent_change() {
        let prices = [100.0, 110.0, 99.0, 99.0, 123.4];
        let changes = percent_change(&defined(&prices));

        assert_eq!(changes.name, DAILY_RETURN);
        assert_eq!(changes.values[0], None);
        for i in 1..prices.len() {
            let expected = (prices[i] - prices[i - 1]) / prices[i - 1] * 100.0;
            assert!(approx(changes.values[i].unwrap(), expected));
        }
    }

    #[test]
    fn test_percent_change_zero_prior_close_has_no_value() {
        let changes = percent_change(&defined(&[0.0, 5.0, 0.0, 0.0]));
        assert_eq!(changes.values[1], None);
        assert!(approx(changes.values[2].unwrap(), -100.0));
        assert_eq!(changes.values[3], None);
    }

    #[test]
    fn test_percent_change_skips_gaps_and_empty_input() {
        let changes = percent_change(&[Some(10.0), None, Some(12.0)]);
        assert_eq!(changes.values, vec![None::<f64>; 3]);
        assert!(percent_change(&[]).values.is_empty());
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let close = defined(&[1.0, 2.0, 3.0]);
        let snapshot = close.clone();
        let _ = moving_average(&close, 2);
        let _ = percent_change(&close);
        assert_eq!(close, snapshot);
    }
}
