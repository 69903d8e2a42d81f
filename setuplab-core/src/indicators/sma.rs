//! Simple Moving Average (SMA).
//!
//! Rolling mean of close prices over a lookback window.
//! Lookback: period - 1 (first valid value at index period-1).
//! A missing close resets the window.

use super::rolling::RollingMean;
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut acc = RollingMean::new(self.period);
        bars.iter()
            .map(|bar| {
                if !bar.close.is_finite() {
                    acc.reset();
                    return f64::NAN;
                }
                acc.push(bar.close).unwrap_or(f64::NAN)
            })
            .collect()
    }
}
