//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = k * close[t] + (1 - k) * EMA[t-1], k = 2 / (period + 1).
//! Seed: EMA[period-1] = SMA of the first `period` closes.
//! Lookback: period - 1.
//!
//! A missing close inside the seed window aborts seeding: the whole series is
//! undefined. After seeding, a missing close leaves that bar undefined and the
//! smoothing state carries over to the next valid close.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];

        if n < self.period {
            return result;
        }

        let mut sum = 0.0;
        for bar in bars.iter().take(self.period) {
            if !bar.close.is_finite() {
                return result;
            }
            sum += bar.close;
        }
        let seed = sum / self.period as f64;
        result[self.period - 1] = seed;

        let k = 2.0 / (self.period as f64 + 1.0);
        let mut prev = seed;
        for i in self.period..n {
            let close = bars[i].close;
            if !close.is_finite() {
                continue;
            }
            prev = k * close + (1.0 - k) * prev;
            result[i] = prev;
        }

        result
    }
}
