//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR is the rolling sum of the last `period` true ranges divided by `period`.
//! Lookback: period - 1 (TR of the first bar is high-low).
//!
//! A bar with a missing high, low or previous close has no true range and
//! resets the accumulator; ATR is undefined until `period` fresh samples exist.

use super::rolling::RollingMean;
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// Compute the True Range series from bars.
/// TR[0] = high[0] - low[0] (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];

    for (i, bar) in bars.iter().enumerate() {
        let (h, l) = (bar.high, bar.low);
        if !(h.is_finite() && l.is_finite()) {
            continue;
        }
        if i == 0 {
            tr[0] = h - l;
            continue;
        }
        let pc = bars[i - 1].close;
        if pc.is_finite() {
            tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
        }
    }

    tr
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let tr = true_range(bars);
        let mut acc = RollingMean::new(self.period);
        let mut result = vec![f64::NAN; bars.len()];

        for (i, &value) in tr.iter().enumerate() {
            if !value.is_finite() {
                acc.reset();
                continue;
            }
            if let Some(mean) = acc.push(value) {
                result[i] = mean;
            }
        }

        result
    }
}
