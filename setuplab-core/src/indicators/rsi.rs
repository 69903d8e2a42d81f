//! Relative Strength Index (RSI).
//!
//! Uses Wilder smoothing of average gains and average losses.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Lookback: period (first value on the (period+1)-th bar).
//! Edge case: avg_loss == 0 → RSI = 100.
//!
//! A missing close resets the accumulator; RSI re-seeds from the next
//! `period` price changes.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

/// Running Wilder state between bars.
#[derive(Debug, Clone, Default)]
struct RsiState {
    prev_close: Option<f64>,
    seed_gain: f64,
    seed_loss: f64,
    seed_count: usize,
    averages: Option<(f64, f64)>,
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let p = self.period as f64;
        let mut result = vec![f64::NAN; bars.len()];
        let mut state = RsiState::default();

        for (i, bar) in bars.iter().enumerate() {
            let close = bar.close;
            if !close.is_finite() {
                state = RsiState::default();
                continue;
            }

            if let Some(prev) = state.prev_close {
                let change = close - prev;
                let gain = change.max(0.0);
                let loss = (-change).max(0.0);

                match state.averages {
                    None => {
                        state.seed_gain += gain;
                        state.seed_loss += loss;
                        state.seed_count += 1;
                        if state.seed_count == self.period {
                            let avg = (state.seed_gain / p, state.seed_loss / p);
                            state.averages = Some(avg);
                            result[i] = compute_rsi(avg.0, avg.1);
                        }
                    }
                    Some((avg_gain, avg_loss)) => {
                        let avg_gain = (avg_gain * (p - 1.0) + gain) / p;
                        let avg_loss = (avg_loss * (p - 1.0) + loss) / p;
                        state.averages = Some((avg_gain, avg_loss));
                        result[i] = compute_rsi(avg_gain, avg_loss);
                    }
                }
            }

            state.prev_close = Some(close);
        }

        result
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
