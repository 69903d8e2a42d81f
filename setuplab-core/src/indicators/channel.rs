//! Price channel: highest high / lowest low over a lookback window.
//!
//! - Upper: max(high[t-period+1..=t])
//! - Lower: min(low[t-period+1..=t])
//!
//! Lookback: period - 1. A missing value anywhere in the window leaves that
//! bar undefined; the channel comes back once the gap leaves the window.
//!
//! Breakout detection compares a bar against the channel of the *previous*
//! bar, so the bar under test is never part of its own range.

use super::Indicator;
use crate::domain::Bar;

/// Which band of the channel to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBand {
    Upper,
    Lower,
}

#[derive(Debug, Clone)]
pub struct Channel {
    period: usize,
    band: ChannelBand,
    name: String,
}

impl Channel {
    pub fn upper(period: usize) -> Self {
        assert!(period >= 1, "channel period must be >= 1");
        Self {
            period,
            band: ChannelBand::Upper,
            name: format!("channel_upper_{period}"),
        }
    }

    pub fn lower(period: usize) -> Self {
        assert!(period >= 1, "channel period must be >= 1");
        Self {
            period,
            band: ChannelBand::Lower,
            name: format!("channel_lower_{period}"),
        }
    }
}

impl Indicator for Channel {
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

        for i in (self.period - 1)..n {
            let window = &bars[i + 1 - self.period..=i];
            let values = window.iter().map(|bar| match self.band {
                ChannelBand::Upper => bar.high,
                ChannelBand::Lower => bar.low,
            });

            let mut acc = match self.band {
                ChannelBand::Upper => f64::NEG_INFINITY,
                ChannelBand::Lower => f64::INFINITY,
            };
            let mut has_gap = false;
            for v in values {
                if !v.is_finite() {
                    has_gap = true;
                    break;
                }
                acc = match self.band {
                    ChannelBand::Upper => acc.max(v),
                    ChannelBand::Lower => acc.min(v),
                };
            }
            if !has_gap {
                result[i] = acc;
            }
        }

        result
    }
}
