//! Volatility context for cost scaling.
//!
//! Each bar is judged against the volatility known *before* it opened: the
//! ATR of the previous bar, and a reference equal to the median of the last
//! `reference_lookback` defined ATR values up to that same bar. The ratio of
//! the two picks a regime (low, mid, high) whose multiplier scales slippage.
//! A bar whose own range reaches `ATR × atr_mult` of the previous bar is a
//! news spike.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Bar, VolatilityRegime};
use crate::indicators::{defined, Atr, Indicator};
use crate::sanitize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub atr_period: usize,
    pub reference_lookback: usize,
    /// ATR / reference below this is the low regime.
    pub low_threshold: f64,
    /// ATR / reference above this is the high regime.
    pub high_threshold: f64,
    /// Slippage multiplier per regime. A missing regime uses 1.0.
    pub multipliers: BTreeMap<VolatilityRegime, f64>,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            reference_lookback: 50,
            low_threshold: 0.8,
            high_threshold: 1.25,
            multipliers: BTreeMap::from([
                (VolatilityRegime::Low, 0.75),
                (VolatilityRegime::Mid, 1.0),
                (VolatilityRegime::High, 1.5),
            ]),
        }
    }
}

impl VolatilityConfig {
    pub fn multiplier(&self, regime: VolatilityRegime) -> f64 {
        self.multipliers.get(&regime).copied().unwrap_or(1.0)
    }

    pub fn sanitized(self) -> Self {
        let d = Self::default();
        let low = sanitize::non_negative("volatility.low_threshold", self.low_threshold, d.low_threshold);
        let high = sanitize::non_negative("volatility.high_threshold", self.high_threshold, d.high_threshold);
        let (low_threshold, high_threshold) = if low <= high {
            (low, high)
        } else {
            warn!(low, high, "volatility thresholds inverted, using defaults");
            (d.low_threshold, d.high_threshold)
        };
        let multipliers = self
            .multipliers
            .into_iter()
            .map(|(regime, m)| (regime, sanitize::non_negative("volatility.multipliers", m, 1.0)))
            .collect();
        Self {
            atr_period: sanitize::period("volatility.atr_period", self.atr_period, d.atr_period),
            reference_lookback: sanitize::period(
                "volatility.reference_lookback",
                self.reference_lookback,
                d.reference_lookback,
            ),
            low_threshold,
            high_threshold,
            multipliers,
        }
    }
}

/// Regime and multiplier in effect at one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityReading {
    pub regime: VolatilityRegime,
    pub multiplier: f64,
    /// ATR of the previous bar, if defined.
    pub atr: Option<f64>,
}

/// Precomputed ATR and ATR reference series for one bar series.
#[derive(Debug, Clone)]
pub struct VolatilityModel {
    config: VolatilityConfig,
    atr: Vec<f64>,
    reference: Vec<f64>,
}

impl VolatilityModel {
    pub fn new(bars: &[Bar], config: &VolatilityConfig) -> Self {
        let atr = Atr::new(config.atr_period.max(1)).compute(bars);
        let reference = rolling_median(&atr, config.reference_lookback.max(1));
        Self {
            config: config.clone(),
            atr,
            reference,
        }
    }

    /// ATR known before bar `index` opened.
    pub fn prior_atr(&self, index: usize) -> Option<f64> {
        index.checked_sub(1).and_then(|p| defined(self.atr[p]))
    }

    pub fn reading(&self, index: usize) -> VolatilityReading {
        let atr = self.prior_atr(index);
        let reference = index
            .checked_sub(1)
            .and_then(|p| defined(self.reference[p]));
        let regime = match (atr, reference) {
            (Some(a), Some(r)) if r > 0.0 => {
                let ratio = a / r;
                if ratio < self.config.low_threshold {
                    VolatilityRegime::Low
                } else if ratio > self.config.high_threshold {
                    VolatilityRegime::High
                } else {
                    VolatilityRegime::Mid
                }
            }
            _ => VolatilityRegime::Mid,
        };
        VolatilityReading {
            regime,
            multiplier: self.config.multiplier(regime),
            atr,
        }
    }
}

/// Whether `bar`'s range reaches `atr_mult` times the prior ATR.
pub fn is_news_spike(bar: &Bar, prior_atr: Option<f64>, atr_mult: f64) -> bool {
    match (bar.range(), prior_atr) {
        (Some(range), Some(atr)) if atr > 0.0 => range >= atr * atr_mult,
        _ => false,
    }
}

/// Median of the last `lookback` defined values ending at each index.
///
/// Undefined inputs are skipped rather than resetting the window, so a single
/// void bar does not discard the reference.
fn rolling_median(values: &[f64], lookback: usize) -> Vec<f64> {
    let mut window: VecDeque<f64> = VecDeque::with_capacity(lookback);
    let mut out = Vec::with_capacity(values.len());
    let mut scratch = Vec::with_capacity(lookback);

    for &v in values {
        if v.is_finite() {
            if window.len() == lookback {
                window.pop_front();
            }
            window.push_back(v);
        }
        if window.is_empty() {
            out.push(f64::NAN);
            continue;
        }
        scratch.clear();
        scratch.extend(window.iter().copied());
        scratch.sort_by(f64::total_cmp);
        let mid = scratch.len() / 2;
        let median = if scratch.len() % 2 == 0 {
            (scratch[mid - 1] + scratch[mid]) / 2.0
        } else {
            scratch[mid]
        };
        out.push(median);
    }

    out
}
