//! Directional bias classifier and higher-timeframe projection.
//!
//! A bias series maps each bar to bull, bear or neutral under one of three
//! modes. A higher-timeframe (HTF) series is built by resampling the bars in
//! fixed chunks, classified, then projected back onto the original bars.
//!
//! Projection with [`HtfAlignment::Previous`] only exposes HTF bars that are
//! complete at the lower-timeframe bar, so a filter built on it never looks
//! ahead. [`HtfAlignment::Current`] uses the still-forming HTF bar.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Channel, Ema, Indicator, Sma};
use crate::domain::{Bar, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bull,
    Bear,
    Neutral,
}

impl Bias {
    /// Whether a trade on `side` agrees with this bias. Neutral permits nothing.
    pub fn permits(self, side: Side) -> bool {
        matches!((self, side), (Bias::Bull, Side::Long) | (Bias::Bear, Side::Short))
    }
}

/// How a bar's bias is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BiasMode {
    /// Bull while EMA(fast) > EMA(slow), bear while below.
    EmaCross { fast: usize, slow: usize },
    /// Bull while close > SMA(period), bear while below.
    PriceVsSma { period: usize },
    /// Bull after a close above the prior `lookback`-bar high, bear after a
    /// close below the prior low. The last breakout direction persists.
    RangeBreakout { lookback: usize },
}

impl Default for BiasMode {
    fn default() -> Self {
        BiasMode::EmaCross { fast: 20, slow: 50 }
    }
}

impl BiasMode {
    pub fn sanitized(self) -> Self {
        match self {
            BiasMode::EmaCross { fast, slow } => {
                let fast = fast.max(1);
                let slow = slow.max(1);
                if fast >= slow {
                    warn!(fast, slow, "bias ema_cross needs fast < slow, swapping");
                    let (lo, hi) = (fast.min(slow), fast.max(slow) + usize::from(fast == slow));
                    BiasMode::EmaCross { fast: lo, slow: hi }
                } else {
                    BiasMode::EmaCross { fast, slow }
                }
            }
            BiasMode::PriceVsSma { period } => BiasMode::PriceVsSma {
                period: period.max(1),
            },
            BiasMode::RangeBreakout { lookback } => BiasMode::RangeBreakout {
                lookback: lookback.max(1),
            },
        }
    }
}

/// Which higher-timeframe bar a lower-timeframe bar reads its bias from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HtfAlignment {
    /// Last completed HTF bar.
    #[default]
    Previous,
    /// HTF bar containing the current bar.
    Current,
}

/// Higher-timeframe bias gate attached to a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasFilter {
    pub mode: BiasMode,
    /// Lower-timeframe bars per HTF bar (e.g. 4 for 1h under 4h).
    pub htf_ratio: usize,
    pub alignment: HtfAlignment,
}

impl Default for BiasFilter {
    fn default() -> Self {
        Self {
            mode: BiasMode::default(),
            htf_ratio: 4,
            alignment: HtfAlignment::Previous,
        }
    }
}

impl BiasFilter {
    pub fn sanitized(self) -> Self {
        if self.htf_ratio == 0 {
            warn!("bias_filter.htf_ratio must be >= 1, using 1");
        }
        Self {
            mode: self.mode.sanitized(),
            htf_ratio: self.htf_ratio.max(1),
            alignment: self.alignment,
        }
    }
}

/// Classify every bar under `mode`. Bars without the needed values are neutral.
pub fn classify_bias(bars: &[Bar], mode: &BiasMode) -> Vec<Bias> {
    match *mode {
        BiasMode::EmaCross { fast, slow } => {
            let fast = Ema::new(fast.max(1)).compute(bars);
            let slow = Ema::new(slow.max(1)).compute(bars);
            fast.iter()
                .zip(&slow)
                .map(|(&f, &s)| compare(f, s))
                .collect()
        }
        BiasMode::PriceVsSma { period } => {
            let sma = Sma::new(period.max(1)).compute(bars);
            bars.iter()
                .zip(&sma)
                .map(|(bar, &m)| compare(bar.close, m))
                .collect()
        }
        BiasMode::RangeBreakout { lookback } => {
            let lookback = lookback.max(1);
            let upper = Channel::upper(lookback).compute(bars);
            let lower = Channel::lower(lookback).compute(bars);
            let mut state = Bias::Neutral;
            let mut out = Vec::with_capacity(bars.len());
            for (i, bar) in bars.iter().enumerate() {
                if i > 0 && bar.close.is_finite() {
                    if upper[i - 1].is_finite() && bar.close > upper[i - 1] {
                        state = Bias::Bull;
                    } else if lower[i - 1].is_finite() && bar.close < lower[i - 1] {
                        state = Bias::Bear;
                    }
                }
                out.push(state);
            }
            out
        }
    }
}

fn compare(value: f64, reference: f64) -> Bias {
    if !(value.is_finite() && reference.is_finite()) {
        return Bias::Neutral;
    }
    if value > reference {
        Bias::Bull
    } else if value < reference {
        Bias::Bear
    } else {
        Bias::Neutral
    }
}

/// Aggregate consecutive chunks of `ratio` bars into one bar each.
///
/// Open is the first defined open, close the last defined close, high/low the
/// extremes of the defined values. A trailing partial chunk is kept: it is the
/// HTF bar still forming at the end of the series.
pub fn resample(bars: &[Bar], ratio: usize) -> Vec<Bar> {
    let ratio = ratio.max(1);
    bars.chunks(ratio)
        .map(|chunk| {
            let open = chunk
                .iter()
                .map(|b| b.open)
                .find(|v| v.is_finite())
                .unwrap_or(f64::NAN);
            let close = chunk
                .iter()
                .rev()
                .map(|b| b.close)
                .find(|v| v.is_finite())
                .unwrap_or(f64::NAN);
            let high = chunk
                .iter()
                .map(|b| b.high)
                .filter(|v| v.is_finite())
                .fold(f64::NAN, f64::max);
            let low = chunk
                .iter()
                .map(|b| b.low)
                .filter(|v| v.is_finite())
                .fold(f64::NAN, f64::min);
            let volume = chunk
                .iter()
                .filter_map(|b| b.volume)
                .reduce(|a, b| a + b);

            let mut bar = Bar::new(chunk[0].timestamp, open, high, low, close);
            bar.volume = volume;
            bar
        })
        .collect()
}

/// Map an HTF bias series back onto `len` lower-timeframe bars.
pub fn project_bias(htf: &[Bias], ratio: usize, len: usize, alignment: HtfAlignment) -> Vec<Bias> {
    let ratio = ratio.max(1);
    (0..len)
        .map(|i| {
            let current = i / ratio;
            let source = match alignment {
                HtfAlignment::Current => Some(current),
                HtfAlignment::Previous => current.checked_sub(1),
            };
            source
                .and_then(|h| htf.get(h).copied())
                .unwrap_or(Bias::Neutral)
        })
        .collect()
}

/// Bias of each bar as seen through `filter`'s higher timeframe.
pub fn htf_bias(bars: &[Bar], filter: &BiasFilter) -> Vec<Bias> {
    let htf_bars = resample(bars, filter.htf_ratio);
    let htf = classify_bias(&htf_bars, &filter.mode);
    project_bias(&htf, filter.htf_ratio, bars.len(), filter.alignment)
}
