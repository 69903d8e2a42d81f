//! Indicator library.
//!
//! Every indicator is a pure function of the bar series: bars in, a numeric
//! series of the same length out. Undefined values (warm-up, or re-warm-up
//! after a void bar) are `f64::NAN`. Rolling accumulators keep an explicit
//! small state struct and reset on missing fields instead of letting NaN leak
//! into later values.

pub mod atr;
pub mod bias;
pub mod channel;
pub mod ema;
pub mod rolling;
pub mod rsi;
pub mod sma;

pub use atr::{true_range, Atr};
pub use bias::{classify_bias, htf_bias, project_bias, resample, Bias, BiasFilter, BiasMode, HtfAlignment};
pub use channel::{Channel, ChannelBand};
pub use ema::Ema;
pub use rolling::RollingMean;
pub use rsi::Rsi;
pub use sma::Sma;

use crate::domain::Bar;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No indicator value at bar t may depend on price data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of bars before the first defined value on a gap-free series.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// `Some(v)` if `v` is a usable number.
#[inline]
pub fn defined(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLC: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, hourly timestamps.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) + 1.0;
            let low = open.min(close) - 1.0;
            Bar::new(test_time(i), open, high, low, close)
        })
        .collect()
}

/// Build bars from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar::new(test_time(i), open, high, low, close))
        .collect()
}

#[cfg(test)]
pub fn test_time(i: usize) -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + chrono::Duration::hours(i as i64)
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
