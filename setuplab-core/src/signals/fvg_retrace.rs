//! Fair value gap retrace.
//!
//! A bullish gap exists at bar i when `high[i-2] < low[i]`: the middle bar
//! left the zone `[high[i-2], low[i]]` untraded. A bearish gap mirrors it with
//! `low[i-2] > high[i]` and zone `[high[i], low[i-2]]`.
//!
//! The candidate is emitted on the gap bar as a resting limit order at the
//! entry price inside the zone (midpoint or near edge), working from the next
//! bar for `max_wait_bars` bars. Whether and where it fills is left to the
//! simulator, so nothing past the gap bar is read here. The stop sits beyond
//! the far edge of the zone by `ATR × stop_atr_mult`.

use serde::{Deserialize, Serialize};

use super::{bracket, BiasGate, Cooldown};
use crate::domain::{Bar, RawTrade, SetupDetail, Side};
use crate::indicators::{defined, Atr, BiasFilter, Indicator};
use crate::sanitize;

/// Where inside the gap zone the entry is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FvgEntry {
    #[default]
    Midpoint,
    /// The edge price reaches first on a retrace (top for longs, bottom for shorts).
    Edge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FvgRetraceConfig {
    pub enabled: bool,
    pub atr_period: usize,
    /// Zones narrower than `ATR × min_gap_atr_mult` are ignored. 0 disables the filter.
    pub min_gap_atr_mult: f64,
    pub entry: FvgEntry,
    pub max_wait_bars: usize,
    pub stop_atr_mult: f64,
    pub reward_risk: f64,
    pub cooldown_bars: usize,
    pub bias_filter: Option<BiasFilter>,
}

impl Default for FvgRetraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            atr_period: 14,
            min_gap_atr_mult: 0.25,
            entry: FvgEntry::Midpoint,
            max_wait_bars: 10,
            stop_atr_mult: 0.5,
            reward_risk: 2.0,
            cooldown_bars: 3,
            bias_filter: None,
        }
    }
}

impl FvgRetraceConfig {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            atr_period: sanitize::period("fvg_retrace.atr_period", self.atr_period, d.atr_period),
            min_gap_atr_mult: sanitize::non_negative(
                "fvg_retrace.min_gap_atr_mult",
                self.min_gap_atr_mult,
                d.min_gap_atr_mult,
            ),
            max_wait_bars: sanitize::period("fvg_retrace.max_wait_bars", self.max_wait_bars, d.max_wait_bars),
            stop_atr_mult: sanitize::non_negative(
                "fvg_retrace.stop_atr_mult",
                self.stop_atr_mult,
                d.stop_atr_mult,
            ),
            reward_risk: sanitize::positive("fvg_retrace.reward_risk", self.reward_risk, d.reward_risk),
            bias_filter: self.bias_filter.map(BiasFilter::sanitized),
            ..self
        }
    }
}

/// Gap zone `(side, low, high)` formed at bar `i`, if any.
fn detect_gap(bars: &[Bar], i: usize) -> Option<(Side, f64, f64)> {
    let (first, third) = (&bars[i - 2], &bars[i]);
    if first.high.is_finite() && third.low.is_finite() && first.high < third.low {
        return Some((Side::Long, first.high, third.low));
    }
    if first.low.is_finite() && third.high.is_finite() && first.low > third.high {
        return Some((Side::Short, third.high, first.low));
    }
    None
}

pub fn generate(bars: &[Bar], cfg: &FvgRetraceConfig) -> Vec<RawTrade> {
    let mut trades = Vec::new();
    if !cfg.enabled || bars.len() < 3 {
        return trades;
    }

    let atr = Atr::new(cfg.atr_period).compute(bars);
    let gate = BiasGate::new(bars, cfg.bias_filter.as_ref());
    let mut cooldown = Cooldown::new(cfg.cooldown_bars);
    // The first eligible bar is part of the window.
    let wait_bars = cfg.max_wait_bars.saturating_sub(1);

    for i in 2..bars.len() {
        if !cooldown.ready(i) {
            continue;
        }
        let Some((side, zone_low, zone_high)) = detect_gap(bars, i) else {
            continue;
        };
        let gap_size = zone_high - zone_low;
        let a = defined(atr[i]);
        if cfg.min_gap_atr_mult > 0.0 {
            match a {
                Some(a) if gap_size >= a * cfg.min_gap_atr_mult => {}
                _ => continue,
            }
        }
        if !gate.allows(i, side) {
            continue;
        }

        let entry = match (cfg.entry, side) {
            (FvgEntry::Midpoint, _) => (zone_low + zone_high) / 2.0,
            (FvgEntry::Edge, Side::Long) => zone_high,
            (FvgEntry::Edge, Side::Short) => zone_low,
        };
        let far_edge = match side {
            Side::Long => zone_low,
            Side::Short => zone_high,
        };
        let buffer = a.unwrap_or(0.0) * cfg.stop_atr_mult;
        let stop_distance = (entry - far_edge).abs() + buffer;
        let (stop, target) = bracket(side, entry, stop_distance, cfg.reward_risk);

        let detail = SetupDetail::FvgRetrace {
            zone_low,
            zone_high,
            gap_size,
        };
        if let Some(trade) = RawTrade::new(detail, side, i, i + 1, entry, stop, target, a) {
            trades.push(trade.resting_limit(wait_bars));
            cooldown.arm(i);
        }
    }

    trades
}
