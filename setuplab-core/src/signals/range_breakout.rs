//! Range breakout: a bar escapes the prior `lookback`-bar high/low range.
//!
//! The range at bar i is the channel of bars `[i-lookback, i-1]`, so the
//! breakout bar never widens its own range. A breakout must clear the bound by
//! `ATR × buffer_atr_mult`. Entry is the next bar's open; the stop sits
//! `ATR × stop_atr_mult` from entry and the target `reward_risk` times that.

use serde::{Deserialize, Serialize};

use super::{bracket, next_open, BiasGate, Confirmation, Cooldown};
use crate::domain::{Bar, RawTrade, SetupDetail, Side};
use crate::indicators::{defined, Atr, BiasFilter, Channel, Indicator};
use crate::sanitize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeBreakoutConfig {
    pub enabled: bool,
    pub lookback: usize,
    pub atr_period: usize,
    pub buffer_atr_mult: f64,
    pub stop_atr_mult: f64,
    pub reward_risk: f64,
    pub confirm: Confirmation,
    pub cooldown_bars: usize,
    pub bias_filter: Option<BiasFilter>,
}

impl Default for RangeBreakoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback: 20,
            atr_period: 14,
            buffer_atr_mult: 0.1,
            stop_atr_mult: 1.5,
            reward_risk: 2.0,
            confirm: Confirmation::Close,
            cooldown_bars: 5,
            bias_filter: None,
        }
    }
}

impl RangeBreakoutConfig {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            lookback: sanitize::period("range_breakout.lookback", self.lookback, d.lookback),
            atr_period: sanitize::period("range_breakout.atr_period", self.atr_period, d.atr_period),
            buffer_atr_mult: sanitize::non_negative(
                "range_breakout.buffer_atr_mult",
                self.buffer_atr_mult,
                d.buffer_atr_mult,
            ),
            stop_atr_mult: sanitize::positive(
                "range_breakout.stop_atr_mult",
                self.stop_atr_mult,
                d.stop_atr_mult,
            ),
            reward_risk: sanitize::positive("range_breakout.reward_risk", self.reward_risk, d.reward_risk),
            bias_filter: self.bias_filter.map(BiasFilter::sanitized),
            ..self
        }
    }
}

/// Side of a breakout of `[low, high]` by `buffer`, if exactly one side broke.
pub(crate) fn detect_breakout(
    bar: &Bar,
    range_high: f64,
    range_low: f64,
    buffer: f64,
    confirm: Confirmation,
) -> Option<Side> {
    let (up_reach, down_reach) = match confirm {
        Confirmation::Close => (bar.close, bar.close),
        Confirmation::Wick => (bar.high, bar.low),
    };
    let up = up_reach.is_finite() && up_reach > range_high + buffer;
    let down = down_reach.is_finite() && down_reach < range_low - buffer;
    match (up, down) {
        (true, false) => Some(Side::Long),
        (false, true) => Some(Side::Short),
        // An outside bar breaking both bounds is ambiguous.
        _ => None,
    }
}

pub fn generate(bars: &[Bar], cfg: &RangeBreakoutConfig) -> Vec<RawTrade> {
    let mut trades = Vec::new();
    if !cfg.enabled || bars.len() <= cfg.lookback {
        return trades;
    }

    let upper = Channel::upper(cfg.lookback).compute(bars);
    let lower = Channel::lower(cfg.lookback).compute(bars);
    let atr = Atr::new(cfg.atr_period).compute(bars);
    let gate = BiasGate::new(bars, cfg.bias_filter.as_ref());
    let mut cooldown = Cooldown::new(cfg.cooldown_bars);

    for i in cfg.lookback..bars.len() {
        if !cooldown.ready(i) {
            continue;
        }
        let (Some(hi), Some(lo), Some(a)) = (defined(upper[i - 1]), defined(lower[i - 1]), defined(atr[i]))
        else {
            continue;
        };
        let Some(side) = detect_breakout(&bars[i], hi, lo, a * cfg.buffer_atr_mult, cfg.confirm) else {
            continue;
        };
        if !gate.allows(i, side) {
            continue;
        }
        let Some((entry_index, entry)) = next_open(bars, i) else {
            continue;
        };

        let (stop, target) = bracket(side, entry, a * cfg.stop_atr_mult, cfg.reward_risk);
        let detail = SetupDetail::RangeBreakout {
            range_high: hi,
            range_low: lo,
            breakout_level: if side == Side::Long { hi } else { lo },
        };
        if let Some(trade) = RawTrade::new(detail, side, i, entry_index, entry, stop, target, Some(a)) {
            trades.push(trade);
            cooldown.arm(i);
        }
    }

    trades
}
