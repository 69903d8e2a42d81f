//! Trend pullback: continuation entry after a pullback to an EMA.
//!
//! The trend is up while EMA(fast) > EMA(slow) and down while below. Once the
//! ordering has held for `min_trend_bars` consecutive bars (the pullback bar
//! included), a bar that touches the chosen EMA (`touch`: wick reaches it;
//! `close`: close at or through it) is the signal. Entry is the next open.

use serde::{Deserialize, Serialize};

use super::{bracket, next_open, BiasGate, Cooldown, TouchMode};
use crate::domain::{Bar, RawTrade, SetupDetail, Side};
use crate::indicators::{defined, Atr, BiasFilter, Ema, Indicator};
use crate::sanitize;

/// EMA the pullback is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullbackEma {
    #[default]
    Fast,
    Slow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendPullbackConfig {
    pub enabled: bool,
    pub fast_period: usize,
    pub slow_period: usize,
    pub min_trend_bars: usize,
    pub pullback_ema: PullbackEma,
    pub confirm: TouchMode,
    pub atr_period: usize,
    pub stop_atr_mult: f64,
    pub reward_risk: f64,
    pub cooldown_bars: usize,
    pub bias_filter: Option<BiasFilter>,
}

impl Default for TrendPullbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fast_period: 20,
            slow_period: 50,
            min_trend_bars: 10,
            pullback_ema: PullbackEma::Fast,
            confirm: TouchMode::Touch,
            atr_period: 14,
            stop_atr_mult: 1.5,
            reward_risk: 2.0,
            cooldown_bars: 5,
            bias_filter: None,
        }
    }
}

impl TrendPullbackConfig {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        let mut fast = sanitize::period("trend_pullback.fast_period", self.fast_period, d.fast_period);
        let mut slow = sanitize::period("trend_pullback.slow_period", self.slow_period, d.slow_period);
        if fast >= slow {
            tracing::warn!(fast, slow, "trend_pullback needs fast_period < slow_period, using defaults");
            fast = d.fast_period;
            slow = d.slow_period;
        }
        Self {
            fast_period: fast,
            slow_period: slow,
            min_trend_bars: sanitize::period(
                "trend_pullback.min_trend_bars",
                self.min_trend_bars,
                d.min_trend_bars,
            ),
            atr_period: sanitize::period("trend_pullback.atr_period", self.atr_period, d.atr_period),
            stop_atr_mult: sanitize::positive(
                "trend_pullback.stop_atr_mult",
                self.stop_atr_mult,
                d.stop_atr_mult,
            ),
            reward_risk: sanitize::positive("trend_pullback.reward_risk", self.reward_risk, d.reward_risk),
            bias_filter: self.bias_filter.map(BiasFilter::sanitized),
            ..self
        }
    }
}

pub fn generate(bars: &[Bar], cfg: &TrendPullbackConfig) -> Vec<RawTrade> {
    let mut trades = Vec::new();
    if !cfg.enabled || bars.len() < cfg.slow_period + cfg.min_trend_bars {
        return trades;
    }

    let fast = Ema::new(cfg.fast_period).compute(bars);
    let slow = Ema::new(cfg.slow_period).compute(bars);
    let atr = Atr::new(cfg.atr_period).compute(bars);
    let gate = BiasGate::new(bars, cfg.bias_filter.as_ref());
    let mut cooldown = Cooldown::new(cfg.cooldown_bars);

    // Consecutive bars of the current EMA ordering, and its direction.
    let mut run: usize = 0;
    let mut trend: Option<Side> = None;

    for (i, bar) in bars.iter().enumerate() {
        let (Some(f), Some(s)) = (defined(fast[i]), defined(slow[i])) else {
            run = 0;
            trend = None;
            continue;
        };
        let side = if f > s {
            Some(Side::Long)
        } else if f < s {
            Some(Side::Short)
        } else {
            None
        };
        if side.is_some() && side == trend {
            run += 1;
        } else {
            run = usize::from(side.is_some());
            trend = side;
        }

        let Some(side) = trend else { continue };
        if run < cfg.min_trend_bars || !cooldown.ready(i) {
            continue;
        }

        let ema = match cfg.pullback_ema {
            PullbackEma::Fast => f,
            PullbackEma::Slow => s,
        };
        let reach = match (cfg.confirm, side) {
            (TouchMode::Touch, Side::Long) => bar.low,
            (TouchMode::Touch, Side::Short) => bar.high,
            (TouchMode::Close, _) => bar.close,
        };
        // Signed distance of the reach beyond the EMA against the trend.
        let pulled_back = reach.is_finite() && side.sign() * (reach - ema) <= 0.0;
        if !pulled_back || !gate.allows(i, side) {
            continue;
        }
        let (Some(a), Some((entry_index, entry))) = (defined(atr[i]), next_open(bars, i)) else {
            continue;
        };

        let (stop, target) = bracket(side, entry, a * cfg.stop_atr_mult, cfg.reward_risk);
        let detail = SetupDetail::TrendPullback {
            ema_fast: f,
            ema_slow: s,
            pullback_ema: ema,
            trend_bars: run,
        };
        if let Some(trade) = RawTrade::new(detail, side, i, entry_index, entry, stop, target, Some(a)) {
            trades.push(trade);
            cooldown.arm(i);
        }
    }

    trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_bars;

    fn cfg() -> TrendPullbackConfig {
        TrendPullbackConfig {
            fast_period: 3,
            slow_period: 6,
            min_trend_bars: 3,
            atr_period: 3,
            stop_atr_mult: 1.0,
            reward_risk: 2.0,
            cooldown_bars: 20,
            ..Default::default()
        }
    }

    /// Steady uptrend, one dip bar at `dip`, then recovery.
    fn uptrend_with_dip(dip: usize) -> Vec<Bar> {
        let data: Vec<_> = (0..20)
            .map(|i| {
                let c = 100.0 + 2.0 * i as f64;
                if i == dip {
                    (c - 1.0, c, c - 6.0, c - 4.0)
                } else {
                    (c - 1.0, c + 0.5, c - 1.5, c)
                }
            })
            .collect();
        make_ohlc_bars(&data)
    }

    #[test]
    fn long_pullback_touch() {
        let bars = uptrend_with_dip(12);
        let trades = generate(&bars, &cfg());
        assert_eq!(trades.len(), 1);
        let t = &trades[0];
        assert_eq!(t.side, Side::Long);
        assert_eq!(t.signal_index, 12);
        assert_eq!(t.entry_index, 13);
        match t.detail {
            SetupDetail::TrendPullback { ema_fast, ema_slow, trend_bars, .. } => {
                assert!(ema_fast > ema_slow);
                assert!(trend_bars >= 3);
            }
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn no_pullback_no_trade() {
        let data: Vec<_> = (0..20)
            .map(|i| {
                let c = 100.0 + 2.0 * i as f64;
                (c - 1.0, c + 0.5, c - 0.5, c)
            })
            .collect();
        assert!(generate(&make_ohlc_bars(&data), &cfg()).is_empty());
    }

    #[test]
    fn trend_too_young() {
        let bars = uptrend_with_dip(12);
        let strict = TrendPullbackConfig {
            min_trend_bars: 30,
            ..cfg()
        };
        assert!(generate(&bars, &strict).is_empty());
    }

    #[test]
    fn sanitize_restores_inverted_periods() {
        let c = TrendPullbackConfig {
            fast_period: 50,
            slow_period: 20,
            ..Default::default()
        }
        .sanitized();
        assert!(c.fast_period < c.slow_period);
    }
}
