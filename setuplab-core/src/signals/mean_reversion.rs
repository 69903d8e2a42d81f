//! Mean reversion: fade a close outside an ATR envelope around the SMA.
//!
//! Bands are `SMA ± ATR × band_atr_mult`. A close below the lower band is a
//! long signal, a close above the upper band a short one. An optional RSI
//! filter additionally requires RSI <= oversold (long) or >= overbought
//! (short) on the signal bar.
//!
//! The target is either `reward_risk` times the stop distance, or the SMA at
//! the signal bar. A mean target that is not beyond the entry in the trade
//! direction drops the signal.

use serde::{Deserialize, Serialize};

use super::{bracket, next_open, BiasGate, Cooldown};
use crate::domain::{Bar, RawTrade, SetupDetail, Side};
use crate::indicators::{defined, Atr, BiasFilter, Indicator, Rsi, Sma};
use crate::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiFilter {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiFilter {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl RsiFilter {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        let oversold = sanitize::within("mean_reversion.rsi_filter.oversold", self.oversold, 0.0, 100.0, d.oversold);
        let overbought = sanitize::within(
            "mean_reversion.rsi_filter.overbought",
            self.overbought,
            0.0,
            100.0,
            d.overbought,
        );
        let (oversold, overbought) = if oversold < overbought {
            (oversold, overbought)
        } else {
            tracing::warn!(oversold, overbought, "rsi_filter needs oversold < overbought, using defaults");
            (d.oversold, d.overbought)
        };
        Self {
            period: sanitize::period("mean_reversion.rsi_filter.period", self.period, d.period),
            oversold,
            overbought,
        }
    }
}

/// Where the take-profit is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversionTarget {
    #[default]
    RiskReward,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversionConfig {
    pub enabled: bool,
    pub period: usize,
    pub atr_period: usize,
    pub band_atr_mult: f64,
    pub stop_atr_mult: f64,
    pub reward_risk: f64,
    pub target: ReversionTarget,
    pub rsi_filter: Option<RsiFilter>,
    pub cooldown_bars: usize,
    pub bias_filter: Option<BiasFilter>,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period: 20,
            atr_period: 14,
            band_atr_mult: 2.0,
            stop_atr_mult: 1.0,
            reward_risk: 1.5,
            target: ReversionTarget::RiskReward,
            rsi_filter: None,
            cooldown_bars: 5,
            bias_filter: None,
        }
    }
}

impl MeanReversionConfig {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            period: sanitize::period("mean_reversion.period", self.period, d.period),
            atr_period: sanitize::period("mean_reversion.atr_period", self.atr_period, d.atr_period),
            band_atr_mult: sanitize::non_negative(
                "mean_reversion.band_atr_mult",
                self.band_atr_mult,
                d.band_atr_mult,
            ),
            stop_atr_mult: sanitize::positive(
                "mean_reversion.stop_atr_mult",
                self.stop_atr_mult,
                d.stop_atr_mult,
            ),
            reward_risk: sanitize::positive("mean_reversion.reward_risk", self.reward_risk, d.reward_risk),
            rsi_filter: self.rsi_filter.map(RsiFilter::sanitized),
            bias_filter: self.bias_filter.map(BiasFilter::sanitized),
            ..self
        }
    }
}

pub fn generate(bars: &[Bar], cfg: &MeanReversionConfig) -> Vec<RawTrade> {
    let mut trades = Vec::new();
    if !cfg.enabled || bars.len() < cfg.period.max(cfg.atr_period) + 1 {
        return trades;
    }

    let sma = Sma::new(cfg.period).compute(bars);
    let atr = Atr::new(cfg.atr_period).compute(bars);
    let rsi = cfg.rsi_filter.map(|f| (f, Rsi::new(f.period).compute(bars)));
    let gate = BiasGate::new(bars, cfg.bias_filter.as_ref());
    let mut cooldown = Cooldown::new(cfg.cooldown_bars);

    for (i, bar) in bars.iter().enumerate() {
        if !cooldown.ready(i) || !bar.close.is_finite() {
            continue;
        }
        let (Some(mean), Some(a)) = (defined(sma[i]), defined(atr[i])) else {
            continue;
        };
        let upper = mean + a * cfg.band_atr_mult;
        let lower = mean - a * cfg.band_atr_mult;
        let side = if bar.close < lower {
            Side::Long
        } else if bar.close > upper {
            Side::Short
        } else {
            continue;
        };

        let rsi_value = match &rsi {
            None => None,
            Some((filter, series)) => {
                let Some(r) = defined(series[i]) else { continue };
                let confirmed = match side {
                    Side::Long => r <= filter.oversold,
                    Side::Short => r >= filter.overbought,
                };
                if !confirmed {
                    continue;
                }
                Some(r)
            }
        };
        if !gate.allows(i, side) {
            continue;
        }
        let Some((entry_index, entry)) = next_open(bars, i) else {
            continue;
        };

        let (stop, rr_target) = bracket(side, entry, a * cfg.stop_atr_mult, cfg.reward_risk);
        let target = match cfg.target {
            ReversionTarget::RiskReward => rr_target,
            ReversionTarget::Mean => mean,
        };
        let detail = SetupDetail::MeanReversion {
            mean,
            upper_band: upper,
            lower_band: lower,
            rsi: rsi_value,
        };
        if let Some(trade) = RawTrade::new(detail, side, i, entry_index, entry, stop, target, Some(a)) {
            trades.push(trade);
            cooldown.arm(i);
        }
    }

    trades
}
