//! Break and retest: a range breakout, then a return to the broken level.
//!
//! Breakout detection is shared with [`range_breakout`](super::range_breakout).
//! After a breakout at bar i the broken bound becomes `level` and the
//! generator watches bars `i+1 ..= i+retest_bars` for a retest within
//! `ATR × tolerance_atr_mult` of it:
//! - `touch`: the wick reaches `level ± tol` and the close holds the level side
//! - `close`: the close lands within `tol` of the level
//!
//! A close back through `level ∓ tol` before the retest invalidates the setup.
//! The retest bar is the signal bar; entry is the bar after it. The cooldown
//! starts at the retest bar and also swallows breakouts printed during it.

use serde::{Deserialize, Serialize};

use super::range_breakout::detect_breakout;
use super::{bracket, next_open, BiasGate, Confirmation, Cooldown, TouchMode};
use crate::domain::{Bar, RawTrade, SetupDetail, Side};
use crate::indicators::{defined, Atr, BiasFilter, Channel, Indicator};
use crate::sanitize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakRetestConfig {
    pub enabled: bool,
    pub lookback: usize,
    pub atr_period: usize,
    pub buffer_atr_mult: f64,
    pub confirm: Confirmation,
    pub retest_bars: usize,
    pub retest_confirm: TouchMode,
    pub tolerance_atr_mult: f64,
    pub stop_atr_mult: f64,
    pub reward_risk: f64,
    pub cooldown_bars: usize,
    pub bias_filter: Option<BiasFilter>,
}

impl Default for BreakRetestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback: 20,
            atr_period: 14,
            buffer_atr_mult: 0.1,
            confirm: Confirmation::Close,
            retest_bars: 10,
            retest_confirm: TouchMode::Touch,
            tolerance_atr_mult: 0.25,
            stop_atr_mult: 1.5,
            reward_risk: 2.0,
            cooldown_bars: 5,
            bias_filter: None,
        }
    }
}

impl BreakRetestConfig {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            lookback: sanitize::period("break_retest.lookback", self.lookback, d.lookback),
            atr_period: sanitize::period("break_retest.atr_period", self.atr_period, d.atr_period),
            buffer_atr_mult: sanitize::non_negative(
                "break_retest.buffer_atr_mult",
                self.buffer_atr_mult,
                d.buffer_atr_mult,
            ),
            retest_bars: sanitize::period("break_retest.retest_bars", self.retest_bars, d.retest_bars),
            tolerance_atr_mult: sanitize::non_negative(
                "break_retest.tolerance_atr_mult",
                self.tolerance_atr_mult,
                d.tolerance_atr_mult,
            ),
            stop_atr_mult: sanitize::positive(
                "break_retest.stop_atr_mult",
                self.stop_atr_mult,
                d.stop_atr_mult,
            ),
            reward_risk: sanitize::positive("break_retest.reward_risk", self.reward_risk, d.reward_risk),
            bias_filter: self.bias_filter.map(BiasFilter::sanitized),
            ..self
        }
    }
}

enum Retest {
    Confirmed,
    Invalidated,
    Pending,
}

fn check_retest(bar: &Bar, side: Side, level: f64, tol: f64, mode: TouchMode) -> Retest {
    if !bar.close.is_finite() {
        return Retest::Pending;
    }
    // Distance of the close past the level, positive on the breakout side.
    let held = side.sign() * (bar.close - level);
    let confirmed = match mode {
        TouchMode::Touch => {
            let wick = match side {
                Side::Long => bar.low,
                Side::Short => bar.high,
            };
            wick.is_finite() && side.sign() * (wick - level) <= tol && held >= -tol
        }
        TouchMode::Close => held.abs() <= tol,
    };
    if confirmed {
        Retest::Confirmed
    } else if held < -tol {
        Retest::Invalidated
    } else {
        Retest::Pending
    }
}

/// A breakout and the bar that retested its level.
struct Candidate {
    breakout: usize,
    retest: usize,
    side: Side,
    level: f64,
    atr: f64,
}

pub fn generate(bars: &[Bar], cfg: &BreakRetestConfig) -> Vec<RawTrade> {
    let mut trades = Vec::new();
    if !cfg.enabled || bars.len() <= cfg.lookback + 1 {
        return trades;
    }

    let upper = Channel::upper(cfg.lookback).compute(bars);
    let lower = Channel::lower(cfg.lookback).compute(bars);
    let atr = Atr::new(cfg.atr_period).compute(bars);
    let gate = BiasGate::new(bars, cfg.bias_filter.as_ref());
    let mut cooldown = Cooldown::new(cfg.cooldown_bars);

    let mut candidates = Vec::new();
    for i in cfg.lookback..bars.len() {
        let (Some(hi), Some(lo), Some(a)) = (defined(upper[i - 1]), defined(lower[i - 1]), defined(atr[i]))
        else {
            continue;
        };
        let Some(side) = detect_breakout(&bars[i], hi, lo, a * cfg.buffer_atr_mult, cfg.confirm) else {
            continue;
        };
        let level = if side == Side::Long { hi } else { lo };
        let tol = a * cfg.tolerance_atr_mult;

        let last = (i + cfg.retest_bars).min(bars.len() - 1);
        let mut retest = None;
        for (j, bar) in bars.iter().enumerate().take(last + 1).skip(i + 1) {
            match check_retest(bar, side, level, tol, cfg.retest_confirm) {
                Retest::Confirmed => {
                    retest = Some(j);
                    break;
                }
                Retest::Invalidated => break,
                Retest::Pending => {}
            }
        }
        if let Some(j) = retest {
            candidates.push(Candidate {
                breakout: i,
                retest: j,
                side,
                level,
                atr: a,
            });
        }
    }

    // Signals are taken in the order their retests print, so the cooldown
    // only reflects signals that already happened.
    candidates.sort_by_key(|c| (c.retest, c.breakout));

    for c in candidates {
        // A breakout that printed during a cooldown is ignored.
        if !cooldown.ready(c.breakout) || !gate.allows(c.retest, c.side) {
            continue;
        }
        let Some((entry_index, entry)) = next_open(bars, c.retest) else {
            continue;
        };
        let stop_atr = defined(atr[c.retest]).unwrap_or(c.atr);
        let (stop, target) = bracket(c.side, entry, stop_atr * cfg.stop_atr_mult, cfg.reward_risk);
        let detail = SetupDetail::BreakRetest {
            level: c.level,
            breakout_index: c.breakout,
            retest_index: c.retest,
        };
        if let Some(trade) = RawTrade::new(detail, c.side, c.retest, entry_index, entry, stop, target, Some(stop_atr)) {
            trades.push(trade);
            cooldown.arm(c.retest);
        }
    }

    trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_ohlc_bars, DEFAULT_EPSILON};

    fn cfg() -> BreakRetestConfig {
        BreakRetestConfig {
            lookback: 5,
            atr_period: 3,
            buffer_atr_mult: 0.0,
            retest_bars: 4,
            tolerance_atr_mult: 0.25,
            stop_atr_mult: 1.0,
            reward_risk: 2.0,
            cooldown_bars: 10,
            ..Default::default()
        }
    }

    fn flat() -> Vec<(f64, f64, f64, f64)> {
        vec![(100.0, 101.0, 99.0, 100.0); 8]
    }

    #[test]
    fn breakout_then_touch_retest() {
        let mut data = flat();
        data.push((100.0, 104.0, 100.0, 103.5)); // 8: breakout above 101
        data.push((103.5, 104.5, 102.5, 104.0)); // 9: no retest
        data.push((104.0, 104.2, 101.2, 102.0)); // 10: low near 101, close holds
        data.push((102.0, 103.0, 101.5, 102.5)); // 11: entry bar
        let bars = make_ohlc_bars(&data);

        let trades = generate(&bars, &cfg());
        assert_eq!(trades.len(), 1);
        let t = &trades[0];
        assert_eq!(t.side, Side::Long);
        assert_eq!(t.signal_index, 10);
        assert_eq!(t.entry_index, 11);
        assert_approx(t.entry_price, 102.0, DEFAULT_EPSILON);
        match t.detail {
            SetupDetail::BreakRetest {
                level,
                breakout_index,
                retest_index,
            } => {
                assert_approx(level, 101.0, DEFAULT_EPSILON);
                assert_eq!(breakout_index, 8);
                assert_eq!(retest_index, 10);
            }
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn close_back_inside_range_invalidates() {
        let mut data = flat();
        data.push((100.0, 104.0, 100.0, 103.5));
        data.push((103.5, 103.6, 98.0, 98.5)); // closes well below the level
        data.push((98.5, 101.2, 98.0, 101.0));
        data.push((101.0, 102.0, 100.0, 101.5));
        let bars = make_ohlc_bars(&data);
        assert!(generate(&bars, &cfg()).is_empty());
    }

    #[test]
    fn retest_window_expires() {
        let mut data = flat();
        data.push((100.0, 104.0, 100.0, 103.5));
        for _ in 0..6 {
            data.push((104.0, 104.0, 103.5, 103.8)); // never returns to 101
        }
        let bars = make_ohlc_bars(&data);
        assert!(generate(&bars, &cfg()).is_empty());
    }

    #[test]
    fn close_mode_needs_close_near_level() {
        let mut data = flat();
        data.push((100.0, 104.0, 100.0, 103.5));
        data.push((103.5, 104.0, 101.0, 103.0)); // wick touches, close far
        data.push((103.0, 103.5, 102.8, 103.2));
        let bars = make_ohlc_bars(&data);
        assert_eq!(generate(&bars, &cfg()).len(), 1);
        let close_mode = BreakRetestConfig {
            retest_confirm: TouchMode::Close,
            ..cfg()
        };
        assert!(generate(&bars, &close_mode).is_empty());
    }

    #[test]
    fn short_side_mirrors() {
        let mut data = flat();
        data.push((100.0, 100.0, 96.0, 96.5)); // breakdown below 99
        data.push((96.5, 98.8, 96.0, 98.0)); // high near 99, close below it
        data.push((98.0, 98.5, 97.0, 97.5));
        let bars = make_ohlc_bars(&data);
        let trades = generate(&bars, &cfg());
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, Side::Short);
        assert_eq!(trades[0].signal_index, 9);
        assert!(trades[0].stop_loss > trades[0].entry_price);
    }
}
