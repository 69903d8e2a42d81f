//! Path policy: resolve stop/target touches bar by bar.
//!
//! A bar only gives OHLC, not the path between them, so a bar that reaches
//! both the stop and the target is ambiguous. The [`TieBreaker`] resolves it
//! deterministically. Gap-throughs are not ambiguous: a bar that opens
//! beyond a level has already crossed it before anything else happened.
//!
//! Long positions are tested on the bid (mid minus half spread), shorts on the
//! ask (mid plus half spread).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, ExitReason, Side};
use crate::error::ConfigError;

/// Which level wins when one bar touches both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaker {
    /// Stop first: the conservative reading.
    #[serde(alias = "favor_sl")]
    Sl,
    #[serde(alias = "favor_tp")]
    Tp,
}

impl TieBreaker {
    fn resolve(self) -> ExitReason {
        match self {
            TieBreaker::Sl => ExitReason::Sl,
            TieBreaker::Tp => ExitReason::Tp,
        }
    }
}

impl FromStr for TieBreaker {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sl" | "favor_sl" => Ok(TieBreaker::Sl),
            "tp" | "favor_tp" => Ok(TieBreaker::Tp),
            other => Err(ConfigError::InvalidValue {
                field: "tie_breaker",
                value: other.to_string(),
            }),
        }
    }
}

/// What price exits are tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitMode {
    /// Intrabar high/low.
    #[default]
    Touch,
    /// Bar close only; the exit fills at that close.
    Close,
}

/// First exit found by [`scan_exit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitHit {
    pub index: usize,
    pub reason: ExitReason,
    /// Spread-adjusted fill before slippage.
    pub price: f64,
    /// The bar opened beyond the level.
    pub gapped: bool,
}

/// Levels and quoting for one open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitLevels {
    pub side: Side,
    pub stop: f64,
    pub target: f64,
    pub half_spread: f64,
}

impl ExitLevels {
    /// Mid price to the side's exit quote.
    fn quote(&self, mid: f64) -> f64 {
        match self.side {
            Side::Long => mid - self.half_spread,
            Side::Short => mid + self.half_spread,
        }
    }

    fn stop_reached(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop,
            Side::Short => price >= self.stop,
        }
    }

    fn target_reached(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price >= self.target,
            Side::Short => price <= self.target,
        }
    }

    /// Adverse and favorable extremes of the bar, quoted.
    fn extremes(&self, bar: &Bar) -> (f64, f64) {
        match self.side {
            Side::Long => (self.quote(bar.low), self.quote(bar.high)),
            Side::Short => (self.quote(bar.high), self.quote(bar.low)),
        }
    }
}

/// Test a single bar. `gap_check` enables the open-beyond-level rule.
pub fn check_bar(
    bar: &Bar,
    levels: &ExitLevels,
    mode: ExitMode,
    tie_breaker: TieBreaker,
    gap_check: bool,
) -> Option<(ExitReason, f64, bool)> {
    match mode {
        ExitMode::Close => {
            let close = levels.quote(bar.close);
            if levels.stop_reached(close) {
                Some((ExitReason::Sl, close, false))
            } else if levels.target_reached(close) {
                Some((ExitReason::Tp, close, false))
            } else {
                None
            }
        }
        ExitMode::Touch => {
            if gap_check {
                let open = levels.quote(bar.open);
                if levels.stop_reached(open) {
                    return Some((ExitReason::Sl, open, true));
                }
                if levels.target_reached(open) {
                    return Some((ExitReason::Tp, levels.target, true));
                }
            }
            let (adverse, favorable) = levels.extremes(bar);
            let reason = match (levels.stop_reached(adverse), levels.target_reached(favorable)) {
                (true, true) => tie_breaker.resolve(),
                (true, false) => ExitReason::Sl,
                (false, true) => ExitReason::Tp,
                (false, false) => return None,
            };
            let price = match reason {
                ExitReason::Tp => levels.target,
                _ => levels.stop,
            };
            Some((reason, price, false))
        }
    }
}

/// Scan forward from `start` for the first exit. Void bars are skipped.
///
/// The gap rule only applies to bars after `entry_index`: the entry bar's
/// open is the fill itself, not a move through a level.
pub fn scan_exit(
    bars: &[Bar],
    start: usize,
    entry_index: usize,
    levels: &ExitLevels,
    mode: ExitMode,
    tie_breaker: TieBreaker,
) -> Option<ExitHit> {
    bars.iter()
        .enumerate()
        .skip(start)
        .filter(|(_, bar)| !bar.is_void())
        .find_map(|(index, bar)| {
            check_bar(bar, levels, mode, tie_breaker, index > entry_index).map(|(reason, price, gapped)| ExitHit {
                index,
                reason,
                price,
                gapped,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_bars;

    fn long_levels() -> ExitLevels {
        ExitLevels {
            side: Side::Long,
            stop: 98.0,
            target: 104.0,
            half_spread: 0.0,
        }
    }

    #[test]
    fn both_touched_uses_tie_breaker() {
        let bars = make_ohlc_bars(&[(100.0, 100.5, 99.5, 100.0), (100.0, 105.0, 97.0, 101.0)]);
        let sl = scan_exit(&bars, 1, 0, &long_levels(), ExitMode::Touch, TieBreaker::Sl).unwrap();
        assert_eq!((sl.index, sl.reason, sl.price), (1, ExitReason::Sl, 98.0));
        let tp = scan_exit(&bars, 1, 0, &long_levels(), ExitMode::Touch, TieBreaker::Tp).unwrap();
        assert_eq!((tp.index, tp.reason, tp.price), (1, ExitReason::Tp, 104.0));
    }

    #[test]
    fn gap_below_stop_fills_at_open() {
        let bars = make_ohlc_bars(&[(100.0, 100.5, 99.5, 100.0), (96.0, 105.0, 95.0, 99.0)]);
        let hit = scan_exit(&bars, 1, 0, &long_levels(), ExitMode::Touch, TieBreaker::Tp).unwrap();
        assert_eq!(hit.reason, ExitReason::Sl);
        assert_eq!(hit.price, 96.0);
        assert!(hit.gapped);
    }

    #[test]
    fn gap_above_target_fills_at_target() {
        let bars = make_ohlc_bars(&[(100.0, 100.5, 99.5, 100.0), (106.0, 107.0, 97.0, 106.0)]);
        let hit = scan_exit(&bars, 1, 0, &long_levels(), ExitMode::Touch, TieBreaker::Sl).unwrap();
        assert_eq!((hit.reason, hit.price, hit.gapped), (ExitReason::Tp, 104.0, true));
    }

    #[test]
    fn no_gap_rule_on_entry_bar() {
        // Entry bar opens below the stop level (the stop was placed off a
        // different price); only the range decides.
        let bars = make_ohlc_bars(&[(97.5, 104.5, 97.8, 100.0)]);
        let hit = scan_exit(&bars, 0, 0, &long_levels(), ExitMode::Touch, TieBreaker::Tp).unwrap();
        assert_eq!((hit.reason, hit.gapped), (ExitReason::Tp, false));
    }

    #[test]
    fn spread_moves_long_exits_to_bid() {
        let levels = ExitLevels {
            half_spread: 0.5,
            ..long_levels()
        };
        // High 104.2 mid is 103.7 bid: target not reached.
        let bars = make_ohlc_bars(&[(100.0, 100.5, 99.5, 100.0), (101.0, 104.2, 100.0, 103.0)]);
        assert!(scan_exit(&bars, 1, 0, &levels, ExitMode::Touch, TieBreaker::Sl).is_none());
        // Low 98.4 is 97.9 bid: stop reached.
        let bars = make_ohlc_bars(&[(100.0, 100.5, 99.5, 100.0), (99.0, 99.5, 98.4, 99.0)]);
        let hit = scan_exit(&bars, 1, 0, &levels, ExitMode::Touch, TieBreaker::Tp).unwrap();
        assert_eq!(hit.reason, ExitReason::Sl);
    }

    #[test]
    fn short_uses_ask() {
        let levels = ExitLevels {
            side: Side::Short,
            stop: 102.0,
            target: 96.0,
            half_spread: 0.5,
        };
        // High 101.6 ask is 102.1: stop.
        let bars = make_ohlc_bars(&[(100.0, 100.5, 99.5, 100.0), (100.0, 101.6, 99.0, 100.0)]);
        let hit = scan_exit(&bars, 1, 0, &levels, ExitMode::Touch, TieBreaker::Tp).unwrap();
        assert_eq!((hit.reason, hit.price), (ExitReason::Sl, 102.0));
    }

    #[test]
    fn close_mode_ignores_wicks() {
        let bars = make_ohlc_bars(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 106.0, 96.0, 100.0),
            (100.0, 105.0, 99.0, 104.5),
        ]);
        let hit = scan_exit(&bars, 1, 0, &long_levels(), ExitMode::Close, TieBreaker::Sl).unwrap();
        assert_eq!((hit.index, hit.reason, hit.price), (2, ExitReason::Tp, 104.5));
    }

    #[test]
    fn void_bars_skipped() {
        let mut bars = make_ohlc_bars(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.0, 90.0, 95.0),
            (100.0, 105.0, 99.0, 104.5),
        ]);
        bars[1].high = f64::NAN;
        let hit = scan_exit(&bars, 1, 0, &long_levels(), ExitMode::Touch, TieBreaker::Sl).unwrap();
        assert_eq!((hit.index, hit.reason), (2, ExitReason::Tp));
    }

    #[test]
    fn tie_breaker_parses_aliases() {
        assert_eq!("favor_sl".parse::<TieBreaker>().unwrap(), TieBreaker::Sl);
        assert_eq!("TP".parse::<TieBreaker>().unwrap(), TieBreaker::Tp);
        let t: TieBreaker = serde_json::from_str("\"favor_tp\"").unwrap();
        assert_eq!(t, TieBreaker::Tp);
        assert!("coin_flip".parse::<TieBreaker>().is_err());
    }
}
