//! Statistics aggregator: pure functions from simulated trades to summary stats.
//!
//! Only closed trades (`win`/`loss`) feed the ratios; open trades are counted
//! and nothing else. Every ratio is `None` when its denominator is zero.

use serde::{Deserialize, Serialize};

use crate::domain::{Outcome, SimulatedTrade};

/// Summary of one simulated trade list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestStats {
    pub total: usize,
    pub closed: usize,
    pub open: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: Option<f64>,
    /// Mean R per closed trade.
    pub expectancy: Option<f64>,
    pub profit_factor: Option<f64>,
    pub avg_win_r: Option<f64>,
    pub avg_loss_r: Option<f64>,
    pub net_r: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    /// Largest peak-to-trough decline of cumulative closed R.
    pub max_drawdown_r: f64,
}

/// Reduce trades to [`BacktestStats`]. Trades are taken in the given order.
pub fn summarize(trades: &[SimulatedTrade]) -> BacktestStats {
    let closed: Vec<&SimulatedTrade> = trades.iter().filter(|t| t.is_closed()).collect();
    let win_r: Vec<f64> = r_of(&closed, Outcome::Win);
    let loss_r: Vec<f64> = r_of(&closed, Outcome::Loss);
    let closed_r: Vec<f64> = closed.iter().map(|t| t.r_multiple).collect();

    BacktestStats {
        total: trades.len(),
        closed: closed.len(),
        open: trades.len() - closed.len(),
        wins: win_r.len(),
        losses: loss_r.len(),
        win_rate: ratio(win_r.len() as f64, closed.len() as f64),
        expectancy: mean(&closed_r),
        profit_factor: profit_factor(&win_r, &loss_r),
        avg_win_r: mean(&win_r),
        avg_loss_r: mean(&loss_r),
        net_r: closed_r.iter().sum(),
        max_consecutive_wins: max_consecutive(&closed, Outcome::Win),
        max_consecutive_losses: max_consecutive(&closed, Outcome::Loss),
        max_drawdown_r: max_drawdown_r(&closed_r),
    }
}

fn r_of(closed: &[&SimulatedTrade], outcome: Outcome) -> Vec<f64> {
    closed
        .iter()
        .filter(|t| t.outcome == outcome)
        .map(|t| t.r_multiple)
        .collect()
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    ratio(values.iter().sum(), values.len() as f64)
}

/// Gross winning R over gross losing |R|.
pub fn profit_factor(win_r: &[f64], loss_r: &[f64]) -> Option<f64> {
    if loss_r.is_empty() {
        return None;
    }
    let gross_win: f64 = win_r.iter().sum();
    let gross_loss: f64 = loss_r.iter().sum::<f64>().abs();
    ratio(gross_win, gross_loss)
}

fn max_consecutive(closed: &[&SimulatedTrade], outcome: Outcome) -> usize {
    let mut best = 0;
    let mut current = 0;
    for t in closed {
        if t.outcome == outcome {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

/// Largest drop of the running R total below its previous peak. The curve
/// starts at 0, so a losing first trade counts.
pub fn max_drawdown_r(r: &[f64]) -> f64 {
    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for &x in r {
        equity += x;
        peak = peak.max(equity);
        worst = worst.max(peak - equity);
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CommissionBreakdown, ExecutionDiagnostics, ExitReason, RawTrade, Session, SetupDetail, Side,
        VolatilityRegime,
    };
    use crate::indicators::{assert_approx, test_time, DEFAULT_EPSILON};

    fn trade(reason: ExitReason, r: f64) -> SimulatedTrade {
        let detail = SetupDetail::TrendPullback {
            ema_fast: 101.0,
            ema_slow: 100.0,
            pullback_ema: 101.0,
            trend_bars: 12,
        };
        let raw = RawTrade::new(detail, Side::Long, 0, 1, 100.0, 99.0, 102.0, None).unwrap();
        SimulatedTrade {
            raw,
            entry_index: 1,
            entry_time: test_time(1),
            entry_price: 100.0,
            stop_loss: 99.0,
            take_profit: 102.0,
            risk: 1.0,
            exit_index: 2,
            exit_time: test_time(2),
            exit_price: 100.0 + r,
            outcome: reason.outcome(),
            exit_reason: reason,
            r_multiple: r,
            bars_held: 1,
            diagnostics: ExecutionDiagnostics {
                session: Session::Asia,
                spread: 0.0,
                entry_slippage: 0.0,
                exit_slippage: 0.0,
                volatility_regime: VolatilityRegime::Mid,
                volatility_multiplier: 1.0,
                commission: CommissionBreakdown::default(),
                entry_fill_ratio: 1.0,
                exit_fill_ratio: 1.0,
                fill_ratio: 1.0,
                news_spike_entry: false,
                news_spike_exit: false,
                stop_widened: false,
                bars_waited: 0,
            },
        }
    }

    #[test]
    fn empty_is_all_none() {
        let s = summarize(&[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.closed, 0);
        assert_eq!(s.win_rate, None);
        assert_eq!(s.expectancy, None);
        assert_eq!(s.profit_factor, None);
        assert_eq!(s.avg_win_r, None);
        assert_eq!(s.avg_loss_r, None);
        assert_eq!(s.net_r, 0.0);
        assert_eq!(s.max_drawdown_r, 0.0);
    }

    #[test]
    fn mixed_trades() {
        let trades = vec![
            trade(ExitReason::Tp, 2.0),
            trade(ExitReason::Sl, -1.0),
            trade(ExitReason::Sl, -1.0),
            trade(ExitReason::Tp, 2.0),
            trade(ExitReason::Open, 0.7),
        ];
        let s = summarize(&trades);
        assert_eq!((s.total, s.closed, s.open, s.wins, s.losses), (5, 4, 1, 2, 2));
        assert_approx(s.win_rate.unwrap(), 0.5, DEFAULT_EPSILON);
        assert_approx(s.expectancy.unwrap(), 0.5, DEFAULT_EPSILON);
        assert_approx(s.profit_factor.unwrap(), 2.0, DEFAULT_EPSILON);
        assert_approx(s.avg_win_r.unwrap(), 2.0, DEFAULT_EPSILON);
        assert_approx(s.avg_loss_r.unwrap(), -1.0, DEFAULT_EPSILON);
        assert_approx(s.net_r, 2.0, DEFAULT_EPSILON);
        assert_eq!(s.max_consecutive_losses, 2);
        assert_eq!(s.max_consecutive_wins, 1);
        assert_approx(s.max_drawdown_r, 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn no_losses_means_no_profit_factor() {
        let s = summarize(&[trade(ExitReason::Tp, 2.0)]);
        assert_eq!(s.profit_factor, None);
        assert_eq!(s.avg_loss_r, None);
        assert_eq!(s.win_rate, Some(1.0));
    }

    #[test]
    fn only_open_trades() {
        let s = summarize(&[trade(ExitReason::Open, -0.3)]);
        assert_eq!((s.total, s.closed, s.open), (1, 0, 1));
        assert_eq!(s.win_rate, None);
        assert_eq!(s.expectancy, None);
    }

    #[test]
    fn drawdown_from_start() {
        assert_approx(max_drawdown_r(&[-1.0, -1.0, 3.0, -0.5]), 2.0, DEFAULT_EPSILON);
        assert_eq!(max_drawdown_r(&[1.0, 2.0]), 0.0);
    }
}
