//! Trade simulator: one raw trade in, at most one simulated trade out.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entry::resolve_entry;
use super::path_policy::{scan_exit, ExitLevels};
use super::volatility::{is_news_spike, VolatilityModel};
use super::{EntryOrder, EntryTiming, ExecutionConfig, ExitMode, FillAction, MinStopPolicy};
use crate::domain::{
    price_order_holds, Bar, CommissionBreakdown, ExecutionDiagnostics, ExitReason, RawTrade, Session, SimulatedTrade,
    VolatilityRegime,
};

/// Why a raw trade produced no simulated trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The entry bar lies past the end of the series or has no price.
    NoEntryBar,
    /// A limit or stop order never traded within the wait window.
    Unfilled,
    /// The entry bar falls in a session that is not allowed.
    SessionFiltered,
    /// Stop closer than the minimum distance under the `skip` policy.
    StopBelowMinimum,
    /// The realized entry is not strictly between stop and target.
    InvalidGeometry,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::NoEntryBar => "no_entry_bar",
            DropReason::Unfilled => "unfilled",
            DropReason::SessionFiltered => "session_filtered",
            DropReason::StopBelowMinimum => "stop_below_minimum",
            DropReason::InvalidGeometry => "invalid_geometry",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simulated trades plus a count of every dropped candidate by reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub trades: Vec<SimulatedTrade>,
    pub drops: BTreeMap<DropReason, usize>,
}

impl SimulationReport {
    pub fn dropped(&self) -> usize {
        self.drops.values().sum()
    }
}

/// Simulate every raw trade, in input order.
pub fn simulate(bars: &[Bar], raw_trades: &[RawTrade], config: &ExecutionConfig) -> Vec<SimulatedTrade> {
    simulate_with_report(bars, raw_trades, config).trades
}

/// Like [`simulate`], also counting drops.
pub fn simulate_with_report(bars: &[Bar], raw_trades: &[RawTrade], config: &ExecutionConfig) -> SimulationReport {
    let cfg = config.clone().sanitized();
    let sim = Simulator {
        bars,
        volatility: VolatilityModel::new(bars, &cfg.volatility),
        cfg: &cfg,
    };

    let mut report = SimulationReport::default();
    for raw in raw_trades {
        match sim.run(raw) {
            Ok(trade) => report.trades.push(trade),
            Err(reason) => {
                debug!(trade = %raw.id, %reason, "trade dropped");
                *report.drops.entry(reason).or_insert(0) += 1;
            }
        }
    }
    debug!(
        simulated = report.trades.len(),
        dropped = report.dropped(),
        "simulation finished"
    );
    report
}

/// Costs in effect on one bar, for a fill at one price.
#[derive(Debug, Clone, Copy)]
struct BarCosts {
    session: Session,
    spread: f64,
    slippage: f64,
    commission: f64,
    regime: VolatilityRegime,
    multiplier: f64,
    atr: Option<f64>,
    news_spike: bool,
}

struct Simulator<'a> {
    bars: &'a [Bar],
    volatility: VolatilityModel,
    cfg: &'a ExecutionConfig,
}

impl Simulator<'_> {
    fn costs(&self, index: usize, price: f64, fallback_atr: Option<f64>) -> BarCosts {
        let cfg = self.cfg;
        let bar = &self.bars[index];
        let session = Session::from_timestamp(bar.timestamp);
        let session_rule = cfg.sessions.override_for(session);
        let reading = self.volatility.reading(index);
        let atr = reading.atr.or(fallback_atr);

        let news_spike = cfg.news_spike.enabled && is_news_spike(bar, reading.atr, cfg.news_spike.atr_mult);
        let (spike_spread, spike_slippage) = if news_spike {
            (cfg.news_spike.spread_mult, cfg.news_spike.slippage_mult)
        } else {
            (1.0, 1.0)
        };

        let commission = match session_rule.commission_bps {
            Some(bps) => price.abs() * bps / 10_000.0,
            None => cfg.commission.amount(price),
        };

        BarCosts {
            session,
            spread: cfg.spread.amount(price, atr) * session_rule.spread_mult * spike_spread,
            slippage: cfg.slippage.amount(price, atr)
                * reading.multiplier
                * session_rule.slippage_mult
                * spike_slippage,
            commission,
            regime: reading.regime,
            multiplier: reading.multiplier,
            atr,
            news_spike,
        }
    }

    fn run(&self, raw: &RawTrade) -> Result<SimulatedTrade, DropReason> {
        let cfg = self.cfg;
        let side = raw.side;
        let sign = side.sign();

        let fill = resolve_entry(self.bars, raw, cfg)?;
        let e = fill.index;
        let entry_bar = &self.bars[e];
        let at_entry = self.costs(e, fill.price, raw.atr);
        if !cfg.sessions.allows(at_entry.session) {
            return Err(DropReason::SessionFiltered);
        }

        let half_spread = at_entry.spread / 2.0;
        let entry_slippage = match fill.order {
            EntryOrder::Limit => 0.0,
            EntryOrder::Market | EntryOrder::Stop => at_entry.slippage,
        };
        let entry_price = FillAction::entry(side).pay(fill.price, half_spread + entry_slippage);

        let mut stop = raw.stop_loss;
        let mut target = raw.take_profit;
        if !price_order_holds(side, stop, entry_price, target) {
            return Err(DropReason::InvalidGeometry);
        }

        let floor = cfg.min_stop.floor(at_entry.atr);
        let distance = (entry_price - stop).abs();
        let mut stop_widened = false;
        if distance < floor {
            match cfg.min_stop.policy {
                MinStopPolicy::Skip => return Err(DropReason::StopBelowMinimum),
                MinStopPolicy::Widen => {
                    let delta = floor - distance;
                    stop -= sign * delta;
                    target += sign * delta;
                    stop_widened = true;
                }
            }
        }
        let risk = (entry_price - stop).abs();

        let entry_fill_ratio = cfg.partial_fill.ratio(entry_bar.range(), self.volatility.prior_atr(e));

        let start = if cfg.allow_same_bar_exit && cfg.entry_timing != EntryTiming::SignalClose {
            e
        } else {
            e + 1
        };
        let levels = ExitLevels {
            side,
            stop,
            target,
            half_spread,
        };

        let (exit_index, exit_price, exit_reason, exit_slippage, exit_commission, news_spike_exit, exit_fill_ratio) =
            match scan_exit(self.bars, start, e, &levels, cfg.exit_mode, cfg.tie_breaker) {
                Some(hit) => {
                    let at_exit = self.costs(hit.index, hit.price, raw.atr);
                    let slippage = match (hit.reason, cfg.exit_mode) {
                        (_, ExitMode::Close) | (ExitReason::Sl, _) => at_exit.slippage,
                        _ => 0.0,
                    };
                    let price = FillAction::exit(side).pay(hit.price, slippage);
                    let ratio = if cfg.partial_fill.apply_on_exit {
                        cfg.partial_fill.ratio(
                            self.bars[hit.index].range(),
                            self.volatility.prior_atr(hit.index),
                        )
                    } else {
                        1.0
                    };
                    (
                        hit.index,
                        price,
                        hit.reason,
                        slippage,
                        at_exit.commission,
                        at_exit.news_spike,
                        ratio,
                    )
                }
                None => {
                    // Mark to market on the last known close, at the exit quote.
                    let (index, close) = self.bars[e..]
                        .iter()
                        .enumerate()
                        .rev()
                        .find(|(_, b)| b.close.is_finite())
                        .map(|(k, b)| (e + k, b.close))
                        .unwrap_or((e, fill.price));
                    let price = FillAction::exit(side).pay(close, half_spread);
                    let commission = self.costs(index, price, raw.atr).commission;
                    (index, price, ExitReason::Open, 0.0, commission, false, 1.0)
                }
            };

        let fill_ratio = entry_fill_ratio.min(exit_fill_ratio);
        let commission = CommissionBreakdown {
            entry: at_entry.commission,
            exit: exit_commission,
            total: at_entry.commission + exit_commission,
        };
        let r_multiple = (sign * (exit_price - entry_price) * fill_ratio - commission.total) / risk;

        Ok(SimulatedTrade {
            raw: raw.clone(),
            entry_index: e,
            entry_time: entry_bar.timestamp,
            entry_price,
            stop_loss: stop,
            take_profit: target,
            risk,
            exit_index,
            exit_time: self.bars[exit_index].timestamp,
            exit_price,
            outcome: exit_reason.outcome(),
            exit_reason,
            r_multiple,
            bars_held: exit_index - e,
            diagnostics: ExecutionDiagnostics {
                session: at_entry.session,
                spread: at_entry.spread,
                entry_slippage,
                exit_slippage,
                volatility_regime: at_entry.regime,
                volatility_multiplier: at_entry.multiplier,
                commission,
                entry_fill_ratio,
                exit_fill_ratio,
                fill_ratio,
                news_spike_entry: at_entry.news_spike,
                news_spike_exit,
                stop_widened,
                bars_waited: fill.bars_waited,
            },
        })
    }
}
