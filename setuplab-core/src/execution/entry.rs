//! Entry resolution: which bar fills the order, and at what raw price.
//!
//! Prices here are mid prices. Spread and slippage are added afterwards by
//! the simulator, once the fill bar is known.

use super::simulator::DropReason;
use super::{EntryOrder, EntryTiming, ExecutionConfig};
use crate::domain::{Bar, RawTrade, Side};

/// Where and how an entry filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryFill {
    pub index: usize,
    /// Mid price before costs.
    pub price: f64,
    pub order: EntryOrder,
    pub bars_waited: usize,
}

/// Resolve the entry bar and mid fill price for `raw`.
///
/// Market orders fill on the timing bar: the proposed entry bar's open for
/// `next_bar_open`, the signal bar's close for `signal_close`, shifted by
/// `entry_delay_bars`. Limit and stop orders rest at the proposed entry price
/// for up to `max_entry_wait_bars` bars after the first eligible one.
///
/// A candidate carrying its own [`RestingLimit`](crate::domain::RestingLimit)
/// is always a limit order, working from its proposed entry bar (never
/// earlier than the bar after the signal) for its own wait window.
pub fn resolve_entry(bars: &[Bar], raw: &RawTrade, cfg: &ExecutionConfig) -> Result<EntryFill, DropReason> {
    let delay = cfg.entry_delay_bars;

    if let Some(resting) = raw.resting {
        let first = raw
            .entry_index
            .max(raw.signal_index.saturating_add(1))
            .saturating_add(delay);
        return scan_pending(bars, raw, EntryOrder::Limit, first, resting.wait_bars);
    }

    let base = match cfg.entry_timing {
        EntryTiming::NextBarOpen => raw.entry_index.saturating_add(delay),
        EntryTiming::SignalClose => raw.signal_index.saturating_add(delay),
    };

    if cfg.entry_order == EntryOrder::Market {
        let bar = bars.get(base).ok_or(DropReason::NoEntryBar)?;
        let price = match cfg.entry_timing {
            EntryTiming::NextBarOpen => bar.open,
            EntryTiming::SignalClose => bar.close,
        };
        if !price.is_finite() {
            return Err(DropReason::NoEntryBar);
        }
        return Ok(EntryFill {
            index: base,
            price,
            order: EntryOrder::Market,
            bars_waited: 0,
        });
    }

    // A resting order placed at a close can only trade from the next bar.
    let first = match cfg.entry_timing {
        EntryTiming::NextBarOpen => base,
        EntryTiming::SignalClose => base.saturating_add(1),
    };
    scan_pending(bars, raw, cfg.entry_order, first, cfg.max_entry_wait_bars)
}

/// First bar in `first..=first + wait` on which a resting order trades.
fn scan_pending(
    bars: &[Bar],
    raw: &RawTrade,
    order: EntryOrder,
    first: usize,
    wait: usize,
) -> Result<EntryFill, DropReason> {
    if first >= bars.len() {
        return Err(DropReason::NoEntryBar);
    }

    let last = first.saturating_add(wait).min(bars.len() - 1);
    (first..=last)
        .find_map(|j| {
            let bar = &bars[j];
            if bar.is_void() {
                return None;
            }
            pending_fill(bar, raw.side, order, raw.entry_price).map(|price| EntryFill {
                index: j,
                price,
                order,
                bars_waited: j - first,
            })
        })
        .ok_or(DropReason::Unfilled)
}

/// Fill price of a resting order on `bar`, if it trades.
///
/// A bar that opens through the order fills at the open: the better price for
/// a limit, the worse one for a stop.
fn pending_fill(bar: &Bar, side: Side, order: EntryOrder, price: f64) -> Option<f64> {
    match (order, side) {
        (EntryOrder::Limit, Side::Long) => (bar.low <= price).then(|| bar.open.min(price)),
        (EntryOrder::Limit, Side::Short) => (bar.high >= price).then(|| bar.open.max(price)),
        (EntryOrder::Stop, Side::Long) => (bar.high >= price).then(|| bar.open.max(price)),
        (EntryOrder::Stop, Side::Short) => (bar.low <= price).then(|| bar.open.min(price)),
        (EntryOrder::Market, _) => Some(bar.open),
    }
}
