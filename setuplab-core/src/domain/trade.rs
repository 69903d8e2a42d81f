//! Trade records: raw setup candidates and their simulated outcomes.
//!
//! A [`RawTrade`] is what a signal generator proposes. A [`SimulatedTrade`]
//! is that candidate after the execution simulator resolved the fill, costs
//! and exit. The simulated record embeds its raw trade by value, so there is
//! no positional cross-reference between the two lists.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TradeId;
use super::session::Session;
use crate::error::ConfigError;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl FromStr for Side {
    type Err = ConfigError;

    /// Accepts broker-style aliases: `BUY`, `LONG`, `B`, `SELL`, `SHORT`, `S`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "LONG" | "B" => Ok(Side::Long),
            "SELL" | "SHORT" | "S" => Ok(Side::Short),
            other => Err(ConfigError::InvalidValue {
                field: "side",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Strategy identifier. One per signal generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupKind {
    RangeBreakout,
    BreakRetest,
    FvgRetrace,
    TrendPullback,
    MeanReversion,
}

impl SetupKind {
    pub const ALL: [SetupKind; 5] = [
        SetupKind::RangeBreakout,
        SetupKind::BreakRetest,
        SetupKind::FvgRetrace,
        SetupKind::TrendPullback,
        SetupKind::MeanReversion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SetupKind::RangeBreakout => "range_breakout",
            SetupKind::BreakRetest => "break_retest",
            SetupKind::FvgRetrace => "fvg_retrace",
            SetupKind::TrendPullback => "trend_pullback",
            SetupKind::MeanReversion => "mean_reversion",
        }
    }
}

impl FromStr for SetupKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        SetupKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .ok_or_else(|| ConfigError::UnknownSetup(s.to_string()))
    }
}

impl fmt::Display for SetupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Setup-specific diagnostics attached to a raw trade.
///
/// One variant per setup, so a `match` over it is checked for exhaustiveness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "setup", rename_all = "snake_case")]
pub enum SetupDetail {
    RangeBreakout {
        range_high: f64,
        range_low: f64,
        breakout_level: f64,
    },
    BreakRetest {
        level: f64,
        breakout_index: usize,
        retest_index: usize,
    },
    FvgRetrace {
        zone_low: f64,
        zone_high: f64,
        gap_size: f64,
    },
    TrendPullback {
        ema_fast: f64,
        ema_slow: f64,
        pullback_ema: f64,
        trend_bars: usize,
    },
    MeanReversion {
        mean: f64,
        upper_band: f64,
        lower_band: f64,
        rsi: Option<f64>,
    },
}

impl SetupDetail {
    pub fn kind(&self) -> SetupKind {
        match self {
            SetupDetail::RangeBreakout { .. } => SetupKind::RangeBreakout,
            SetupDetail::BreakRetest { .. } => SetupKind::BreakRetest,
            SetupDetail::FvgRetrace { .. } => SetupKind::FvgRetrace,
            SetupDetail::TrendPullback { .. } => SetupKind::TrendPullback,
            SetupDetail::MeanReversion { .. } => SetupKind::MeanReversion,
        }
    }
}

/// An unexecuted trade candidate proposed by a signal generator.
///
/// # Invariants
/// - `entry_index >= signal_index`
/// - long: `stop_loss < entry_price < take_profit`; short: reversed
/// - `risk == |entry_price - stop_loss| > 0`
///
/// The only constructor, [`RawTrade::new`], refuses candidates that break them.
///
/// A candidate with a [`RestingLimit`] may have `entry_index == bars.len()`
/// when its signal bar is the last one: the order is placed but no bar can
/// trade it yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrade {
    pub id: TradeId,
    pub side: Side,
    pub signal_index: usize,
    pub entry_index: usize,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk: f64,
    pub atr: Option<f64>,
    pub detail: SetupDetail,
    /// Set when the setup rests its own limit order at `entry_price` instead
    /// of entering at market. Overrides the execution config's order type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resting: Option<RestingLimit>,
}

/// A limit order at the candidate's entry price, working from `entry_index`
/// through `wait_bars` more bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingLimit {
    pub wait_bars: usize,
}

impl RawTrade {
    /// Build a candidate, or `None` if its geometry is invalid.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        detail: SetupDetail,
        side: Side,
        signal_index: usize,
        entry_index: usize,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        atr: Option<f64>,
    ) -> Option<Self> {
        if entry_index < signal_index {
            return None;
        }
        if !price_order_holds(side, stop_loss, entry_price, take_profit) {
            return None;
        }
        let id = TradeId::new(detail.kind(), signal_index, side);
        Some(Self {
            id,
            side,
            signal_index,
            entry_index,
            entry_price,
            stop_loss,
            take_profit,
            risk: (entry_price - stop_loss).abs(),
            atr: atr.filter(|v| v.is_finite()),
            detail,
            resting: None,
        })
    }

    /// Turn the candidate into a resting limit order at its entry price.
    pub fn resting_limit(mut self, wait_bars: usize) -> Self {
        self.resting = Some(RestingLimit { wait_bars });
        self
    }

    pub fn setup(&self) -> SetupKind {
        self.detail.kind()
    }

    /// Target distance over stop distance.
    pub fn reward_risk(&self) -> f64 {
        (self.take_profit - self.entry_price).abs() / self.risk
    }
}

/// Strict `stop < entry < target` for longs (reversed for shorts), all finite.
pub fn price_order_holds(side: Side, stop: f64, entry: f64, target: f64) -> bool {
    if !(stop.is_finite() && entry.is_finite() && target.is_finite()) {
        return false;
    }
    match side {
        Side::Long => stop < entry && entry < target,
        Side::Short => target < entry && entry < stop,
    }
}

/// Realized result of a simulated trade.
///
/// Follows the exit reason alone: a target exit is a `Win` and a stop exit a
/// `Loss`, whatever the net R. Commission and partial fills can leave a `Win`
/// with negative `r_multiple` (or a widened-stop `Loss` near zero), and such
/// trades still count toward `wins` and `avg_win_r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Open,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Open => "open",
        }
    }
}

/// Why the simulated trade ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Tp,
    Sl,
    Open,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Tp => "tp",
            ExitReason::Sl => "sl",
            ExitReason::Open => "open",
        }
    }

    pub fn outcome(self) -> Outcome {
        match self {
            ExitReason::Tp => Outcome::Win,
            ExitReason::Sl => Outcome::Loss,
            ExitReason::Open => Outcome::Open,
        }
    }
}

/// Volatility regime of a bar relative to its trailing ATR reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Low,
    Mid,
    High,
}

/// Commission charged per side, in price units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub entry: f64,
    pub exit: f64,
    pub total: f64,
}

/// Cost and fill details recorded by the simulator for one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDiagnostics {
    pub session: Session,
    /// Full bid/ask spread snapshotted at entry (half is paid on each fill).
    pub spread: f64,
    pub entry_slippage: f64,
    pub exit_slippage: f64,
    pub volatility_regime: VolatilityRegime,
    pub volatility_multiplier: f64,
    pub commission: CommissionBreakdown,
    pub entry_fill_ratio: f64,
    pub exit_fill_ratio: f64,
    pub fill_ratio: f64,
    pub news_spike_entry: bool,
    pub news_spike_exit: bool,
    pub stop_widened: bool,
    /// Bars between the first eligible entry bar and the fill (pending orders).
    pub bars_waited: usize,
}

/// A raw trade resolved by the execution simulator.
///
/// `stop_loss`, `take_profit` and `risk` are the realized values: they differ
/// from the raw trade when the stop was widened or the fill price moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub raw: RawTrade,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk: f64,
    pub exit_index: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub outcome: Outcome,
    pub exit_reason: ExitReason,
    /// Net R: `(signed move * fill_ratio - commission) / risk`.
    pub r_multiple: f64,
    pub bars_held: usize,
    pub diagnostics: ExecutionDiagnostics,
}

impl SimulatedTrade {
    pub fn side(&self) -> Side {
        self.raw.side
    }

    pub fn setup(&self) -> SetupKind {
        self.raw.setup()
    }

    pub fn is_closed(&self) -> bool {
        self.outcome != Outcome::Open
    }
}
