//! Execution simulator: resolves raw trade candidates into realized trades.
//!
//! Per trade:
//! 1. entry resolution (timing, delay, market / limit / stop, pending wait)
//! 2. session filter and per-bar costs (spread, slippage, commission)
//! 3. minimum stop enforcement (skip or widen)
//! 4. partial fill ratio
//! 5. outcome scan with a deterministic stop/target tie-break
//! 6. net R-multiple
//!
//! Expected absence (no entry bar, unfilled order, filtered session, stop
//! under the minimum) drops the trade and is counted, never raised.

pub mod cost_model;
pub mod entry;
pub mod path_policy;
pub mod simulator;
pub mod volatility;

pub use cost_model::{Commission, FillAction, PriceCost};
pub use entry::{resolve_entry, EntryFill};
pub use path_policy::{check_bar, scan_exit, ExitHit, ExitLevels, ExitMode, TieBreaker};
pub use simulator::{simulate, simulate_with_report, DropReason, SimulationReport};
pub use volatility::{is_news_spike, VolatilityConfig, VolatilityModel, VolatilityReading};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::Session;
use crate::error::ConfigError;
use crate::sanitize;

/// Which bar and price a market entry uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryTiming {
    /// Close of the signal bar (plus delay). The entry bar is never an exit bar.
    SignalClose,
    /// Open of the proposed entry bar (plus delay).
    #[default]
    NextBarOpen,
}

/// Entry order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrder {
    #[default]
    Market,
    /// Fill when price retreats to the proposed entry price. No slippage.
    #[serde(alias = "lmt")]
    Limit,
    /// Fill when price breaks through the proposed entry price.
    #[serde(alias = "stp")]
    Stop,
}

impl FromStr for EntryOrder {
    type Err = ConfigError;

    /// `limit`/`lmt` and `stop`/`stp`; anything else blank is market.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "market" | "mkt" => Ok(EntryOrder::Market),
            "limit" | "lmt" => Ok(EntryOrder::Limit),
            "stop" | "stp" => Ok(EntryOrder::Stop),
            other => Err(ConfigError::InvalidValue {
                field: "entry_order",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EntryOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryOrder::Market => "market",
            EntryOrder::Limit => "limit",
            EntryOrder::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// What happens to a trade whose stop is closer than the minimum distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinStopPolicy {
    #[default]
    Skip,
    /// Push stop and target outward by the same amount.
    Widen,
}

/// Minimum stop distance: `max(value, ATR × atr_mult)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinStopConfig {
    pub value: f64,
    pub atr_mult: f64,
    pub policy: MinStopPolicy,
}

impl Default for MinStopConfig {
    fn default() -> Self {
        Self {
            value: 0.0,
            atr_mult: 0.0,
            policy: MinStopPolicy::Skip,
        }
    }
}

impl MinStopConfig {
    /// Floor for the stop distance, 0 when disabled.
    pub fn floor(&self, atr: Option<f64>) -> f64 {
        self.value.max(atr.map_or(0.0, |a| a * self.atr_mult))
    }
}

/// Reduced fills on wide bars. `min_ratio` has no default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialFillConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Bars with range >= `ATR × atr_mult` fill at `ATR × atr_mult / range`.
    #[serde(default = "default_partial_fill_atr_mult")]
    pub atr_mult: f64,
    pub min_ratio: f64,
    #[serde(default)]
    pub apply_on_exit: bool,
}

fn default_partial_fill_atr_mult() -> f64 {
    2.0
}

impl PartialFillConfig {
    pub fn new(min_ratio: f64) -> Self {
        Self {
            enabled: false,
            atr_mult: default_partial_fill_atr_mult(),
            min_ratio,
            apply_on_exit: false,
        }
    }

    /// Fill ratio for a bar of `range` given the prior ATR.
    pub fn ratio(&self, range: Option<f64>, atr: Option<f64>) -> f64 {
        if !self.enabled {
            return 1.0;
        }
        match (range, atr) {
            (Some(range), Some(atr)) if range > 0.0 => {
                let threshold = atr * self.atr_mult;
                if range >= threshold {
                    (threshold / range).clamp(self.min_ratio, 1.0)
                } else {
                    1.0
                }
            }
            _ => 1.0,
        }
    }
}

/// News spike detection and cost amplification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsSpikeConfig {
    pub enabled: bool,
    pub atr_mult: f64,
    pub spread_mult: f64,
    pub slippage_mult: f64,
}

impl Default for NewsSpikeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            atr_mult: 3.0,
            spread_mult: 2.0,
            slippage_mult: 2.0,
        }
    }
}

/// Per-session cost adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOverride {
    pub spread_mult: f64,
    pub slippage_mult: f64,
    /// Replaces the commission model with `price × bps / 10_000` per fill.
    pub commission_bps: Option<f64>,
}

impl Default for SessionOverride {
    fn default() -> Self {
        Self {
            spread_mult: 1.0,
            slippage_mult: 1.0,
            commission_bps: None,
        }
    }
}

/// Session filter and cost overrides, keyed by session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions in which entries are allowed. Empty allows all.
    pub allowed: BTreeSet<Session>,
    pub overrides: BTreeMap<Session, SessionOverride>,
}

impl SessionConfig {
    pub fn allows(&self, session: Session) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&session)
    }

    pub fn override_for(&self, session: Session) -> SessionOverride {
        self.overrides.get(&session).copied().unwrap_or_default()
    }
}

/// Full execution configuration.
///
/// `tie_breaker` and `partial_fill.min_ratio` are required: there is no
/// universally right default for either, so callers must choose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub entry_timing: EntryTiming,
    #[serde(default)]
    pub entry_order: EntryOrder,
    #[serde(default)]
    pub entry_delay_bars: usize,
    #[serde(default = "default_max_entry_wait_bars")]
    pub max_entry_wait_bars: usize,
    #[serde(default)]
    pub exit_mode: ExitMode,
    #[serde(default)]
    pub spread: PriceCost,
    #[serde(default)]
    pub slippage: PriceCost,
    #[serde(default)]
    pub commission: Commission,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    #[serde(default)]
    pub min_stop: MinStopConfig,
    pub partial_fill: PartialFillConfig,
    #[serde(default)]
    pub news_spike: NewsSpikeConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    pub tie_breaker: TieBreaker,
    #[serde(default = "default_allow_same_bar_exit")]
    pub allow_same_bar_exit: bool,
}

fn default_max_entry_wait_bars() -> usize {
    5
}

/// Upper bound for `entry_delay_bars` and `max_entry_wait_bars`.
pub const MAX_ENTRY_OFFSET_BARS: usize = 100_000;

fn default_allow_same_bar_exit() -> bool {
    true
}

impl ExecutionConfig {
    /// Frictionless market entries at the next open, with the two required
    /// choices supplied.
    pub fn new(tie_breaker: TieBreaker, partial_fill_min_ratio: f64) -> Self {
        Self {
            entry_timing: EntryTiming::default(),
            entry_order: EntryOrder::default(),
            entry_delay_bars: 0,
            max_entry_wait_bars: default_max_entry_wait_bars(),
            exit_mode: ExitMode::default(),
            spread: PriceCost::None,
            slippage: PriceCost::None,
            commission: Commission::None,
            volatility: VolatilityConfig::default(),
            min_stop: MinStopConfig::default(),
            partial_fill: PartialFillConfig::new(partial_fill_min_ratio),
            news_spike: NewsSpikeConfig::default(),
            sessions: SessionConfig::default(),
            tie_breaker,
            allow_same_bar_exit: default_allow_same_bar_exit(),
        }
    }

    /// Clamp out-of-range values to safe ones. Never fails.
    pub fn sanitized(self) -> Self {
        let pf = self.partial_fill;
        let partial_fill = PartialFillConfig {
            atr_mult: sanitize::positive("partial_fill.atr_mult", pf.atr_mult, default_partial_fill_atr_mult()),
            min_ratio: sanitize::within("partial_fill.min_ratio", pf.min_ratio, 0.0, 1.0, 1.0),
            ..pf
        };

        let ns = self.news_spike;
        let news_defaults = NewsSpikeConfig::default();
        let news_spike = NewsSpikeConfig {
            atr_mult: sanitize::positive("news_spike.atr_mult", ns.atr_mult, news_defaults.atr_mult),
            spread_mult: sanitize::non_negative("news_spike.spread_mult", ns.spread_mult, 1.0),
            slippage_mult: sanitize::non_negative("news_spike.slippage_mult", ns.slippage_mult, 1.0),
            ..ns
        };

        let min_stop = MinStopConfig {
            value: sanitize::non_negative("min_stop.value", self.min_stop.value, 0.0),
            atr_mult: sanitize::non_negative("min_stop.atr_mult", self.min_stop.atr_mult, 0.0),
            ..self.min_stop
        };

        let overrides = self
            .sessions
            .overrides
            .into_iter()
            .map(|(session, o)| {
                let bps = o.commission_bps.and_then(|b| {
                    if b.is_finite() && b >= 0.0 {
                        Some(b)
                    } else {
                        warn!(?session, bps = b, "session commission_bps must be >= 0, ignored");
                        None
                    }
                });
                let o = SessionOverride {
                    spread_mult: sanitize::non_negative("sessions.overrides.spread_mult", o.spread_mult, 1.0),
                    slippage_mult: sanitize::non_negative(
                        "sessions.overrides.slippage_mult",
                        o.slippage_mult,
                        1.0,
                    ),
                    commission_bps: bps,
                };
                (session, o)
            })
            .collect();

        Self {
            entry_delay_bars: sanitize::at_most("entry_delay_bars", self.entry_delay_bars, MAX_ENTRY_OFFSET_BARS),
            max_entry_wait_bars: sanitize::at_most(
                "max_entry_wait_bars",
                self.max_entry_wait_bars,
                MAX_ENTRY_OFFSET_BARS,
            ),
            spread: self.spread.sanitized("spread"),
            slippage: self.slippage.sanitized("slippage"),
            commission: self.commission.sanitized(),
            volatility: self.volatility.sanitized(),
            min_stop,
            partial_fill,
            news_spike,
            sessions: SessionConfig {
                allowed: self.sessions.allowed,
                overrides,
            },
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_must_be_present() {
        let missing_tie = r#"{"partial_fill": {"min_ratio": 0.5}}"#;
        assert!(serde_json::from_str::<ExecutionConfig>(missing_tie).is_err());

        let missing_ratio = r#"{"tie_breaker": "sl", "partial_fill": {"enabled": true}}"#;
        assert!(serde_json::from_str::<ExecutionConfig>(missing_ratio).is_err());

        let ok = r#"{"tie_breaker": "favor_tp", "partial_fill": {"min_ratio": 0.5}}"#;
        let cfg: ExecutionConfig = serde_json::from_str(ok).unwrap();
        assert_eq!(cfg.tie_breaker, TieBreaker::Tp);
        assert_eq!(cfg, ExecutionConfig::new(TieBreaker::Tp, 0.5));
    }

    #[test]
    fn entry_order_aliases() {
        assert_eq!("LMT".parse::<EntryOrder>().unwrap(), EntryOrder::Limit);
        assert_eq!("stp".parse::<EntryOrder>().unwrap(), EntryOrder::Stop);
        assert_eq!("".parse::<EntryOrder>().unwrap(), EntryOrder::Market);
        assert!("iceberg".parse::<EntryOrder>().is_err());
        let o: EntryOrder = serde_json::from_str("\"lmt\"").unwrap();
        assert_eq!(o, EntryOrder::Limit);
    }

    #[test]
    fn partial_fill_ratio_floor() {
        let pf = PartialFillConfig {
            enabled: true,
            atr_mult: 1.0,
            ..PartialFillConfig::new(0.5)
        };
        assert_eq!(pf.ratio(Some(8.0), Some(2.0)), 0.5);
        assert_eq!(pf.ratio(Some(3.0), Some(2.0)), 2.0 / 3.0);
        assert_eq!(pf.ratio(Some(1.0), Some(2.0)), 1.0);
        assert_eq!(pf.ratio(Some(8.0), None), 1.0);
        assert_eq!(PartialFillConfig::new(0.5).ratio(Some(8.0), Some(2.0)), 1.0);
    }

    #[test]
    fn sanitize_clamps_min_ratio_and_costs() {
        let mut cfg = ExecutionConfig::new(TieBreaker::Sl, 1.7);
        cfg.slippage = PriceCost::Flat { value: -0.1 };
        cfg.min_stop.atr_mult = -1.0;
        let cfg = cfg.sanitized();
        assert_eq!(cfg.partial_fill.min_ratio, 1.0);
        assert_eq!(cfg.slippage, PriceCost::Flat { value: 0.0 });
        assert_eq!(cfg.min_stop.atr_mult, 0.0);
    }

    #[test]
    fn sanitize_bounds_entry_offsets() {
        let cfg = ExecutionConfig {
            entry_delay_bars: usize::MAX,
            max_entry_wait_bars: usize::MAX,
            ..ExecutionConfig::new(TieBreaker::Sl, 0.5)
        }
        .sanitized();
        assert_eq!(cfg.entry_delay_bars, MAX_ENTRY_OFFSET_BARS);
        assert_eq!(cfg.max_entry_wait_bars, MAX_ENTRY_OFFSET_BARS);

        let untouched = ExecutionConfig {
            entry_delay_bars: 3,
            ..ExecutionConfig::new(TieBreaker::Sl, 0.5)
        }
        .sanitized();
        assert_eq!((untouched.entry_delay_bars, untouched.max_entry_wait_bars), (3, 5));
    }

    #[test]
    fn session_overrides_are_a_table() {
        let json = r#"{
            "tie_breaker": "sl",
            "partial_fill": {"min_ratio": 0.5},
            "sessions": {
                "allowed": ["london", "overlap"],
                "overrides": {"asia": {"spread_mult": 2.0, "commission_bps": 1.5}}
            }
        }"#;
        let cfg: ExecutionConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.sessions.allows(Session::London));
        assert!(!cfg.sessions.allows(Session::Asia));
        let asia = cfg.sessions.override_for(Session::Asia);
        assert_eq!(asia.spread_mult, 2.0);
        assert_eq!(asia.slippage_mult, 1.0);
        assert_eq!(asia.commission_bps, Some(1.5));
        assert_eq!(cfg.sessions.override_for(Session::NewYork), SessionOverride::default());
    }

    #[test]
    fn min_stop_floor() {
        let ms = MinStopConfig {
            value: 0.5,
            atr_mult: 0.5,
            policy: MinStopPolicy::Widen,
        };
        assert_eq!(ms.floor(Some(2.0)), 1.0);
        assert_eq!(ms.floor(Some(0.4)), 0.5);
        assert_eq!(ms.floor(None), 0.5);
    }
}
