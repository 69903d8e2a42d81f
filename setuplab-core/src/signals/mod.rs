//! Signal generators: `(bars, config) -> Vec<RawTrade>`.
//!
//! Five setups, one module each. Every generator is a pure function of the bar
//! series and its config:
//! - a disabled config yields no trades
//! - a series too short for warm-up yields no trades
//! - after an accepted signal at bar `s`, nothing fires before `s + cooldown_bars + 1`
//! - an optional higher-timeframe bias filter vetoes counter-trend signals
//!
//! Configs are one tagged variant per setup, so dispatch in [`generate`] is an
//! exhaustive `match`.

pub mod break_retest;
pub mod fvg_retrace;
pub mod mean_reversion;
pub mod range_breakout;
pub mod trend_pullback;

pub use break_retest::BreakRetestConfig;
pub use fvg_retrace::{FvgEntry, FvgRetraceConfig};
pub use mean_reversion::{MeanReversionConfig, ReversionTarget, RsiFilter};
pub use range_breakout::RangeBreakoutConfig;
pub use trend_pullback::{PullbackEma, TrendPullbackConfig};

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::{Bar, RawTrade, SetupKind, Side};
use crate::error::ConfigError;
use crate::indicators::{htf_bias, Bias, BiasFilter};

/// How a breakout is confirmed against a range bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// Bar close beyond the bound.
    #[default]
    Close,
    /// Bar high (long) or low (short) beyond the bound.
    Wick,
}

/// How price must interact with a level to count as a test of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchMode {
    /// The bar's wick reaches the level.
    #[default]
    Touch,
    /// The bar closes at (or through) the level.
    Close,
}

/// Strategy configuration, tagged by setup id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "setup", rename_all = "snake_case")]
pub enum StrategyConfig {
    RangeBreakout(RangeBreakoutConfig),
    BreakRetest(BreakRetestConfig),
    FvgRetrace(FvgRetraceConfig),
    TrendPullback(TrendPullbackConfig),
    MeanReversion(MeanReversionConfig),
}

impl StrategyConfig {
    /// Default parameters for `kind`.
    pub fn defaults(kind: SetupKind) -> Self {
        match kind {
            SetupKind::RangeBreakout => StrategyConfig::RangeBreakout(Default::default()),
            SetupKind::BreakRetest => StrategyConfig::BreakRetest(Default::default()),
            SetupKind::FvgRetrace => StrategyConfig::FvgRetrace(Default::default()),
            SetupKind::TrendPullback => StrategyConfig::TrendPullback(Default::default()),
            SetupKind::MeanReversion => StrategyConfig::MeanReversion(Default::default()),
        }
    }

    /// Build a config from a setup id and a JSON object of parameter overrides.
    ///
    /// Omitted and unrecognized keys fall back to the setup's defaults, and
    /// out-of-range values are clamped. An unknown setup id, a non-object
    /// payload, or a value of the wrong type is a [`ConfigError`].
    pub fn build(setup_id: &str, overrides: &Value) -> Result<Self, ConfigError> {
        let kind = SetupKind::from_str(setup_id)?;
        let mut fields = match overrides {
            Value::Null => serde_json::Map::new(),
            Value::Object(map) => map.clone(),
            _ => return Err(ConfigError::OverridesNotObject(kind.to_string())),
        };
        fields.insert("setup".into(), Value::String(kind.as_str().into()));

        let config: StrategyConfig = serde_json::from_value(Value::Object(fields)).map_err(
            |source| ConfigError::InvalidOverrides {
                setup: kind.to_string(),
                source,
            },
        )?;
        Ok(config.sanitized())
    }

    pub fn kind(&self) -> SetupKind {
        match self {
            StrategyConfig::RangeBreakout(_) => SetupKind::RangeBreakout,
            StrategyConfig::BreakRetest(_) => SetupKind::BreakRetest,
            StrategyConfig::FvgRetrace(_) => SetupKind::FvgRetrace,
            StrategyConfig::TrendPullback(_) => SetupKind::TrendPullback,
            StrategyConfig::MeanReversion(_) => SetupKind::MeanReversion,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            StrategyConfig::RangeBreakout(c) => c.enabled,
            StrategyConfig::BreakRetest(c) => c.enabled,
            StrategyConfig::FvgRetrace(c) => c.enabled,
            StrategyConfig::TrendPullback(c) => c.enabled,
            StrategyConfig::MeanReversion(c) => c.enabled,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        match self {
            StrategyConfig::RangeBreakout(c) => c.enabled = enabled,
            StrategyConfig::BreakRetest(c) => c.enabled = enabled,
            StrategyConfig::FvgRetrace(c) => c.enabled = enabled,
            StrategyConfig::TrendPullback(c) => c.enabled = enabled,
            StrategyConfig::MeanReversion(c) => c.enabled = enabled,
        }
    }

    /// The strategy's higher-timeframe bias filter, if one is attached.
    pub fn bias_filter_mut(&mut self) -> Option<&mut BiasFilter> {
        match self {
            StrategyConfig::RangeBreakout(c) => c.bias_filter.as_mut(),
            StrategyConfig::BreakRetest(c) => c.bias_filter.as_mut(),
            StrategyConfig::FvgRetrace(c) => c.bias_filter.as_mut(),
            StrategyConfig::TrendPullback(c) => c.bias_filter.as_mut(),
            StrategyConfig::MeanReversion(c) => c.bias_filter.as_mut(),
        }
    }

    pub fn sanitized(self) -> Self {
        match self {
            StrategyConfig::RangeBreakout(c) => StrategyConfig::RangeBreakout(c.sanitized()),
            StrategyConfig::BreakRetest(c) => StrategyConfig::BreakRetest(c.sanitized()),
            StrategyConfig::FvgRetrace(c) => StrategyConfig::FvgRetrace(c.sanitized()),
            StrategyConfig::TrendPullback(c) => StrategyConfig::TrendPullback(c.sanitized()),
            StrategyConfig::MeanReversion(c) => StrategyConfig::MeanReversion(c.sanitized()),
        }
    }
}

/// Run the generator selected by `config` over `bars`.
pub fn generate(bars: &[Bar], config: &StrategyConfig) -> Vec<RawTrade> {
    if !config.enabled() {
        debug!(setup = %config.kind(), "strategy disabled");
        return Vec::new();
    }
    let trades = match config.clone().sanitized() {
        StrategyConfig::RangeBreakout(c) => range_breakout::generate(bars, &c),
        StrategyConfig::BreakRetest(c) => break_retest::generate(bars, &c),
        StrategyConfig::FvgRetrace(c) => fvg_retrace::generate(bars, &c),
        StrategyConfig::TrendPullback(c) => trend_pullback::generate(bars, &c),
        StrategyConfig::MeanReversion(c) => mean_reversion::generate(bars, &c),
    };
    debug!(setup = %config.kind(), bars = bars.len(), trades = trades.len(), "signals generated");
    trades
}

/// Post-signal cooldown counter.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cooldown {
    bars: usize,
    next_allowed: usize,
}

impl Cooldown {
    pub(crate) fn new(bars: usize) -> Self {
        Self {
            bars,
            next_allowed: 0,
        }
    }

    pub(crate) fn ready(&self, index: usize) -> bool {
        index >= self.next_allowed
    }

    /// Block signals up to and including `signal_index + bars`.
    pub(crate) fn arm(&mut self, signal_index: usize) {
        self.next_allowed = signal_index + self.bars + 1;
    }
}

/// Higher-timeframe bias veto. Without a filter every side passes.
#[derive(Debug, Clone)]
pub(crate) struct BiasGate {
    bias: Option<Vec<Bias>>,
}

impl BiasGate {
    pub(crate) fn new(bars: &[Bar], filter: Option<&BiasFilter>) -> Self {
        Self {
            bias: filter.map(|f| htf_bias(bars, f)),
        }
    }

    pub(crate) fn allows(&self, index: usize, side: Side) -> bool {
        match &self.bias {
            None => true,
            Some(series) => series.get(index).is_some_and(|b| b.permits(side)),
        }
    }
}

/// Index and open of the bar after `signal_index`, if it exists and has an open.
pub(crate) fn next_open(bars: &[Bar], signal_index: usize) -> Option<(usize, f64)> {
    let entry_index = signal_index + 1;
    let open = bars.get(entry_index)?.open;
    open.is_finite().then_some((entry_index, open))
}

/// Stop `stop_distance` beyond `entry` and target `reward_risk` times that on
/// the other side.
pub(crate) fn bracket(side: Side, entry: f64, stop_distance: f64, reward_risk: f64) -> (f64, f64) {
    let s = side.sign();
    (
        entry - s * stop_distance,
        entry + s * stop_distance * reward_risk,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_applies_overrides_over_defaults() {
        let cfg = StrategyConfig::build("range_breakout", &json!({"lookback": 10, "unknown_key": 3}))
            .unwrap();
        match cfg {
            StrategyConfig::RangeBreakout(c) => {
                assert_eq!(c.lookback, 10);
                assert_eq!(c.atr_period, RangeBreakoutConfig::default().atr_period);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn build_accepts_null_overrides() {
        let cfg = StrategyConfig::build("FVG-Retrace", &Value::Null).unwrap();
        assert_eq!(cfg, StrategyConfig::defaults(SetupKind::FvgRetrace));
    }

    #[test]
    fn build_rejects_unknown_setup() {
        let err = StrategyConfig::build("head_and_shoulders", &json!({})).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSetup(_)));
    }

    #[test]
    fn build_rejects_non_object_overrides() {
        let err = StrategyConfig::build("mean_reversion", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, ConfigError::OverridesNotObject(_)));
    }

    #[test]
    fn build_rejects_wrong_types() {
        let err = StrategyConfig::build("trend_pullback", &json!({"fast_period": "twenty"}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverrides { .. }));
    }

    #[test]
    fn build_clamps_out_of_range() {
        let cfg = StrategyConfig::build(
            "range_breakout",
            &json!({"lookback": 0, "reward_risk": -2.0, "stop_atr_mult": 0.0}),
        )
        .unwrap();
        let defaults = RangeBreakoutConfig::default();
        match cfg {
            StrategyConfig::RangeBreakout(c) => {
                assert_eq!(c.lookback, defaults.lookback);
                assert_eq!(c.reward_risk, defaults.reward_risk);
                assert_eq!(c.stop_atr_mult, defaults.stop_atr_mult);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn serializes_with_setup_tag() {
        let cfg = StrategyConfig::defaults(SetupKind::MeanReversion);
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["setup"], "mean_reversion");
        assert_eq!(value["enabled"], true);
    }

    #[test]
    fn bias_filter_accessor() {
        let mut plain = StrategyConfig::defaults(SetupKind::TrendPullback);
        assert!(plain.bias_filter_mut().is_none());

        let mut gated = StrategyConfig::build("trend_pullback", &json!({"bias_filter": {"htf_ratio": 4}})).unwrap();
        if let Some(f) = gated.bias_filter_mut() {
            f.htf_ratio = 24;
        }
        match gated {
            StrategyConfig::TrendPullback(c) => assert_eq!(c.bias_filter.map(|f| f.htf_ratio), Some(24)),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn disabled_generates_nothing() {
        let bars = crate::indicators::make_bars(&(0..200).map(|i| 100.0 + (i % 17) as f64).collect::<Vec<_>>());
        for kind in SetupKind::ALL {
            let mut cfg = StrategyConfig::defaults(kind);
            cfg.set_enabled(false);
            assert!(generate(&bars, &cfg).is_empty(), "{kind} produced trades while disabled");
        }
    }

    #[test]
    fn cooldown_blocks_until_window_passes() {
        let mut cd = Cooldown::new(3);
        assert!(cd.ready(0));
        cd.arm(10);
        assert!(!cd.ready(13));
        assert!(cd.ready(14));
    }

    #[test]
    fn bracket_is_directional() {
        assert_eq!(bracket(Side::Long, 100.0, 2.0, 2.0), (98.0, 104.0));
        assert_eq!(bracket(Side::Short, 100.0, 2.0, 2.0), (102.0, 96.0));
    }

    #[test]
    fn bias_gate_without_filter_allows_all() {
        let gate = BiasGate::new(&[], None);
        assert!(gate.allows(5, Side::Long));
        assert!(gate.allows(5, Side::Short));
    }
}
