//! Cost model: spread, slippage and commission.
//!
//! All amounts are in price units for one unit of size. Spread and slippage
//! are applied directionally: a buy pays more, a sell receives less. Half the
//! spread is paid on each fill; slippage is paid by market and stop fills and
//! never by limit fills.

use serde::{Deserialize, Serialize};

use crate::domain::Side;
use crate::sanitize;

/// A price-level cost (spread or slippage).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PriceCost {
    #[default]
    None,
    /// Fixed amount in price units.
    Flat { value: f64 },
    /// Percent of the fill price (0.01 = one basis point).
    Percent { pct: f64 },
    /// Multiple of the ATR in effect at the fill bar.
    Atr { mult: f64 },
}

impl PriceCost {
    /// Cost at `price`. ATR-scaled costs are zero when no ATR is available.
    pub fn amount(&self, price: f64, atr: Option<f64>) -> f64 {
        match *self {
            PriceCost::None => 0.0,
            PriceCost::Flat { value } => value,
            PriceCost::Percent { pct } => price.abs() * pct / 100.0,
            PriceCost::Atr { mult } => atr.map_or(0.0, |a| a * mult),
        }
    }

    pub fn sanitized(self, field: &'static str) -> Self {
        match self {
            PriceCost::None => PriceCost::None,
            PriceCost::Flat { value } => PriceCost::Flat {
                value: sanitize::non_negative(field, value, 0.0),
            },
            PriceCost::Percent { pct } => PriceCost::Percent {
                pct: sanitize::non_negative(field, pct, 0.0),
            },
            PriceCost::Atr { mult } => PriceCost::Atr {
                mult: sanitize::non_negative(field, mult, 0.0),
            },
        }
    }
}

/// Commission charged per side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Commission {
    #[default]
    None,
    /// Fixed amount in price units per fill.
    Flat { value: f64 },
    /// Percent of the fill price per fill.
    Percent { pct: f64 },
}

impl Commission {
    pub fn amount(&self, price: f64) -> f64 {
        match *self {
            Commission::None => 0.0,
            Commission::Flat { value } => value,
            Commission::Percent { pct } => price.abs() * pct / 100.0,
        }
    }

    pub fn sanitized(self) -> Self {
        match self {
            Commission::None => Commission::None,
            Commission::Flat { value } => Commission::Flat {
                value: sanitize::non_negative("commission.value", value, 0.0),
            },
            Commission::Percent { pct } => Commission::Percent {
                pct: sanitize::non_negative("commission.pct", pct, 0.0),
            },
        }
    }
}

/// Direction of a single fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillAction {
    Buy,
    Sell,
}

impl FillAction {
    pub fn entry(side: Side) -> Self {
        match side {
            Side::Long => FillAction::Buy,
            Side::Short => FillAction::Sell,
        }
    }

    pub fn exit(side: Side) -> Self {
        match side {
            Side::Long => FillAction::Sell,
            Side::Short => FillAction::Buy,
        }
    }

    /// Move `price` against the trader by `cost`.
    pub fn pay(self, price: f64, cost: f64) -> f64 {
        match self {
            FillAction::Buy => price + cost,
            FillAction::Sell => price - cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_costs_nothing() {
        assert_eq!(PriceCost::None.amount(100.0, Some(2.0)), 0.0);
        assert_eq!(Commission::None.amount(100.0), 0.0);
    }

    #[test]
    fn percent_scales_with_price() {
        let c = PriceCost::Percent { pct: 0.1 };
        assert!((c.amount(200.0, None) - 0.2).abs() < 1e-12);
        let fee = Commission::Percent { pct: 0.05 };
        assert!((fee.amount(100.0) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn atr_cost_needs_atr() {
        let c = PriceCost::Atr { mult: 0.5 };
        assert_eq!(c.amount(100.0, Some(4.0)), 2.0);
        assert_eq!(c.amount(100.0, None), 0.0);
    }

    #[test]
    fn pay_is_adverse() {
        assert_eq!(FillAction::entry(Side::Long).pay(100.0, 0.5), 100.5);
        assert_eq!(FillAction::exit(Side::Long).pay(100.0, 0.5), 99.5);
        assert_eq!(FillAction::entry(Side::Short).pay(100.0, 0.5), 99.5);
        assert_eq!(FillAction::exit(Side::Short).pay(100.0, 0.5), 100.5);
    }

    #[test]
    fn negative_costs_clamped() {
        assert_eq!(PriceCost::Flat { value: -1.0 }.sanitized("spread"), PriceCost::Flat { value: 0.0 });
        assert_eq!(Commission::Percent { pct: f64::NAN }.sanitized(), Commission::Percent { pct: 0.0 });
    }

    #[test]
    fn deserializes_tagged() {
        let c: PriceCost = serde_json::from_str(r#"{"model": "atr", "mult": 0.1}"#).unwrap();
        assert_eq!(c, PriceCost::Atr { mult: 0.1 });
        let f: Commission = serde_json::from_str(r#"{"model": "flat", "value": 0.02}"#).unwrap();
        assert_eq!(f, Commission::Flat { value: 0.02 });
    }
}
