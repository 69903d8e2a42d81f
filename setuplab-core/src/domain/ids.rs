use serde::{Deserialize, Serialize};
use std::fmt;

use super::trade::{SetupKind, Side};

/// Trade ID.
///
/// Derived from the setup, the signal bar and the side, so the same input
/// always yields the same ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub String);

impl TradeId {
    pub fn new(setup: SetupKind, signal_index: usize, side: Side) -> Self {
        Self(format!("{setup}-{signal_index}-{side}"))
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_id_is_deterministic() {
        let a = TradeId::new(SetupKind::RangeBreakout, 42, Side::Long);
        let b = TradeId::new(SetupKind::RangeBreakout, 42, Side::Long);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "range_breakout-42-long");
    }

    #[test]
    fn trade_id_differs_by_side() {
        let a = TradeId::new(SetupKind::MeanReversion, 7, Side::Long);
        let b = TradeId::new(SetupKind::MeanReversion, 7, Side::Short);
        assert_ne!(a, b);
    }
}
