//! Bar — the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// OHLCV bar at a fixed resolution.
///
/// Missing price fields are carried as `f64::NAN` rather than dropping the bar,
/// so the series keeps its positional alignment. Indicators reset their rolling
/// state on such bars instead of propagating NaN downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    #[serde(default = "missing", deserialize_with = "nan_if_null")]
    pub open: f64,
    #[serde(default = "missing", deserialize_with = "nan_if_null")]
    pub high: f64,
    #[serde(default = "missing", deserialize_with = "nan_if_null")]
    pub low: f64,
    #[serde(default = "missing", deserialize_with = "nan_if_null")]
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

fn missing() -> f64 {
    f64::NAN
}

fn nan_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    /// Returns true if any OHLC field is missing (void bar).
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// High minus low, if both are present.
    pub fn range(&self) -> Option<f64> {
        if self.high.is_finite() && self.low.is_finite() {
            Some(self.high - self.low)
        } else {
            None
        }
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
            100.0,
            105.0,
            98.0,
            103.0,
        )
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
        assert_eq!(sample_bar().range(), Some(7.0));
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
        assert_eq!(bar.range(), Some(7.0));

        bar.low = f64::NAN;
        assert_eq!(bar.range(), None);
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn null_fields_deserialize_as_missing() {
        let json = r#"{"timestamp":"2024-01-02T09:00:00Z","open":1.0,"high":null,"low":0.5,"close":0.8}"#;
        let bar: Bar = serde_json::from_str(json).unwrap();
        assert!(bar.high.is_nan());
        assert!(bar.is_void());
        assert_eq!(bar.volume, None);
    }

    #[test]
    fn omitted_fields_deserialize_as_missing() {
        let json = r#"{"timestamp":"2024-01-02T09:00:00Z","open":1.0,"high":1.2,"low":0.5}"#;
        let bar: Bar = serde_json::from_str(json).unwrap();
        assert!(bar.close.is_nan());
    }
}
