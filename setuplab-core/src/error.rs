//! Configuration errors.
//!
//! These are the only fatal conditions in the core. They are raised while a
//! configuration is being built, before any bar is scanned. Expected absence
//! (no signal, unfilled order) is never an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown setup '{0}' (expected one of range_breakout, break_retest, fvg_retrace, trend_pullback, mean_reversion)")]
    UnknownSetup(String),

    #[error("invalid overrides for setup '{setup}': {source}")]
    InvalidOverrides {
        setup: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("overrides for setup '{0}' must be a JSON object")]
    OverridesNotObject(String),

    #[error("invalid resolution '{0}' (expected 1m, 5m, 15m, 30m, 1h, 4h or 1d)")]
    InvalidResolution(String),

    #[error("invalid value '{value}' for {field}")]
    InvalidValue { field: &'static str, value: String },
}
