//! SetupLab Core — indicators, setup signal generators, cost-aware trade
//! simulator, statistics.
//!
//! Pipeline, each stage consuming the previous stage plus the bars:
//! - [`indicators`]: rolling ATR, SMA, EMA, RSI, channels, bias classifier
//! - [`signals`]: five setup generators, `(bars, config) -> Vec<RawTrade>`
//! - [`execution`]: resolves raw trades into fills, costs and outcomes
//! - [`stats`]: reduces simulated trades to summary statistics
//!
//! Everything here is synchronous and deterministic. No I/O, no global state,
//! and no logging subscriber: callers install their own.

pub mod domain;
pub mod error;
pub mod execution;
pub mod indicators;
pub(crate) mod sanitize;
pub mod signals;
pub mod stats;

pub use error::ConfigError;
pub use execution::{simulate, simulate_with_report, ExecutionConfig, SimulationReport};
pub use signals::{generate, StrategyConfig};
pub use stats::{summarize, BacktestStats};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: public types can cross threads, so a host can fan
    /// out independent runs.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::RawTrade>();
        require_sync::<domain::RawTrade>();
        require_send::<domain::SimulatedTrade>();
        require_sync::<domain::SimulatedTrade>();
        require_send::<StrategyConfig>();
        require_sync::<StrategyConfig>();
        require_send::<ExecutionConfig>();
        require_sync::<ExecutionConfig>();
        require_send::<SimulationReport>();
        require_sync::<SimulationReport>();
        require_send::<BacktestStats>();
        require_sync::<BacktestStats>();
        require_send::<execution::VolatilityModel>();
        require_sync::<execution::VolatilityModel>();
        require_send::<ConfigError>();
        require_sync::<ConfigError>();
    }
}
