//! SetupLab Runner — run configuration, bar loading, pipeline orchestration, export.
//!
//! This crate builds on `setuplab-core` to provide:
//! - TOML run configs with a content-addressed run id
//! - CSV/JSON bar loading with normalization (sorting, de-duplication, gaps)
//! - Parallel fan-out of one pipeline per strategy
//! - JSON and trade CSV artifacts

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;

pub use config::{DataConfig, ResolvedRun, RunConfig, RunId, StrategyEntry};
pub use data_loader::{load_bars, parse_bars, BarFormat, LoadError, LoadOptions, LoadedBars};
pub use export::{export_json, export_trades_csv, import_json, load_result, save_artifacts};
pub use runner::{run, run_loaded, run_pipeline, run_strategies, RunError, RunResult, StrategyRun, SCHEMA_VERSION};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn run_result_is_send_sync() {
        assert_send::<RunResult>();
        assert_sync::<RunResult>();
    }

    #[test]
    fn strategy_run_is_send_sync() {
        assert_send::<StrategyRun>();
        assert_sync::<StrategyRun>();
    }

    #[test]
    fn run_config_is_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }
}
