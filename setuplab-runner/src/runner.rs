//! Pipeline runner: bars → signals → simulation → stats, per strategy.
//!
//! Entry points:
//! - `run()`: resolves a [`RunConfig`], loads bars from disk, runs every strategy. Used by the CLI.
//! - `run_strategies()`: pre-loaded bars, many strategies in parallel.
//! - `run_pipeline()`: pre-loaded bars, one strategy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use setuplab_core::domain::{Bar, RawTrade, SetupKind, SimulatedTrade};
use setuplab_core::execution::DropReason;
use setuplab_core::{generate, simulate_with_report, summarize, BacktestStats, ConfigError, ExecutionConfig, StrategyConfig};

use crate::config::{ResolvedRun, RunConfig, RunId};
use crate::data_loader::{load_bars, LoadError, LoadOptions, LoadedBars};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid run config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("cannot render config as TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no bar file given (set data.path or pass --bars)")]
    NoBars,
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Everything one strategy produced over the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRun {
    pub setup: SetupKind,
    pub config: StrategyConfig,
    pub raw_trades: Vec<RawTrade>,
    pub trades: Vec<SimulatedTrade>,
    pub drops: BTreeMap<DropReason, usize>,
    pub stats: BacktestStats,
}

/// Complete result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub bar_count: usize,
    pub void_bars: usize,
    pub dataset_hash: String,
    pub execution: ExecutionConfig,
    pub strategies: Vec<StrategyRun>,
}

/// Run one strategy over pre-loaded bars.
pub fn run_pipeline(bars: &[Bar], strategy: &StrategyConfig, execution: &ExecutionConfig) -> StrategyRun {
    let raw_trades = generate(bars, strategy);
    let report = simulate_with_report(bars, &raw_trades, execution);
    let stats = summarize(&report.trades);
    info!(
        setup = %strategy.kind(),
        raw = raw_trades.len(),
        simulated = report.trades.len(),
        dropped = report.dropped(),
        "pipeline complete"
    );
    StrategyRun {
        setup: strategy.kind(),
        config: strategy.clone(),
        raw_trades,
        trades: report.trades,
        drops: report.drops,
        stats,
    }
}

/// Run every enabled strategy in parallel. Output keeps the input order.
pub fn run_strategies(bars: &[Bar], strategies: &[StrategyConfig], execution: &ExecutionConfig) -> Vec<StrategyRun> {
    strategies
        .par_iter()
        .filter(|s| {
            if !s.enabled() {
                debug!(setup = %s.kind(), "skipping disabled strategy");
            }
            s.enabled()
        })
        .map(|s| run_pipeline(bars, s, execution))
        .collect()
}

/// Run a resolved config over already-normalized bars.
pub fn run_loaded(resolved: &ResolvedRun, loaded: &LoadedBars) -> Result<RunResult, RunError> {
    let run_id = resolved.run_id()?;
    let strategies = run_strategies(&loaded.bars, &resolved.strategies, &resolved.execution);
    Ok(RunResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        symbol: resolved.data.symbol.clone(),
        bar_count: loaded.bars.len(),
        void_bars: loaded.void_bars,
        dataset_hash: loaded.dataset_hash.clone(),
        execution: resolved.execution.clone(),
        strategies,
    })
}

/// Resolve `config`, load its bars and run every strategy.
///
/// `bars_override` replaces `data.path`; its format is then inferred from the
/// extension. The config is fully resolved before any file is read, so an
/// unknown setup id fails fast.
pub fn run(config: &RunConfig, bars_override: Option<&Path>) -> Result<RunResult, RunError> {
    let resolved = config.resolve()?;
    let (path, format) = match bars_override {
        Some(p) => (p, None),
        None => (resolved.data.path.as_deref().ok_or(RunError::NoBars)?, resolved.data.format),
    };
    let opts = LoadOptions {
        format,
        limit: resolved.data.limit,
        strict_order: resolved.data.strict_order,
    };
    let loaded = load_bars(path, &opts)?;
    info!(
        path = %path.display(),
        bars = loaded.bars.len(),
        strategies = resolved.strategies.len(),
        "bars loaded"
    );
    run_loaded(&resolved, &loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use setuplab_core::execution::TieBreaker;
    use std::io::Write;

    fn wave_bars(n: usize) -> Vec<Bar> {
        let start = chrono::DateTime::parse_from_rfc3339("2024-01-02T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.2).sin() * 8.0 + i as f64 * 0.02;
                Bar::new(
                    start + chrono::Duration::hours(i as i64),
                    close - 0.2,
                    close + 1.0,
                    close - 1.0,
                    close,
                )
            })
            .collect()
    }

    fn strategies() -> Vec<StrategyConfig> {
        vec![
            StrategyConfig::build("range_breakout", &json!({"lookback": 10})).unwrap(),
            StrategyConfig::build("mean_reversion", &json!({"period": 10, "band_atr_mult": 0.5})).unwrap(),
            StrategyConfig::build("trend_pullback", &json!({"fast_period": 5, "slow_period": 20})).unwrap(),
        ]
    }

    #[test]
    fn results_keep_input_order() {
        let bars = wave_bars(300);
        let exec = ExecutionConfig::new(TieBreaker::Sl, 0.5);
        let runs = run_strategies(&bars, &strategies(), &exec);
        let kinds: Vec<SetupKind> = runs.iter().map(|r| r.setup).collect();
        assert_eq!(
            kinds,
            vec![SetupKind::RangeBreakout, SetupKind::MeanReversion, SetupKind::TrendPullback]
        );
        for run in &runs {
            let dropped: usize = run.drops.values().sum();
            assert_eq!(run.trades.len() + dropped, run.raw_trades.len());
            assert_eq!(run.stats.total, run.trades.len());
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        let bars = wave_bars(300);
        let exec = ExecutionConfig::new(TieBreaker::Tp, 0.5);
        let parallel = run_strategies(&bars, &strategies(), &exec);
        let sequential: Vec<StrategyRun> = strategies().iter().map(|s| run_pipeline(&bars, s, &exec)).collect();
        assert_eq!(
            serde_json::to_string(&parallel).unwrap(),
            serde_json::to_string(&sequential).unwrap()
        );
    }

    #[test]
    fn disabled_strategies_are_skipped() {
        let bars = wave_bars(100);
        let mut configs = strategies();
        configs[1].set_enabled(false);
        let runs = run_strategies(&bars, &configs, &ExecutionConfig::new(TieBreaker::Sl, 0.5));
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.setup != SetupKind::MeanReversion));
    }

    #[test]
    fn run_from_config_and_file() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "timestamp,open,high,low,close").unwrap();
        for bar in wave_bars(200) {
            writeln!(
                file,
                "{},{},{},{},{}",
                bar.timestamp.to_rfc3339(),
                bar.open,
                bar.high,
                bar.low,
                bar.close
            )
            .unwrap();
        }
        file.flush().unwrap();

        let toml = r#"
[data]
symbol = "TEST"

[execution]
tie_breaker = "sl"
partial_fill = { min_ratio = 0.5 }

[[strategies]]
setup = "range_breakout"
lookback = 10
"#;
        let cfg = RunConfig::from_toml(toml).unwrap();
        assert!(matches!(run(&cfg, None), Err(RunError::NoBars)));

        let result = run(&cfg, Some(file.path())).unwrap();
        assert_eq!(result.schema_version, SCHEMA_VERSION);
        assert_eq!(result.bar_count, 200);
        assert_eq!(result.symbol.as_deref(), Some("TEST"));
        assert_eq!(result.run_id, cfg.run_id().unwrap());
        assert_eq!(result.strategies.len(), 1);
    }

    #[test]
    fn unknown_setup_fails_before_loading() {
        let toml = r#"
[data]
path = "/nonexistent/bars.csv"

[execution]
tie_breaker = "sl"
partial_fill = { min_ratio = 0.5 }

[[strategies]]
setup = "head_and_shoulders"
"#;
        let cfg = RunConfig::from_toml(toml).unwrap();
        assert!(matches!(run(&cfg, None), Err(RunError::Config(ConfigError::UnknownSetup(_)))));
    }
}
