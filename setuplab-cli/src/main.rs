//! SetupLab CLI — run and validate setup backtests.
//!
//! Commands:
//! - `run` — load bars, run every enabled strategy, print stats, write artifacts
//! - `validate` — resolve a config and print the effective TOML

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use setuplab_runner::{run, save_artifacts, RunConfig, RunResult, StrategyRun};

#[derive(Parser)]
#[command(name = "setuplab", about = "SetupLab CLI — setup signal backtester with execution costs")]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every strategy of a TOML config over a bar file.
    Run {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// Bar file (CSV or JSON). Overrides `data.path`.
        #[arg(long)]
        bars: Option<PathBuf>,

        /// Output directory for result JSON and trade CSVs.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Parse and sanitize a config, then print the effective configuration.
    Validate {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            bars,
            output_dir,
        } => run_cmd(&config, bars.as_deref(), &output_dir),
        Commands::Validate { config } => validate_cmd(&config),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn run_cmd(config_path: &Path, bars: Option<&Path>, output_dir: &Path) -> Result<()> {
    let config = RunConfig::from_file(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let result = run(&config, bars).context("run failed")?;

    print_summary(&result);

    let written = save_artifacts(&result, output_dir)?;
    for path in &written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn validate_cmd(config_path: &Path) -> Result<()> {
    let config = RunConfig::from_file(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let resolved = config.resolve().context("invalid configuration")?;
    let run_id = resolved.run_id()?;
    info!(%run_id, strategies = resolved.strategies.len(), "configuration is valid");
    print!("{}", resolved.to_toml()?);
    Ok(())
}

fn print_summary(result: &RunResult) {
    println!();
    println!("=== SetupLab Run ===");
    if let Some(symbol) = &result.symbol {
        println!("Symbol:   {symbol}");
    }
    println!("Run id:   {}", result.run_id);
    println!("Bars:     {} ({} with gaps)", result.bar_count, result.void_bars);
    println!();
    println!(
        "{:<16} {:>5} {:>6} {:>5} {:>5} {:>8} {:>8} {:>7} {:>8} {:>7}",
        "setup", "raw", "trades", "open", "drop", "win%", "exp R", "PF", "net R", "maxDD"
    );
    for run in &result.strategies {
        print_row(run);
    }
    println!();
}

fn print_row(run: &StrategyRun) {
    let s = &run.stats;
    let dropped: usize = run.drops.values().sum();
    println!(
        "{:<16} {:>5} {:>6} {:>5} {:>5} {:>8} {:>8} {:>7} {:>8.2} {:>7.2}",
        run.setup.as_str(),
        run.raw_trades.len(),
        s.total,
        s.open,
        dropped,
        fmt_opt(s.win_rate.map(|w| w * 100.0), 1),
        fmt_opt(s.expectancy, 3),
        fmt_opt(s.profit_factor, 2),
        s.net_r,
        s.max_drawdown_r,
    );
}

/// `-` for an undefined ratio.
fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.decimals$}"))
}
