//! Result export: JSON documents and flat trade CSVs.
//!
//! The JSON document carries a `schema_version` field. Versions newer than
//! this build understands are rejected on import.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

use setuplab_core::domain::SimulatedTrade;

use crate::runner::{RunResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `RunResult` to pretty JSON.
pub fn export_json(result: &RunResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize RunResult to JSON")
}

/// Deserialize a `RunResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RunResult> {
    let result: RunResult = serde_json::from_str(json).context("failed to deserialize RunResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export simulated trades as one CSV row each.
///
/// Prices keep six decimals, R multiples four. Open trades report their
/// mark-to-market exit.
pub fn export_trades_csv(trades: &[SimulatedTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "trade_id",
        "setup",
        "side",
        "signal_index",
        "entry_index",
        "entry_time",
        "entry_price",
        "stop_loss",
        "take_profit",
        "exit_index",
        "exit_time",
        "exit_price",
        "outcome",
        "exit_reason",
        "r_multiple",
        "bars_held",
        "session",
        "spread",
        "entry_slippage",
        "exit_slippage",
        "commission",
        "fill_ratio",
        "stop_widened",
    ])?;

    for t in trades {
        let d = &t.diagnostics;
        wtr.write_record([
            t.raw.id.to_string().as_str(),
            t.setup().as_str(),
            &t.side().to_string(),
            &t.raw.signal_index.to_string(),
            &t.entry_index.to_string(),
            &t.entry_time.to_rfc3339(),
            &format!("{:.6}", t.entry_price),
            &format!("{:.6}", t.stop_loss),
            &format!("{:.6}", t.take_profit),
            &t.exit_index.to_string(),
            &t.exit_time.to_rfc3339(),
            &format!("{:.6}", t.exit_price),
            t.outcome.as_str(),
            t.exit_reason.as_str(),
            &format!("{:.4}", t.r_multiple),
            &t.bars_held.to_string(),
            d.session.as_str(),
            &format!("{:.6}", d.spread),
            &format!("{:.6}", d.entry_slippage),
            &format!("{:.6}", d.exit_slippage),
            &format!("{:.6}", d.commission.total),
            &format!("{:.4}", d.fill_ratio),
            if d.stop_widened { "true" } else { "false" },
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for a run under `output_dir`:
/// - `{run_id}.json`: the full `RunResult`
/// - `{run_id}_{setup}_trades.csv`: one per strategy; a repeated setup gets
///   a `_2`, `_3`, … suffix
///
/// Returns every written path, JSON first.
pub fn save_artifacts(result: &RunResult, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let mut written = Vec::with_capacity(result.strategies.len() + 1);

    let json_path = output_dir.join(format!("{}.json", result.run_id));
    std::fs::write(&json_path, export_json(result)?)
        .with_context(|| format!("failed to write {}", json_path.display()))?;
    written.push(json_path);

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for run in &result.strategies {
        let setup = run.setup.as_str();
        let count = seen.entry(setup).or_insert(0);
        *count += 1;
        let stem = if *count == 1 {
            format!("{}_{}_trades.csv", result.run_id, setup)
        } else {
            format!("{}_{}_{}_trades.csv", result.run_id, setup, count)
        };
        let path = output_dir.join(stem);
        std::fs::write(&path, export_trades_csv(&run.trades)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }

    info!(dir = %output_dir.display(), files = written.len(), "artifacts saved");
    Ok(written)
}

/// Load a `RunResult` JSON document from disk.
pub fn load_result(path: &Path) -> Result<RunResult> {
    let json = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
