//! Serializable run configuration, read from TOML.
//!
//! ```toml
//! [data]
//! path = "bars/eurusd_15m.csv"
//! resolution = "15m"
//! htf_resolution = "1h"
//!
//! [execution]
//! tie_breaker = "sl"
//! partial_fill = { min_ratio = 0.5 }
//!
//! [[strategies]]
//! setup = "range_breakout"
//! lookback = 20
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use setuplab_core::domain::Resolution;
use setuplab_core::{ConfigError, ExecutionConfig, StrategyConfig};

use crate::data_loader::BarFormat;
use crate::runner::RunError;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

/// Where bars come from and how they are shaped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Inferred from the file extension when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<BarFormat>,
    /// Instrument label carried into the results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// With `resolution`, sets `htf_ratio` on every strategy's bias filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub htf_resolution: Option<Resolution>,
    /// Keep only the last N bars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Reject out-of-order timestamps instead of sorting them.
    pub strict_order: bool,
}

impl DataConfig {
    /// Lower-timeframe bars per higher-timeframe bar, when both are set.
    pub fn htf_ratio(&self) -> Result<Option<usize>, ConfigError> {
        match (self.resolution, self.htf_resolution) {
            (Some(base), Some(htf)) => base.ratio_to(htf).map(Some).ok_or(ConfigError::InvalidValue {
                field: "data.htf_resolution",
                value: format!("{htf} is not a multiple of {base}"),
            }),
            _ => Ok(None),
        }
    }
}

/// One `[[strategies]]` entry: a setup id and its parameter overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEntry {
    pub setup: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Run configuration as written in the TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub data: DataConfig,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyEntry>,
}

impl RunConfig {
    /// Load a run configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RunError> {
        let content = std::fs::read_to_string(path).map_err(|source| RunError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a run configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, RunError> {
        Ok(toml::from_str(content)?)
    }

    /// Build every strategy and clamp every value.
    ///
    /// Fails on the first unknown setup id or malformed override table, before
    /// any bar is loaded.
    pub fn resolve(&self) -> Result<ResolvedRun, ConfigError> {
        let htf_ratio = self.data.htf_ratio()?;
        let strategies = self
            .strategies
            .iter()
            .map(|entry| {
                let mut cfg = StrategyConfig::build(&entry.setup, &Value::Object(entry.params.clone()))?;
                let kind = cfg.kind();
                if let (Some(ratio), Some(filter)) = (htf_ratio, cfg.bias_filter_mut()) {
                    debug!(setup = %kind, ratio, "bias filter ratio from resolutions");
                    filter.htf_ratio = ratio;
                }
                Ok(cfg)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(ResolvedRun {
            data: self.data.clone(),
            execution: self.execution.clone().sanitized(),
            strategies,
        })
    }

    /// BLAKE3 of the canonical JSON of the resolved configuration.
    ///
    /// Two files that resolve to the same effective config share a run id.
    pub fn run_id(&self) -> Result<RunId, RunError> {
        Ok(self.resolve()?.run_id()?)
    }
}

/// Effective configuration after building and sanitizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRun {
    pub data: DataConfig,
    pub execution: ExecutionConfig,
    pub strategies: Vec<StrategyConfig>,
}

impl ResolvedRun {
    pub fn run_id(&self) -> Result<RunId, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Render as TOML, e.g. for `validate`.
    pub fn to_toml(&self) -> Result<String, RunError> {
        Ok(toml::to_string(self)?)
    }
}
