//! Bar loading and normalization for the runner.
//!
//! Reads OHLCV bars from CSV or JSON files and hands the core a clean,
//! ascending series:
//! 1. Rows without a parseable timestamp are skipped (and counted)
//! 2. Missing or non-numeric prices become NaN so the bar keeps its slot
//! 3. Out-of-order rows are sorted, duplicate timestamps keep the last row
//! 4. An optional limit keeps only the most recent N bars
//!
//! Accepted timestamp forms: epoch seconds, epoch milliseconds (anything
//! above 1e12), RFC 3339, `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD` (UTC).

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use setuplab_core::domain::Bar;

/// Epoch values above this are milliseconds.
const EPOCH_MS_THRESHOLD: f64 = 1e12;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("JSON bars must be an array of objects")]
    NotAnArray,

    #[error("no usable bars in {0}")]
    Empty(String),

    #[error("cannot infer bar format from '{0}' (expected .csv or .json)")]
    UnsupportedFormat(String),

    #[error("timestamps out of order at bar {position} and strict ordering is on")]
    Unsorted { position: usize },
}

/// On-disk bar format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarFormat {
    Csv,
    Json,
}

impl BarFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(BarFormat::Csv),
            Some("json") => Ok(BarFormat::Json),
            _ => Err(LoadError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Options controlling how bars are loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Overrides extension-based detection.
    pub format: Option<BarFormat>,
    /// Keep only the last N bars.
    pub limit: Option<usize>,
    /// Fail on out-of-order timestamps instead of sorting.
    pub strict_order: bool,
}

/// Normalized bars plus what normalization had to do to get them.
#[derive(Debug, Clone)]
pub struct LoadedBars {
    pub bars: Vec<Bar>,
    /// Bars carried with at least one missing OHLC field.
    pub void_bars: usize,
    /// Rows dropped for lack of a timestamp.
    pub skipped_rows: usize,
    /// Rows replaced by a later row with the same timestamp.
    pub duplicates: usize,
    /// True when the input had to be sorted.
    pub reordered: bool,
    /// BLAKE3 over the normalized series.
    pub dataset_hash: String,
}

/// Load and normalize bars from a file.
pub fn load_bars(path: &Path, opts: &LoadOptions) -> Result<LoadedBars, LoadError> {
    let format = match opts.format {
        Some(f) => f,
        None => BarFormat::from_path(path)?,
    };
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), ?format, bytes = content.len(), "loading bars");
    parse_bars(&content, format, opts, &path.display().to_string())
}

/// Parse and normalize bars already held in memory. `source` labels log lines
/// and errors.
pub fn parse_bars(
    content: &str,
    format: BarFormat,
    opts: &LoadOptions,
    source: &str,
) -> Result<LoadedBars, LoadError> {
    let (bars, skipped_rows) = match format {
        BarFormat::Csv => read_csv(content)?,
        BarFormat::Json => read_json(content)?,
    };
    normalize(bars, skipped_rows, opts, source)
}

// ─── CSV ──────────────────────────────────────────────────────────────

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
        };
        let require = |name: &'static str, aliases: &[&str]| find(aliases).ok_or(LoadError::MissingColumn(name));
        Ok(Self {
            timestamp: require("timestamp", TIMESTAMP_KEYS)?,
            open: require("open", OPEN_KEYS)?,
            high: require("high", HIGH_KEYS)?,
            low: require("low", LOW_KEYS)?,
            close: require("close", CLOSE_KEYS)?,
            volume: find(VOLUME_KEYS),
        })
    }
}

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "t", "time", "date", "datetime"];
const OPEN_KEYS: &[&str] = &["open", "o"];
const HIGH_KEYS: &[&str] = &["high", "h"];
const LOW_KEYS: &[&str] = &["low", "l"];
const CLOSE_KEYS: &[&str] = &["close", "c"];
const VOLUME_KEYS: &[&str] = &["volume", "v", "vol"];

fn read_csv(content: &str) -> Result<(Vec<Bar>, usize), LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut bars = Vec::new();
    let mut skipped = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");
        let Some(timestamp) = parse_timestamp_str(field(columns.timestamp)) else {
            warn!(row = row + 1, value = field(columns.timestamp), "skipping row without a parseable timestamp");
            skipped += 1;
            continue;
        };
        bars.push(Bar {
            timestamp,
            open: parse_price(field(columns.open)),
            high: parse_price(field(columns.high)),
            low: parse_price(field(columns.low)),
            close: parse_price(field(columns.close)),
            volume: columns.volume.map(|i| parse_price(field(i))).filter(|v| v.is_finite()),
        });
    }
    Ok((bars, skipped))
}

// ─── JSON ─────────────────────────────────────────────────────────────

fn read_json(content: &str) -> Result<(Vec<Bar>, usize), LoadError> {
    let Value::Array(items) = serde_json::from_str::<Value>(content)? else {
        return Err(LoadError::NotAnArray);
    };

    let mut bars = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for (row, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            warn!(row, "skipping non-object bar entry");
            skipped += 1;
            continue;
        };
        let Some(timestamp) = lookup(obj, TIMESTAMP_KEYS).and_then(json_timestamp) else {
            warn!(row, "skipping bar without a parseable timestamp");
            skipped += 1;
            continue;
        };
        let price = |keys: &[&str]| lookup(obj, keys).map_or(f64::NAN, json_price);
        bars.push(Bar {
            timestamp,
            open: price(OPEN_KEYS),
            high: price(HIGH_KEYS),
            low: price(LOW_KEYS),
            close: price(CLOSE_KEYS),
            volume: Some(price(VOLUME_KEYS)).filter(|v| v.is_finite()),
        });
    }
    Ok((bars, skipped))
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

fn json_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(epoch_to_datetime),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

fn json_price(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_price(s),
        _ => f64::NAN,
    }
}

// ─── Field parsing ────────────────────────────────────────────────────

fn parse_price(s: &str) -> f64 {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(f64::NAN)
}

fn epoch_to_datetime(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    if value.abs() > EPOCH_MS_THRESHOLD {
        DateTime::from_timestamp_millis(value as i64)
    } else {
        DateTime::from_timestamp(value.trunc() as i64, 0)
    }
}

/// Parse a timestamp in any of the accepted textual forms.
pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<f64>() {
        return epoch_to_datetime(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ─── Normalization ────────────────────────────────────────────────────

fn normalize(
    mut bars: Vec<Bar>,
    skipped_rows: usize,
    opts: &LoadOptions,
    source: &str,
) -> Result<LoadedBars, LoadError> {
    let first_inversion = bars.windows(2).position(|w| w[1].timestamp < w[0].timestamp);
    let reordered = first_inversion.is_some();
    if let Some(i) = first_inversion {
        if opts.strict_order {
            return Err(LoadError::Unsorted { position: i + 1 });
        }
        warn!(source, "bars out of order, sorting by timestamp");
        // Stable: among equal timestamps the later row stays last.
        bars.sort_by_key(|b| b.timestamp);
    }

    let before = bars.len();
    let mut deduped: Vec<Bar> = Vec::with_capacity(before);
    for bar in bars {
        match deduped.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => deduped.push(bar),
        }
    }
    let duplicates = before - deduped.len();
    if duplicates > 0 {
        warn!(source, duplicates, "duplicate timestamps, keeping the last row");
    }

    if let Some(limit) = opts.limit {
        if deduped.len() > limit {
            let excess = deduped.len() - limit;
            deduped.drain(..excess);
        }
    }

    if deduped.is_empty() {
        return Err(LoadError::Empty(source.to_string()));
    }

    let void_bars = deduped.iter().filter(|b| b.is_void()).count();
    if void_bars > 0 {
        warn!(source, void_bars, "bars with missing prices are kept as gaps");
    }
    let insane = deduped.iter().filter(|b| !b.is_void() && !b.is_sane()).count();
    if insane > 0 {
        warn!(source, insane, "bars with inconsistent OHLC");
    }
    if skipped_rows > 0 {
        warn!(source, skipped_rows, "rows skipped");
    }

    let dataset_hash = compute_dataset_hash(&deduped);
    Ok(LoadedBars {
        bars: deduped,
        void_bars,
        skipped_rows,
        duplicates,
        reordered,
        dataset_hash,
    })
}

/// BLAKE3 over timestamps and all OHLCV values, in series order.
pub fn compute_dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.unwrap_or(f64::NAN).to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn csv_opts() -> LoadOptions {
        LoadOptions {
            format: Some(BarFormat::Csv),
            ..Default::default()
        }
    }

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_csv_from_disk() {
        let file = write_temp(
            ".csv",
            "timestamp,open,high,low,close,volume\n\
             2024-01-02T00:00:00Z,1.10,1.12,1.09,1.11,500\n\
             2024-01-02T01:00:00Z,1.11,1.13,1.10,1.12,\n",
        );
        let loaded = load_bars(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(loaded.bars.len(), 2);
        assert_eq!(loaded.bars[0].volume, Some(500.0));
        assert_eq!(loaded.bars[1].volume, None);
        assert_eq!(loaded.bars[1].close, 1.12);
        assert!(!loaded.reordered);
        assert_eq!(loaded.dataset_hash.len(), 64);
    }

    #[test]
    fn compact_json_with_epoch_millis() {
        let json = r#"[
            {"t": 1704153600000, "o": 1.0, "h": 2.0, "l": 0.5, "c": 1.5},
            {"t": 1704157200, "o": "1.5", "h": null, "l": 1.0, "c": 1.2, "v": 10}
        ]"#;
        let loaded = parse_bars(json, BarFormat::Json, &LoadOptions::default(), "test").unwrap();
        assert_eq!(loaded.bars[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(loaded.bars[1].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap());
        assert_eq!(loaded.bars[1].open, 1.5);
        assert!(loaded.bars[1].high.is_nan());
        assert_eq!(loaded.bars[1].volume, Some(10.0));
        assert_eq!(loaded.void_bars, 1);
    }

    #[test]
    fn long_form_json() {
        let json = r#"[{"timestamp": "2024-03-01", "open": 5, "high": 6, "low": 4, "close": 5.5, "volume": 1}]"#;
        let loaded = parse_bars(json, BarFormat::Json, &LoadOptions::default(), "test").unwrap();
        assert_eq!(loaded.bars[0].timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(loaded.bars[0].close, 5.5);
    }

    #[test]
    fn missing_prices_become_void_bars() {
        let csv = "t,o,h,l,c\n2024-01-02 00:00:00,1,2,0.5,1.5\n2024-01-02 01:00:00,,n/a,1,1\n";
        let loaded = parse_bars(csv, BarFormat::Csv, &csv_opts(), "test").unwrap();
        assert_eq!(loaded.bars.len(), 2);
        assert!(loaded.bars[1].is_void());
        assert_eq!(loaded.void_bars, 1);
    }

    #[test]
    fn rows_without_timestamp_are_skipped() {
        let csv = "date,open,high,low,close\n,1,2,0.5,1.5\nnot a date,1,2,0.5,1.5\n2024-01-02,1,2,0.5,1.5\n";
        let loaded = parse_bars(csv, BarFormat::Csv, &csv_opts(), "test").unwrap();
        assert_eq!(loaded.bars.len(), 1);
        assert_eq!(loaded.skipped_rows, 2);
    }

    #[test]
    fn unsorted_input_is_sorted_and_deduplicated() {
        let csv = "timestamp,open,high,low,close\n\
                   1704160800,3,3,3,3\n\
                   1704153600,1,1,1,1\n\
                   1704157200,2,2,2,2\n\
                   1704157200,9,9,9,9\n";
        let loaded = parse_bars(csv, BarFormat::Csv, &csv_opts(), "test").unwrap();
        let closes: Vec<f64> = loaded.bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 9.0, 3.0]);
        assert!(loaded.reordered);
        assert_eq!(loaded.duplicates, 1);
    }

    #[test]
    fn strict_order_rejects_unsorted() {
        let csv = "timestamp,open,high,low,close\n1704157200,2,2,2,2\n1704153600,1,1,1,1\n";
        let opts = LoadOptions {
            strict_order: true,
            ..csv_opts()
        };
        let err = parse_bars(csv, BarFormat::Csv, &opts, "test").unwrap_err();
        assert!(matches!(err, LoadError::Unsorted { position: 1 }));
    }

    #[test]
    fn limit_keeps_most_recent() {
        let csv = "timestamp,open,high,low,close\n\
                   1704153600,1,1,1,1\n1704157200,2,2,2,2\n1704160800,3,3,3,3\n";
        let opts = LoadOptions {
            limit: Some(2),
            ..csv_opts()
        };
        let loaded = parse_bars(csv, BarFormat::Csv, &opts, "test").unwrap();
        let closes: Vec<f64> = loaded.bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![2.0, 3.0]);
    }

    #[test]
    fn missing_column_is_an_error() {
        let csv = "timestamp,open,high,close\n1704153600,1,1,1\n";
        let err = parse_bars(csv, BarFormat::Csv, &csv_opts(), "test").unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn("low")));
    }

    #[test]
    fn empty_series_is_an_error() {
        let err = parse_bars("[]", BarFormat::Json, &LoadOptions::default(), "test").unwrap_err();
        assert!(matches!(err, LoadError::Empty(_)));
        let err = parse_bars("{}", BarFormat::Json, &LoadOptions::default(), "test").unwrap_err();
        assert!(matches!(err, LoadError::NotAnArray));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(BarFormat::from_path(Path::new("a/b.CSV")).unwrap(), BarFormat::Csv);
        assert_eq!(BarFormat::from_path(Path::new("bars.json")).unwrap(), BarFormat::Json);
        assert!(matches!(
            BarFormat::from_path(Path::new("bars.parquet")),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_bars(Path::new("/nonexistent/bars.csv"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    proptest::proptest! {
        #[test]
        fn normalized_series_is_strictly_ascending(
            offsets in proptest::collection::vec(0i64..50, 1..80),
            limit in proptest::option::of(1usize..40),
        ) {
            let mut csv = String::from("timestamp,open,high,low,close\n");
            for (row, off) in offsets.iter().enumerate() {
                csv.push_str(&format!("{},1,2,0.5,{}\n", 1_704_153_600 + off * 3600, row));
            }
            let opts = LoadOptions { limit, ..csv_opts() };
            let loaded = parse_bars(&csv, BarFormat::Csv, &opts, "prop").unwrap();
            proptest::prop_assert!(loaded.bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
            if let Some(n) = limit {
                proptest::prop_assert!(loaded.bars.len() <= n);
            }
            if limit.is_none() {
                proptest::prop_assert_eq!(loaded.bars.len() + loaded.duplicates, offsets.len());
            }
        }
    }

    #[test]
    fn dataset_hash_is_deterministic() {
        let csv = "timestamp,open,high,low,close\n1704153600,1,2,0.5,1.5\n";
        let a = parse_bars(csv, BarFormat::Csv, &csv_opts(), "a").unwrap();
        let b = parse_bars(csv, BarFormat::Csv, &csv_opts(), "b").unwrap();
        assert_eq!(a.dataset_hash, b.dataset_hash);

        let changed = csv.replace("1.5", "1.6");
        let c = parse_bars(&changed, BarFormat::Csv, &csv_opts(), "c").unwrap();
        assert_ne!(a.dataset_hash, c.dataset_hash);
    }
}
