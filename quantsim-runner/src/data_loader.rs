//! Bar loading for the runner.
//!
//! Two sources:
//! 1. A CSV file with `timestamp,open,high,low,close,volume` columns, where
//!    timestamps are RFC 3339 or `YYYY-MM-DD` (midnight UTC)
//! 2. A seeded synthetic random walk for demos and tests
//!
//! Loaded series are validated before they are returned.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use quantsim_core::config::Timeframe;
use quantsim_core::domain::{validate_series, BarError, MarketBar};
use quantsim_core::rng::RngHierarchy;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read bar file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: unparseable timestamp '{value}' (expected RFC 3339 or YYYY-MM-DD)")]
    Timestamp { row: usize, value: String },

    #[error("bar file contains no rows")]
    Empty,

    #[error("invalid bar series: {0}")]
    Bars(#[from] BarError),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Load and validate bars from a CSV file.
pub fn load_csv(path: &Path) -> Result<Vec<MarketBar>, LoadError> {
    let file = std::fs::File::open(path)?;
    let bars = read_csv(file)?;
    info!(path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(bars)
}

/// Parse and validate bars from any CSV reader (header row required).
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<MarketBar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    for (row, record) in rdr.deserialize::<CsvRow>().enumerate() {
        let record = record?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| LoadError::Timestamp {
            row: row + 1,
            value: record.timestamp.clone(),
        })?;
        bars.push(MarketBar::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        ));
    }

    if bars.is_empty() {
        return Err(LoadError::Empty);
    }
    validate_series(&bars)?;
    Ok(bars)
}

/// RFC 3339, or a bare date at midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Parameters of the synthetic random walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSpec {
    pub bars: usize,
    pub start_price: f64,
    /// Timestamp of the first bar.
    pub start: DateTime<Utc>,
    pub timeframe: Timeframe,
    /// Maximum absolute per-bar close-to-close move, as a fraction.
    pub max_move: f64,
    /// Per-bar drift added to every move.
    pub drift: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            bars: 500,
            start_price: 100.0,
            start: Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default(), // 2024-01-01
            timeframe: Timeframe::D1,
            max_move: 0.02,
            drift: 0.0002,
            seed: 42,
        }
    }
}

/// Generate a deterministic random walk. Identical specs yield identical bars.
pub fn synthetic_bars(spec: &SyntheticSpec) -> Vec<MarketBar> {
    let mut rng = RngHierarchy::new(spec.seed).rng_for("synthetic_bars", 0);
    let step = spec.timeframe.duration();
    let max_move = spec.max_move.abs().max(1e-6);

    let mut bars = Vec::with_capacity(spec.bars);
    let mut price = spec.start_price.max(0.01);
    let mut timestamp = spec.start;

    for _ in 0..spec.bars {
        let change: f64 = rng.gen_range(-max_move..max_move) + spec.drift;
        let open = price;
        let close = (price * (1.0 + change)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..max_move / 2.0));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..max_move / 2.0));
        let volume = rng.gen_range(500_000.0..5_000_000.0_f64).round();

        bars.push(MarketBar::new(timestamp, open, high, low, close, volume));
        price = close;
        timestamp += step;
    }
    bars
}

/// BLAKE3 fingerprint of a bar series, for run provenance.
pub fn dataset_hash(bars: &[MarketBar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.timestamp().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
