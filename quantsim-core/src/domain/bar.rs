//! MarketBar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV bar for a single instrument at a single timestamp.
///
/// Bars are immutable once ingested. A run consumes a slice of bars ordered
/// by strictly increasing timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Errors from bar validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar {index} is malformed (check high/low ordering and positive prices)")]
    Malformed { index: usize },
    #[error("bar {index} timestamp {timestamp} is not after the previous bar")]
    OutOfOrder {
        index: usize,
        timestamp: DateTime<Utc>,
    },
}

impl MarketBar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLCV field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Basic OHLCV sanity check: high >= low, high >= open/close, positive prices.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Validate a bar series: every bar sane, timestamps strictly increasing.
pub fn validate_series(bars: &[MarketBar]) -> Result<(), BarError> {
    for (index, bar) in bars.iter().enumerate() {
        if !bar.is_sane() {
            return Err(BarError::Malformed { index });
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(BarError::OutOfOrder {
                index,
                timestamp: bar.timestamp,
            });
        }
    }
    Ok(())
}
