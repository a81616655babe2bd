//! Market regime classification of a bar period.

use std::fmt;

use serde::{Deserialize, Serialize};

use quantsim_core::config::Timeframe;
use quantsim_core::domain::MarketBar;

use crate::metrics::std_dev;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
    Volatile,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 4] = [Self::Bull, Self::Bear, Self::Sideways, Self::Volatile];
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Bull => "bull",
            Self::Bear => "bear",
            Self::Sideways => "sideways",
            Self::Volatile => "volatile",
        };
        f.write_str(label)
    }
}

/// Classification thresholds. Volatility is checked first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    /// Annualized close-to-close volatility above which a period is `Volatile`.
    pub volatile_annualized: f64,
    /// Buy-and-hold return above which a period is `Bull`.
    pub bull_return: f64,
    /// Buy-and-hold return below which a period is `Bear`.
    pub bear_return: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            volatile_annualized: 0.40,
            bull_return: 0.05,
            bear_return: -0.05,
        }
    }
}

/// Buy-and-hold return and annualized volatility of a period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodProfile {
    pub buy_and_hold_return: f64,
    pub annualized_volatility: f64,
}

impl PeriodProfile {
    pub fn of(bars: &[MarketBar], timeframe: Timeframe) -> Self {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Self {
                buy_and_hold_return: 0.0,
                annualized_volatility: 0.0,
            };
        };
        let returns: Vec<f64> = bars
            .windows(2)
            .map(|w| w[1].close / w[0].close - 1.0)
            .collect();
        Self {
            buy_and_hold_return: last.close / first.close - 1.0,
            annualized_volatility: std_dev(&returns) * timeframe.bars_per_year().sqrt(),
        }
    }

    pub fn classify(&self, thresholds: &RegimeThresholds) -> MarketRegime {
        if self.annualized_volatility > thresholds.volatile_annualized {
            MarketRegime::Volatile
        } else if self.buy_and_hold_return > thresholds.bull_return {
            MarketRegime::Bull
        } else if self.buy_and_hold_return < thresholds.bear_return {
            MarketRegime::Bear
        } else {
            MarketRegime::Sideways
        }
    }
}

pub fn classify_regime(bars: &[MarketBar], timeframe: Timeframe, thresholds: &RegimeThresholds) -> MarketRegime {
    PeriodProfile::of(bars, timeframe).classify(thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> Vec<MarketBar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| MarketBar::new(t0 + Duration::days(i as i64), c, c, c, c, 1.0))
            .collect()
    }

    fn linear(from: f64, to: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| from + (to - from) * i as f64 / (n - 1) as f64)
            .collect()
    }

    #[test]
    fn steady_trends() {
        let t = RegimeThresholds::default();
        assert_eq!(
            classify_regime(&series(&linear(100.0, 120.0, 100)), Timeframe::D1, &t),
            MarketRegime::Bull
        );
        assert_eq!(
            classify_regime(&series(&linear(100.0, 85.0, 100)), Timeframe::D1, &t),
            MarketRegime::Bear
        );
        assert_eq!(
            classify_regime(&series(&linear(100.0, 101.0, 100)), Timeframe::D1, &t),
            MarketRegime::Sideways
        );
    }

    #[test]
    fn choppy_series_is_volatile() {
        let closes: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 100.0 } else { 105.0 }).collect();
        let profile = PeriodProfile::of(&series(&closes), Timeframe::D1);
        assert!(profile.annualized_volatility > 0.4);
        assert_eq!(profile.classify(&RegimeThresholds::default()), MarketRegime::Volatile);
    }

    #[test]
    fn empty_period_is_sideways() {
        assert_eq!(
            classify_regime(&[], Timeframe::D1, &RegimeThresholds::default()),
            MarketRegime::Sideways
        );
    }
}
