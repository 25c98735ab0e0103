//! Regime taxonomy for walk-forward window tagging.
//!
//! Each window is labeled independently across five orthogonal dimensions.
//! Thresholds are fixed in the design; tagging is deterministic given the
//! reference series.

use serde::{Deserialize, Serialize};

/// Fixed classification thresholds.
#[derive(Debug, Clone, Copy)]
pub struct RegimeThresholds {
    /// Broad-equity proxy vs its 200-day SMA: above +5% is bull.
    pub bull_threshold: f64,
    /// Below -5% is bear.
    pub bear_threshold: f64,
    /// Implied-volatility index below 15 is low vol.
    pub low_vol_threshold: f64,
    /// Above 25 is high vol.
    pub high_vol_threshold: f64,
    /// 10y yield 6-month change above +50bp is rising.
    pub rates_rising_bp: f64,
    /// Below -50bp is falling.
    pub rates_falling_bp: f64,
    /// Small-cap vs broad 3-month relative above +5% is small-led.
    pub small_cap_threshold: f64,
    /// Below -5% is large-led.
    pub large_cap_threshold: f64,
}

pub const REGIME_THRESHOLDS: RegimeThresholds = RegimeThresholds {
    bull_threshold: 0.05,
    bear_threshold: -0.05,
    low_vol_threshold: 15.0,
    high_vol_threshold: 25.0,
    rates_rising_bp: 50.0,
    rates_falling_bp: -50.0,
    small_cap_threshold: 0.05,
    large_cap_threshold: -0.05,
};

/// Market direction over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionRegime {
    Bull,
    Bear,
    Sideways,
}

impl DirectionRegime {
    /// Classify from the broad-equity proxy's mean distance to its 200-day SMA.
    pub fn classify(sma_distance: f64) -> Self {
        if sma_distance > REGIME_THRESHOLDS.bull_threshold {
            Self::Bull
        } else if sma_distance < REGIME_THRESHOLDS.bear_threshold {
            Self::Bear
        } else {
            Self::Sideways
        }
    }
}

/// Volatility environment over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

impl VolatilityRegime {
    /// Classify from the mean implied-volatility index level.
    pub fn classify(vol_index: f64) -> Self {
        if vol_index < REGIME_THRESHOLDS.low_vol_threshold {
            Self::Low
        } else if vol_index > REGIME_THRESHOLDS.high_vol_threshold {
            Self::High
        } else {
            Self::Normal
        }
    }
}

/// Rates trajectory over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatesRegime {
    Rising,
    Falling,
    Flat,
}

impl RatesRegime {
    /// Classify from the 10y yield change over six months, in basis points.
    pub fn classify(change_bp: f64) -> Self {
        if change_bp > REGIME_THRESHOLDS.rates_rising_bp {
            Self::Rising
        } else if change_bp < REGIME_THRESHOLDS.rates_falling_bp {
            Self::Falling
        } else {
            Self::Flat
        }
    }
}

/// Market-cap leadership over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapRegime {
    Small,
    Large,
    Mixed,
}

impl CapRegime {
    /// Classify from small-cap vs broad-equity 3-month relative return.
    pub fn classify(relative: f64) -> Self {
        if relative > REGIME_THRESHOLDS.small_cap_threshold {
            Self::Small
        } else if relative < REGIME_THRESHOLDS.large_cap_threshold {
            Self::Large
        } else {
            Self::Mixed
        }
    }
}

/// Five-tuple regime label for one walk-forward window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegimeTags {
    pub direction: DirectionRegime,
    pub volatility: VolatilityRegime,
    pub rates: RatesRegime,
    /// Best 3-month trailing sector (categorical, e.g. "technology").
    pub sector: String,
    pub cap: CapRegime,
}

impl RegimeTags {
    /// Compact label for reports, e.g. `bull/high/flat/energy/large`.
    pub fn label(&self) -> String {
        format!(
            "{:?}/{:?}/{:?}/{}/{:?}",
            self.direction, self.volatility, self.rates, self.sector, self.cap
        )
        .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_boundaries() {
        assert_eq!(DirectionRegime::classify(0.051), DirectionRegime::Bull);
        assert_eq!(DirectionRegime::classify(0.05), DirectionRegime::Sideways);
        assert_eq!(DirectionRegime::classify(-0.051), DirectionRegime::Bear);
    }

    #[test]
    fn test_volatility_boundaries() {
        assert_eq!(VolatilityRegime::classify(14.9), VolatilityRegime::Low);
        assert_eq!(VolatilityRegime::classify(20.0), VolatilityRegime::Normal);
        assert_eq!(VolatilityRegime::classify(25.1), VolatilityRegime::High);
    }

    #[test]
    fn test_rates_boundaries() {
        assert_eq!(RatesRegime::classify(51.0), RatesRegime::Rising);
        assert_eq!(RatesRegime::classify(-51.0), RatesRegime::Falling);
        assert_eq!(RatesRegime::classify(0.0), RatesRegime::Flat);
    }

    #[test]
    fn test_label_format() {
        let tags = RegimeTags {
            direction: DirectionRegime::Bull,
            volatility: VolatilityRegime::High,
            rates: RatesRegime::Flat,
            sector: "energy".to_string(),
            cap: CapRegime::Large,
        };
        assert_eq!(tags.label(), "bull/high/flat/energy/large");
    }
}
