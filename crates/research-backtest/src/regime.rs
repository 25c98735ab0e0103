//! Regime tagging from reference series.
//!
//! The tagger is pure given the reference data: each window's five labels
//! are recomputable from the series alone. Thresholds live in
//! `research_models::regime`.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use research_models::{CapRegime, DirectionRegime, RatesRegime, RegimeTags, VolatilityRegime};

/// Provider of the classification inputs for a date range.
pub trait ReferenceData: Send + Sync {
    /// Mean distance of the broad-equity proxy from its 200-day SMA over
    /// the range (fraction, e.g. 0.07 = 7% above).
    fn equity_sma_distance(&self, start: NaiveDate, end: NaiveDate) -> Option<f64>;

    /// Mean implied-volatility index level over the range.
    fn mean_vol_index(&self, start: NaiveDate, end: NaiveDate) -> Option<f64>;

    /// 10y yield change over the final six months of the range, in bp.
    fn rates_change_bp(&self, start: NaiveDate, end: NaiveDate) -> Option<f64>;

    /// Best trailing 3-month sector at the range end.
    fn best_sector(&self, start: NaiveDate, end: NaiveDate) -> Option<String>;

    /// Small-cap vs broad-equity trailing 3-month relative return at end.
    fn small_cap_relative(&self, start: NaiveDate, end: NaiveDate) -> Option<f64>;
}

/// Deterministic tagger over a reference provider.
pub struct RegimeTagger<'a> {
    reference: &'a dyn ReferenceData,
}

impl<'a> RegimeTagger<'a> {
    pub fn new(reference: &'a dyn ReferenceData) -> Self {
        Self { reference }
    }

    /// Tag one window. Returns None when any reference series is missing
    /// for the range; the window then carries no regime labels.
    pub fn tag(&self, start: NaiveDate, end: NaiveDate) -> Option<RegimeTags> {
        let direction = DirectionRegime::classify(self.reference.equity_sma_distance(start, end)?);
        let volatility = VolatilityRegime::classify(self.reference.mean_vol_index(start, end)?);
        let rates = RatesRegime::classify(self.reference.rates_change_bp(start, end)?);
        let sector = self.reference.best_sector(start, end)?;
        let cap = CapRegime::classify(self.reference.small_cap_relative(start, end)?);
        Some(RegimeTags {
            direction,
            volatility,
            rates,
            sector,
            cap,
        })
    }
}

// =============================================================================
// In-memory series provider
// =============================================================================

/// Reference provider backed by in-memory daily series. Suitable for tests
/// and for registry-loaded reference bundles.
#[derive(Debug, Default, Clone)]
pub struct SeriesReferenceData {
    /// Broad-equity proxy closes.
    pub equity_close: BTreeMap<NaiveDate, f64>,
    /// Implied-volatility index closes.
    pub vol_index: BTreeMap<NaiveDate, f64>,
    /// 10y treasury yield, percent.
    pub treasury_10y: BTreeMap<NaiveDate, f64>,
    /// Sector name -> daily closes.
    pub sectors: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    /// Small-cap proxy closes.
    pub small_cap_close: BTreeMap<NaiveDate, f64>,
}

fn value_at_or_before(series: &BTreeMap<NaiveDate, f64>, date: NaiveDate) -> Option<f64> {
    series.range(..=date).next_back().map(|(_, &v)| v)
}

fn trailing_return(series: &BTreeMap<NaiveDate, f64>, end: NaiveDate, days: i64) -> Option<f64> {
    let now = value_at_or_before(series, end)?;
    let then = value_at_or_before(series, end - Duration::days(days))?;
    if then == 0.0 {
        return None;
    }
    Some(now / then - 1.0)
}

impl ReferenceData for SeriesReferenceData {
    fn equity_sma_distance(&self, start: NaiveDate, end: NaiveDate) -> Option<f64> {
        let closes: Vec<(NaiveDate, f64)> = self
            .equity_close
            .range(..=end)
            .map(|(&d, &v)| (d, v))
            .collect();
        if closes.is_empty() {
            return None;
        }

        let mut distances = Vec::new();
        for (i, &(date, close)) in closes.iter().enumerate() {
            if date < start || i + 1 < 200 {
                continue;
            }
            let window = &closes[i + 1 - 200..=i];
            let sma: f64 = window.iter().map(|(_, v)| v).sum::<f64>() / 200.0;
            if sma > 0.0 {
                distances.push(close / sma - 1.0);
            }
        }
        if distances.is_empty() {
            return None;
        }
        Some(distances.iter().sum::<f64>() / distances.len() as f64)
    }

    fn mean_vol_index(&self, start: NaiveDate, end: NaiveDate) -> Option<f64> {
        let values: Vec<f64> = self
            .vol_index
            .range(start..=end)
            .map(|(_, &v)| v)
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    fn rates_change_bp(&self, _start: NaiveDate, end: NaiveDate) -> Option<f64> {
        let now = value_at_or_before(&self.treasury_10y, end)?;
        let six_months_ago = value_at_or_before(&self.treasury_10y, end - Duration::days(182))?;
        Some((now - six_months_ago) * 100.0)
    }

    fn best_sector(&self, _start: NaiveDate, end: NaiveDate) -> Option<String> {
        let mut best: Option<(String, f64)> = None;
        for (name, series) in &self.sectors {
            let Some(ret) = trailing_return(series, end, 91) else {
                continue;
            };
            if best.as_ref().map(|(_, b)| ret > *b).unwrap_or(true) {
                best = Some((name.clone(), ret));
            }
        }
        best.map(|(name, _)| name)
    }

    fn small_cap_relative(&self, _start: NaiveDate, end: NaiveDate) -> Option<f64> {
        let small = trailing_return(&self.small_cap_close, end, 91)?;
        let broad = trailing_return(&self.equity_close, end, 91)?;
        Some(small - broad)
    }
}
