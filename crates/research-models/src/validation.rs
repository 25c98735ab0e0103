//! Immutable validation records: per-window results, aggregates, verdicts.
//!
//! A validation is keyed by `(strategy_id, definition_hash, code_hash,
//! generator_version, started_at)`. Once written it is never mutated; a
//! forced re-run appends a new record.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::ContentHash;
use crate::ids::StrategyId;
use crate::regime::RegimeTags;

/// Schema version for validation records (frozen v1).
pub const VALIDATION_SCHEMA_VERSION: &str = "1";

// =============================================================================
// Window results
// =============================================================================

/// Outcome of a single walk-forward window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Completed,
    /// Backend failure after retry exhaustion; window excluded from
    /// aggregates but counted against the failure budget.
    Error,
}

/// Metrics computed from one window's return series and trade log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub cagr: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Positive fraction, e.g. 0.18 for an 18% peak-to-trough loss.
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: u32,
    /// Annualized volatility of daily returns.
    pub volatility: f64,
    pub benchmark_sharpe: f64,
    pub benchmark_cagr: f64,
}

/// Immutable record for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    /// 1-based window index in chronological order.
    pub index: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: WindowStatus,
    pub metrics: Option<WindowMetrics>,
    pub regimes: Option<RegimeTags>,
    /// Backend error after retry exhaustion.
    pub error: Option<String>,
}

// =============================================================================
// Gates
// =============================================================================

/// Multiple-testing correction applied to the raw p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    /// Benjamini-Hochberg false discovery rate (default).
    Fdr,
    Bonferroni,
}

impl Default for CorrectionMethod {
    fn default() -> Self {
        Self::Fdr
    }
}

/// Gate thresholds applied by the statistical validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationGates {
    pub min_sharpe: f64,
    /// Minimum fraction of windows with Sharpe > 0.
    pub min_consistency: f64,
    /// Maximum tolerated aggregate drawdown (positive fraction).
    pub max_drawdown: f64,
    pub min_trades: u32,
    /// Significance level for the adjusted p-value.
    pub adjusted_alpha: f64,
    pub correction: CorrectionMethod,
}

impl Default for ValidationGates {
    fn default() -> Self {
        Self {
            min_sharpe: 1.0,
            min_consistency: 0.6,
            max_drawdown: 0.25,
            min_trades: 30,
            adjusted_alpha: 0.05,
            correction: CorrectionMethod::Fdr,
        }
    }
}

/// Outcome of one gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Pass,
    Fail,
    /// Input metric unavailable (e.g. zero completed windows).
    Skip,
}

/// One evaluated gate with threshold and observed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateCheck {
    pub gate: String,
    pub outcome: GateOutcome,
    pub threshold: f64,
    pub actual: Option<f64>,
    pub message: String,
}

impl GateCheck {
    pub fn passed(&self) -> bool {
        self.outcome == GateOutcome::Pass
    }
}

// =============================================================================
// Aggregates and verdict
// =============================================================================

/// Per-regime aggregate over the windows carrying that label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeAggregate {
    pub window_count: u32,
    pub mean_sharpe: f64,
}

/// Aggregate statistics over completed windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub window_count: u32,
    pub failed_windows: u32,
    pub mean_sharpe: f64,
    /// Bootstrap 95% confidence interval over window Sharpes.
    pub sharpe_ci_low: f64,
    pub sharpe_ci_high: f64,
    /// Bootstrap resample count and RNG seed, recorded for reproducibility.
    pub bootstrap_resamples: u32,
    pub bootstrap_seed: u64,
    /// One-sided p-value against the zero-skill null.
    pub p_value_raw: f64,
    /// Corrected for the validation family of this definition lineage.
    pub p_value_adjusted: f64,
    /// Family size used by the correction.
    pub family_size: u32,
    /// Cohen's d of window Sharpes against zero.
    pub effect_size: f64,
    /// Fraction of completed windows with Sharpe > 0.
    pub consistency: f64,
    pub mean_cagr: f64,
    pub worst_drawdown: f64,
    pub total_trades: u32,
    /// Keyed by regime dimension label, e.g. "direction:bull".
    pub per_regime: BTreeMap<String, RegimeAggregate>,
}

/// Final verdict for a validation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Validated,
    /// Gates pass only within the recorded regimes.
    Conditional,
    Invalidated,
    /// Verification failed before execution.
    Blocked,
    /// Pipeline fault; window failures above budget.
    Error,
}

// =============================================================================
// Validation record
// =============================================================================

/// Idempotence key for a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationKey {
    pub definition_hash: ContentHash,
    pub code_hash: ContentHash,
    pub generator_version: String,
}

/// Complete immutable validation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub schema_version: String,
    pub strategy_id: StrategyId,
    pub key: ValidationKey,
    pub started_at: DateTime<Utc>,
    pub windows: Vec<WindowResult>,
    pub gates: ValidationGates,
    pub gate_checks: Vec<GateCheck>,
    pub aggregate: Option<AggregateMetrics>,
    pub verdict: Verdict,
    /// Regimes in which gates passed, recorded for CONDITIONAL verdicts.
    pub passing_regimes: Vec<String>,
    pub notes: Option<String>,
}

impl ValidationRecord {
    /// Fraction of completed windows with Sharpe above zero.
    pub fn consistency(&self) -> Option<f64> {
        let completed: Vec<&WindowResult> = self
            .windows
            .iter()
            .filter(|w| w.status == WindowStatus::Completed)
            .collect();
        if completed.is_empty() {
            return None;
        }
        let positive = completed
            .iter()
            .filter(|w| w.metrics.as_ref().map(|m| m.sharpe > 0.0).unwrap_or(false))
            .count();
        Some(positive as f64 / completed.len() as f64)
    }

    pub fn is_passing(&self) -> bool {
        matches!(self.verdict, Verdict::Validated | Verdict::Conditional)
    }
}
