//! Statistical validation over walk-forward window results.
//!
//! Bootstrap confidence intervals and a zero-skill null over window Sharpes,
//! multiple-testing correction across the definition lineage family, then
//! the configured gate set. Resample count and RNG seed are recorded in the
//! aggregate so any verdict is reproducible.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use research_models::{
    AggregateMetrics, CorrectionMethod, GateCheck, GateOutcome, RegimeAggregate, ValidationGates,
    Verdict, WindowResult, WindowStatus,
};

/// Minimum bootstrap resamples.
pub const MIN_RESAMPLES: u32 = 1000;

/// Minimum windows a regime needs before a CONDITIONAL verdict may lean on it.
const MIN_REGIME_WINDOWS: usize = 3;

/// Inputs to one validation pass.
pub struct ValidationInputs<'a> {
    pub windows: &'a [WindowResult],
    pub gates: &'a ValidationGates,
    /// Raw p-values of earlier validations in the same definition lineage.
    pub family_pvalues: &'a [f64],
    pub bootstrap_resamples: u32,
    pub bootstrap_seed: u64,
}

/// The statistical validator (C9).
pub struct StatisticalValidator;

impl StatisticalValidator {
    /// Compute aggregates, evaluate gates, and produce the verdict.
    ///
    /// Returns `Verdict::Error` when no window completed; gate failures are
    /// data and yield `Invalidated`.
    pub fn validate(
        inputs: &ValidationInputs<'_>,
    ) -> (Option<AggregateMetrics>, Vec<GateCheck>, Verdict, Vec<String>) {
        let completed: Vec<&WindowResult> = inputs
            .windows
            .iter()
            .filter(|w| w.status == WindowStatus::Completed && w.metrics.is_some())
            .collect();

        if completed.is_empty() {
            return (None, Vec::new(), Verdict::Error, Vec::new());
        }

        let sharpes: Vec<f64> = completed
            .iter()
            .filter_map(|w| w.metrics.as_ref().map(|m| m.sharpe))
            .collect();

        let resamples = inputs.bootstrap_resamples.max(MIN_RESAMPLES);
        let (ci_low, ci_high) = bootstrap_ci(&sharpes, resamples, inputs.bootstrap_seed);
        let p_raw = zero_skill_p_value(&sharpes, resamples, inputs.bootstrap_seed);

        let family_size = inputs.family_pvalues.len() as u32 + 1;
        let p_adjusted = match inputs.gates.correction {
            CorrectionMethod::Fdr => {
                let mut family = inputs.family_pvalues.to_vec();
                family.push(p_raw);
                bh_adjust(&family, family.len() - 1)
            }
            CorrectionMethod::Bonferroni => bonferroni_adjust(p_raw, family_size),
        };

        let mean_sharpe = mean(&sharpes);
        let consistency =
            sharpes.iter().filter(|&&s| s > 0.0).count() as f64 / sharpes.len() as f64;
        let effect_size = cohens_d(&sharpes);

        let mean_cagr = mean(
            &completed
                .iter()
                .filter_map(|w| w.metrics.as_ref().map(|m| m.cagr))
                .collect::<Vec<f64>>(),
        );
        let worst_drawdown = completed
            .iter()
            .filter_map(|w| w.metrics.as_ref().map(|m| m.max_drawdown))
            .fold(0.0_f64, f64::max);
        let total_trades: u32 = completed
            .iter()
            .filter_map(|w| w.metrics.as_ref().map(|m| m.trade_count))
            .sum();

        let per_regime = regime_aggregates(&completed);

        let aggregate = AggregateMetrics {
            window_count: completed.len() as u32,
            failed_windows: inputs
                .windows
                .iter()
                .filter(|w| w.status == WindowStatus::Error)
                .count() as u32,
            mean_sharpe,
            sharpe_ci_low: ci_low,
            sharpe_ci_high: ci_high,
            bootstrap_resamples: resamples,
            bootstrap_seed: inputs.bootstrap_seed,
            p_value_raw: p_raw,
            p_value_adjusted: p_adjusted,
            family_size,
            effect_size,
            consistency,
            mean_cagr,
            worst_drawdown,
            total_trades,
            per_regime: per_regime.clone(),
        };

        let gate_checks = evaluate_gates(&aggregate, inputs.gates);
        let all_pass = gate_checks.iter().all(GateCheck::passed);

        let (verdict, passing_regimes) = if all_pass {
            (Verdict::Validated, Vec::new())
        } else {
            let passing = passing_regimes(&completed, inputs.gates);
            if passing.is_empty() {
                (Verdict::Invalidated, Vec::new())
            } else {
                (Verdict::Conditional, passing)
            }
        };

        tracing::info!(
            windows = completed.len(),
            mean_sharpe,
            consistency,
            p_adjusted,
            ?verdict,
            "statistical validation complete"
        );

        (Some(aggregate), gate_checks, verdict, passing_regimes)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Cohen's d of window Sharpes against zero.
fn cohens_d(values: &[f64]) -> f64 {
    let sd = std_dev(values);
    if sd == 0.0 {
        return 0.0;
    }
    mean(values) / sd
}

/// Bootstrap 95% CI of the mean via percentile method.
pub fn bootstrap_ci(values: &[f64], resamples: u32, seed: u64) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut means = Vec::with_capacity(resamples as usize);
    for _ in 0..resamples {
        let resample_mean = (0..values.len())
            .map(|_| values[rng.gen_range(0..values.len())])
            .sum::<f64>()
            / values.len() as f64;
        means.push(resample_mean);
    }
    means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let low_idx = ((resamples as f64) * 0.025) as usize;
    let high_idx = (((resamples as f64) * 0.975) as usize).min(means.len() - 1);
    (means[low_idx], means[high_idx])
}

/// One-sided p-value against the zero-skill null: the bootstrap share of
/// resampled mean Sharpes at or below zero, add-one smoothed so p is never
/// exactly zero.
pub fn zero_skill_p_value(values: &[f64], resamples: u32, seed: u64) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    // Offset keeps the p-value stream independent of the CI stream.
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut at_or_below_zero = 0u32;
    for _ in 0..resamples {
        let resample_mean = (0..values.len())
            .map(|_| values[rng.gen_range(0..values.len())])
            .sum::<f64>()
            / values.len() as f64;
        if resample_mean <= 0.0 {
            at_or_below_zero += 1;
        }
    }
    (at_or_below_zero as f64 + 1.0) / (resamples as f64 + 1.0)
}

/// Bonferroni adjustment.
pub fn bonferroni_adjust(p: f64, family_size: u32) -> f64 {
    (p * family_size.max(1) as f64).min(1.0)
}

/// Benjamini-Hochberg adjusted p-value for `pvalues[target]` within the
/// family. Standard step-up: sort ascending, adjusted_i = min over j >= i of
/// p_j * m / (j + 1).
pub fn bh_adjust(pvalues: &[f64], target: usize) -> f64 {
    let m = pvalues.len();
    if m == 0 {
        return 1.0;
    }
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| {
        pvalues[a]
            .partial_cmp(&pvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // adjusted value per rank, enforcing monotonicity from the top.
    let mut adjusted = vec![0.0; m];
    let mut running_min = 1.0_f64;
    for rank in (0..m).rev() {
        let idx = order[rank];
        let raw = pvalues[idx] * m as f64 / (rank + 1) as f64;
        running_min = running_min.min(raw.min(1.0));
        adjusted[idx] = running_min;
    }
    adjusted[target]
}

fn evaluate_gates(aggregate: &AggregateMetrics, gates: &ValidationGates) -> Vec<GateCheck> {
    let mut checks = Vec::new();

    let sharpe_pass = aggregate.mean_sharpe >= gates.min_sharpe;
    checks.push(GateCheck {
        gate: "min_sharpe".into(),
        outcome: outcome(sharpe_pass),
        threshold: gates.min_sharpe,
        actual: Some(aggregate.mean_sharpe),
        message: format!(
            "mean Sharpe {:.2} {} {:.2}",
            aggregate.mean_sharpe,
            if sharpe_pass { ">=" } else { "<" },
            gates.min_sharpe
        ),
    });

    let consistency_pass = aggregate.consistency >= gates.min_consistency;
    checks.push(GateCheck {
        gate: "min_consistency".into(),
        outcome: outcome(consistency_pass),
        threshold: gates.min_consistency,
        actual: Some(aggregate.consistency),
        message: format!(
            "consistency {:.2} {} {:.2}",
            aggregate.consistency,
            if consistency_pass { ">=" } else { "<" },
            gates.min_consistency
        ),
    });

    let drawdown_pass = aggregate.worst_drawdown <= gates.max_drawdown;
    checks.push(GateCheck {
        gate: "max_drawdown".into(),
        outcome: outcome(drawdown_pass),
        threshold: gates.max_drawdown,
        actual: Some(aggregate.worst_drawdown),
        message: format!(
            "worst drawdown {:.1}% {} {:.1}%",
            aggregate.worst_drawdown * 100.0,
            if drawdown_pass { "<=" } else { ">" },
            gates.max_drawdown * 100.0
        ),
    });

    let trades_pass = aggregate.total_trades >= gates.min_trades;
    checks.push(GateCheck {
        gate: "min_trades".into(),
        outcome: outcome(trades_pass),
        threshold: gates.min_trades as f64,
        actual: Some(aggregate.total_trades as f64),
        message: format!(
            "{} trades {} {}",
            aggregate.total_trades,
            if trades_pass { ">=" } else { "<" },
            gates.min_trades
        ),
    });

    let p_pass = aggregate.p_value_adjusted < gates.adjusted_alpha;
    checks.push(GateCheck {
        gate: "adjusted_p".into(),
        outcome: outcome(p_pass),
        threshold: gates.adjusted_alpha,
        actual: Some(aggregate.p_value_adjusted),
        message: format!(
            "adjusted p {:.4} (family {}) {} alpha {:.3}",
            aggregate.p_value_adjusted,
            aggregate.family_size,
            if p_pass { "<" } else { ">=" },
            gates.adjusted_alpha
        ),
    });

    checks
}

fn outcome(pass: bool) -> GateOutcome {
    if pass {
        GateOutcome::Pass
    } else {
        GateOutcome::Fail
    }
}

/// Per-regime aggregates keyed "dimension:value".
fn regime_aggregates(completed: &[&WindowResult]) -> BTreeMap<String, RegimeAggregate> {
    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for window in completed {
        let (Some(metrics), Some(regimes)) = (&window.metrics, &window.regimes) else {
            continue;
        };
        let keys = [
            format!("direction:{:?}", regimes.direction).to_lowercase(),
            format!("volatility:{:?}", regimes.volatility).to_lowercase(),
            format!("rates:{:?}", regimes.rates).to_lowercase(),
            format!("sector:{}", regimes.sector.to_lowercase()),
            format!("cap:{:?}", regimes.cap).to_lowercase(),
        ];
        for key in keys {
            let entry = sums.entry(key).or_insert((0.0, 0));
            entry.0 += metrics.sharpe;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(key, (sum, count))| {
            (
                key,
                RegimeAggregate {
                    window_count: count,
                    mean_sharpe: sum / count as f64,
                },
            )
        })
        .collect()
}

/// Regimes with enough windows where the Sharpe and consistency gates pass
/// locally. A non-empty result downgrades a failed validation to
/// CONDITIONAL instead of INVALIDATED.
fn passing_regimes(completed: &[&WindowResult], gates: &ValidationGates) -> Vec<String> {
    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for window in completed {
        let (Some(metrics), Some(regimes)) = (&window.metrics, &window.regimes) else {
            continue;
        };
        let keys = [
            format!("direction:{:?}", regimes.direction).to_lowercase(),
            format!("volatility:{:?}", regimes.volatility).to_lowercase(),
            format!("rates:{:?}", regimes.rates).to_lowercase(),
            format!("cap:{:?}", regimes.cap).to_lowercase(),
        ];
        for key in keys {
            grouped.entry(key).or_default().push(metrics.sharpe);
        }
    }

    grouped
        .into_iter()
        .filter(|(_, sharpes)| {
            sharpes.len() >= MIN_REGIME_WINDOWS
                && mean(sharpes) >= gates.min_sharpe
                && sharpes.iter().filter(|&&s| s > 0.0).count() as f64 / sharpes.len() as f64
                    >= gates.min_consistency
        })
        .map(|(key, _)| key)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use research_models::{
        CapRegime, DirectionRegime, RatesRegime, RegimeTags, VolatilityRegime, WindowMetrics,
    };

    fn window(index: u32, sharpe: f64, drawdown: f64, trades: u32) -> WindowResult {
        WindowResult {
            index,
            start: NaiveDate::from_ymd_opt(1990 + index as i32, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(1992 + index as i32, 12, 31).unwrap(),
            status: WindowStatus::Completed,
            metrics: Some(WindowMetrics {
                sharpe,
                cagr: sharpe * 0.08,
                max_drawdown: drawdown,
                trade_count: trades,
                ..Default::default()
            }),
            regimes: Some(RegimeTags {
                direction: if sharpe > 0.0 {
                    DirectionRegime::Bull
                } else {
                    DirectionRegime::Bear
                },
                volatility: VolatilityRegime::Normal,
                rates: RatesRegime::Flat,
                sector: "technology".into(),
                cap: CapRegime::Mixed,
            }),
            error: None,
        }
    }

    fn strong_windows() -> Vec<WindowResult> {
        (1..=12).map(|i| window(i, 1.4, 0.12, 40)).collect()
    }

    fn inputs<'a>(
        windows: &'a [WindowResult],
        gates: &'a ValidationGates,
        family: &'a [f64],
    ) -> ValidationInputs<'a> {
        ValidationInputs {
            windows,
            gates,
            family_pvalues: family,
            bootstrap_resamples: 1000,
            bootstrap_seed: 42,
        }
    }

    #[test]
    fn test_strong_strategy_validates() {
        let windows = strong_windows();
        let gates = ValidationGates::default();
        let (aggregate, checks, verdict, _) =
            StatisticalValidator::validate(&inputs(&windows, &gates, &[]));
        assert_eq!(verdict, Verdict::Validated);
        let aggregate = aggregate.unwrap();
        assert!(aggregate.consistency > 0.99);
        assert!(aggregate.p_value_adjusted < 0.05);
        assert!(checks.iter().all(GateCheck::passed));
    }

    #[test]
    fn test_weak_strategy_invalidates() {
        let windows: Vec<WindowResult> = (1..=12)
            .map(|i| window(i, if i % 2 == 0 { 0.2 } else { -0.4 }, 0.35, 10))
            .collect();
        let gates = ValidationGates::default();
        let (_, checks, verdict, _) =
            StatisticalValidator::validate(&inputs(&windows, &gates, &[]));
        assert_eq!(verdict, Verdict::Invalidated);
        assert!(checks.iter().any(|c| !c.passed()));
    }

    #[test]
    fn test_regime_conditional_pass() {
        // Strong in bull windows, poor in bear windows: gates fail overall
        // but the bull regime carries enough windows to pass locally.
        let mut windows: Vec<WindowResult> = (1..=6).map(|i| window(i, 1.8, 0.10, 40)).collect();
        windows.extend((7..=12).map(|i| window(i, -0.6, 0.20, 40)));
        let gates = ValidationGates::default();
        let (_, _, verdict, passing) =
            StatisticalValidator::validate(&inputs(&windows, &gates, &[]));
        assert_eq!(verdict, Verdict::Conditional);
        assert!(passing.contains(&"direction:bull".to_string()));
    }

    #[test]
    fn test_no_completed_windows_is_error() {
        let windows = vec![WindowResult {
            index: 1,
            start: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2012, 12, 31).unwrap(),
            status: WindowStatus::Error,
            metrics: None,
            regimes: None,
            error: Some("backend timeout".into()),
        }];
        let gates = ValidationGates::default();
        let (aggregate, _, verdict, _) =
            StatisticalValidator::validate(&inputs(&windows, &gates, &[]));
        assert!(aggregate.is_none());
        assert_eq!(verdict, Verdict::Error);
    }

    #[test]
    fn test_bootstrap_is_reproducible() {
        let values = [0.5, 1.2, 0.8, -0.1, 0.9, 1.1];
        let a = bootstrap_ci(&values, 1000, 7);
        let b = bootstrap_ci(&values, 1000, 7);
        assert_eq!(a, b);
        let c = bootstrap_ci(&values, 1000, 8);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ci_brackets_mean() {
        let values = [0.5, 1.2, 0.8, 0.1, 0.9, 1.1, 0.7, 0.6];
        let (low, high) = bootstrap_ci(&values, 2000, 3);
        let m = mean(&values);
        assert!(low < m && m < high);
    }

    #[test]
    fn test_bonferroni_scales_with_family() {
        assert_eq!(bonferroni_adjust(0.01, 5), 0.05);
        assert_eq!(bonferroni_adjust(0.5, 10), 1.0);
    }

    #[test]
    fn test_bh_adjustment_properties() {
        let pvalues = [0.01, 0.02, 0.03, 0.2, 0.8];
        // BH never reduces a p-value below its raw value.
        for (i, &raw) in pvalues.iter().enumerate() {
            assert!(bh_adjust(&pvalues, i) >= raw - 1e-12);
        }
        // Largest p is unchanged (rank m).
        assert!((bh_adjust(&pvalues, 4) - 0.8).abs() < 1e-12);
        // Smallest p scales by m/1 bounded by the next adjusted value.
        assert!(bh_adjust(&pvalues, 0) <= bh_adjust(&pvalues, 3));
    }

    #[test]
    fn test_larger_family_never_lowers_adjusted_p() {
        let p = 0.02;
        let small = bh_adjust(&[0.5, p], 1);
        let large = bh_adjust(&[0.5, 0.4, 0.3, p], 3);
        assert!(large >= small - 1e-12);
    }
}
