//! Pipeline stage driver.
//!
//! Each stage is a function over the record store: it claims the record via
//! a CAS transition, does its work, and transitions forward (or to
//! BLOCKED/ERROR with a recorded cause). Workers for different records can
//! run concurrently; a single record's stages are totally ordered by the
//! state machine.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{Datelike, Utc};

use research_backtest::{BacktestBackend, ReferenceData, WalkForwardExecutor};
use research_codegen::{generate, Artifact, GENERATOR_VERSION};
use research_gates::{
    CheckStatus, DataRegistry, StatisticalValidator, ValidationInputs, VerificationEngine,
};
use research_models::{
    Insight, InsightDimension, LearningRecord, StrategyDocument, StrategyId, StrategyState,
    ValidationKey, ValidationRecord, Verdict, VALIDATION_SCHEMA_VERSION,
};
use research_store::{RecordStore, StoreError};

/// Outcome of a pipeline stage, mapped to an exit code by the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Ok(String),
    Blocked(String),
    Invalidated(String),
    Error(String),
}

impl StageOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ok(_) => 0,
            Self::Blocked(_) => 2,
            Self::Invalidated(_) => 3,
            Self::Error(_) => 4,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Ok(m) | Self::Blocked(m) | Self::Invalidated(m) | Self::Error(m) => m,
        }
    }
}

/// Default anchor year: the last fully complete calendar year.
pub fn default_anchor_year() -> i32 {
    Utc::now().year() - 1
}

// =============================================================================
// Verify stage
// =============================================================================

/// PENDING -> VERIFYING -> {READY_TO_GENERATE | BLOCKED}.
///
/// Also resumes BLOCKED and ERROR records by re-running verification.
pub fn run_verify(
    store: &RecordStore,
    registry: &DataRegistry,
    id: &StrategyId,
    anchor_year: i32,
) -> Result<StageOutcome> {
    let doc = store.get_strategy(id)?;
    let from = doc.state;
    if !matches!(
        from,
        StrategyState::Pending | StrategyState::Blocked | StrategyState::Error
    ) {
        return Ok(StageOutcome::Error(format!(
            "{id} is {from}; verify expects pending, blocked, or error"
        )));
    }
    store.update_state(id, from, StrategyState::Verifying, None)?;

    let config = store.workspace().config();
    let spans = research_backtest::slice_windows(
        anchor_year,
        config.walk_forward.window_count,
        config.walk_forward.window_span_years,
    );
    let (history_start, history_end) = match (spans.first(), spans.last()) {
        (Some(&(start, _)), Some(&(_, end))) => (start, end),
        _ => {
            store.update_state(id, StrategyState::Verifying, StrategyState::Error,
                Some("no walk-forward windows configured"))?;
            return Ok(StageOutcome::Error("no walk-forward windows configured".into()));
        }
    };

    let engine = VerificationEngine::new(registry, &config.verification.checks);
    let doc = store.get_strategy(id)?;
    let report = if config.verification.enabled {
        engine.verify_document(&doc, history_start, history_end)
    } else {
        research_gates::VerificationReport::new(vec![])
    };

    if report.passed {
        store.update_state(id, StrategyState::Verifying, StrategyState::ReadyToGenerate, None)?;
        Ok(StageOutcome::Ok(format!(
            "{id} verified ({} checks)",
            report.checks.len()
        )))
    } else {
        let reason = report.block_reason();
        store.update_state(id, StrategyState::Verifying, StrategyState::Blocked, Some(&reason))?;
        Ok(StageOutcome::Blocked(reason))
    }
}

// =============================================================================
// Generate stage
// =============================================================================

/// READY_TO_GENERATE -> GENERATING -> {READY_TO_EXECUTE | NEEDS_REVIEW |
/// GEN_FAILED | BLOCKED (fingerprint)}.
pub fn run_generate(
    store: &RecordStore,
    registry: &DataRegistry,
    id: &StrategyId,
) -> Result<StageOutcome> {
    let doc = store.get_strategy(id)?;
    let from = doc.state;
    if !matches!(from, StrategyState::ReadyToGenerate | StrategyState::GenFailed) {
        return Ok(StageOutcome::Error(format!(
            "{id} is {from}; generate expects ready_to_generate"
        )));
    }
    store.update_state(id, from, StrategyState::Generating, None)?;

    let artifact = match generate(&doc.definition) {
        Ok(artifact) => artifact,
        Err(first_error) => {
            // One retry against the normalized definition; generation is
            // pure, so a second failure is terminal for this stage.
            let sanitized = doc.definition.normalized();
            match generate(&sanitized) {
                Ok(artifact) => artifact,
                Err(_) => {
                    let reason = format!("generation failed: {first_error}");
                    store.update_state(
                        id,
                        StrategyState::Generating,
                        StrategyState::GenFailed,
                        Some(&reason),
                    )?;
                    return Ok(StageOutcome::Error(reason));
                }
            }
        }
    };

    // Tier-3 artifacts skip the fingerprint gate; the human review
    // transition owns that risk.
    if artifact.needs_review {
        store.update_state(
            id,
            StrategyState::Generating,
            StrategyState::NeedsReview,
            Some("tier-3 artifact awaiting human review"),
        )?;
        return Ok(StageOutcome::Ok(format!(
            "{id} generated tier-3 artifact; awaiting review (code {})",
            artifact.code_hash.short()
        )));
    }

    let config = store.workspace().config();
    let engine = VerificationEngine::new(registry, &config.verification.checks);
    let fingerprint_check = engine.check_fingerprint(&doc, &artifact.fingerprint);
    if fingerprint_check.status == CheckStatus::Fail {
        let reason = format!("fingerprint mismatch: {}", fingerprint_check.message);
        store.update_state(id, StrategyState::Generating, StrategyState::Blocked, Some(&reason))?;
        return Ok(StageOutcome::Blocked(reason));
    }

    store.update_state(id, StrategyState::Generating, StrategyState::ReadyToExecute, None)?;
    Ok(StageOutcome::Ok(format!(
        "{id} generated {} artifact (code {})",
        artifact.generator_version,
        artifact.code_hash.short()
    )))
}

/// Regenerate the artifact for an already-generated record (pure function,
/// byte-identical by contract).
pub fn regenerate_artifact(doc: &StrategyDocument) -> Result<Artifact> {
    generate(&doc.definition).map_err(|e| anyhow!("artifact regeneration failed: {e}"))
}

// =============================================================================
// Execute + validate stage
// =============================================================================

/// READY_TO_EXECUTE -> EXECUTING -> ANALYZING -> verdict state.
///
/// Runs walk-forward windows, applies the statistical validator, appends
/// the immutable validation record, and lands the record on its verdict.
pub async fn run_validate(
    store: &RecordStore,
    backend: Arc<dyn BacktestBackend>,
    reference: Arc<dyn ReferenceData>,
    id: &StrategyId,
    anchor_year: i32,
    seed: u64,
    force: bool,
) -> Result<StageOutcome> {
    let doc = store.get_strategy(id)?;
    let from = doc.state;
    if !matches!(from, StrategyState::ReadyToExecute | StrategyState::Error) {
        return Ok(StageOutcome::Error(format!(
            "{id} is {from}; validate expects ready_to_execute"
        )));
    }

    let artifact = regenerate_artifact(&doc)?;
    let key = ValidationKey {
        definition_hash: doc.definition_hash.clone(),
        code_hash: artifact.code_hash.clone(),
        generator_version: GENERATOR_VERSION.to_string(),
    };

    // OOS one-shot: refuse re-runs against an already-validated key before
    // any compute is spent. The store enforces this again on append.
    if !force && store.has_validation(id, &key)? {
        return Ok(StageOutcome::Error(format!(
            "validation already exists for {id} at definition {}; out-of-sample is one-shot \
             (change the definition, or pass --force to append an audit run)",
            key.definition_hash.short()
        )));
    }

    store.update_state(id, from, StrategyState::Executing, None)?;

    let config = store.workspace().config().clone();
    let executor = WalkForwardExecutor::new(backend, reference, config.walk_forward.clone());
    let windows = match executor.execute(&artifact.code, anchor_year, seed).await {
        Ok(windows) => windows,
        Err(e) => {
            let reason = e.to_string();
            store.update_state(id, StrategyState::Executing, StrategyState::Error, Some(&reason))?;
            return Ok(StageOutcome::Error(reason));
        }
    };

    store.update_state(id, StrategyState::Executing, StrategyState::Analyzing, None)?;

    let budget_exceeded = executor.failed_window_budget_exceeded(&windows);

    // Family for the multiple-testing correction: earlier validations in
    // this definition's lineage.
    let mut family_pvalues = Vec::new();
    for record in store.list_validations(id)? {
        if let Some(aggregate) = record.aggregate {
            family_pvalues.push(aggregate.p_value_raw);
        }
    }
    for ancestor in store.resolve_lineage(id)? {
        for record in store.list_validations(&ancestor)? {
            if let Some(aggregate) = record.aggregate {
                family_pvalues.push(aggregate.p_value_raw);
            }
        }
    }

    let inputs = ValidationInputs {
        windows: &windows,
        gates: &config.gates,
        family_pvalues: &family_pvalues,
        bootstrap_resamples: 2000,
        bootstrap_seed: seed,
    };
    let (aggregate, gate_checks, mut verdict, passing_regimes) =
        StatisticalValidator::validate(&inputs);

    let mut notes = None;
    if budget_exceeded && verdict != Verdict::Error {
        verdict = Verdict::Error;
        notes = Some("failed-window budget exceeded".to_string());
    }

    let record = ValidationRecord {
        schema_version: VALIDATION_SCHEMA_VERSION.to_string(),
        strategy_id: id.clone(),
        key,
        started_at: Utc::now(),
        windows,
        gates: config.gates.clone(),
        gate_checks,
        aggregate,
        verdict,
        passing_regimes: passing_regimes.clone(),
        notes,
    };
    store.append_validation(&record, &artifact.code, force)?;

    match verdict {
        Verdict::Validated => {
            store.update_state(id, StrategyState::Analyzing, StrategyState::Validated, None)?;
            Ok(StageOutcome::Ok(format!("{id} VALIDATED")))
        }
        Verdict::Conditional => {
            let reason = format!("conditional on {}", passing_regimes.join(", "));
            store.update_state(
                id,
                StrategyState::Analyzing,
                StrategyState::Conditional,
                Some(&reason),
            )?;
            Ok(StageOutcome::Ok(format!("{id} CONDITIONAL ({reason})")))
        }
        Verdict::Invalidated => {
            let reason = record
                .gate_checks
                .iter()
                .filter(|c| !c.passed())
                .map(|c| c.message.clone())
                .collect::<Vec<_>>()
                .join("; ");
            store.update_state(
                id,
                StrategyState::Analyzing,
                StrategyState::Invalidated,
                Some(&reason),
            )?;
            Ok(StageOutcome::Invalidated(format!("{id} INVALIDATED: {reason}")))
        }
        Verdict::Error | Verdict::Blocked => {
            let reason = record
                .notes
                .clone()
                .unwrap_or_else(|| "validation errored".to_string());
            store.update_state(id, StrategyState::Analyzing, StrategyState::Error, Some(&reason))?;
            Ok(StageOutcome::Error(reason))
        }
    }
}

// =============================================================================
// Learn stage
// =============================================================================

/// Deterministic learning extraction from the latest validation record.
pub fn run_learn(store: &RecordStore, id: &StrategyId) -> Result<StageOutcome> {
    let doc = store.get_strategy(id)?;
    let validations = store.list_validations(id)?;
    let Some(latest) = validations.last() else {
        return Ok(StageOutcome::Error(format!("{id} has no validation records")));
    };

    let mut insights = Vec::new();
    if let Some(aggregate) = &latest.aggregate {
        insights.push(Insight {
            dimension: InsightDimension::EdgeMechanism,
            statement: format!(
                "mean Sharpe {:.2} across {} windows (95% CI {:.2}..{:.2}), verdict {:?}",
                aggregate.mean_sharpe,
                aggregate.window_count,
                aggregate.sharpe_ci_low,
                aggregate.sharpe_ci_high,
                latest.verdict
            ),
            attributed_to: None,
        });
        insights.push(Insight {
            dimension: InsightDimension::Implementation,
            statement: format!(
                "{} trades, worst drawdown {:.1}%, adjusted p {:.4} over family of {}",
                aggregate.total_trades,
                aggregate.worst_drawdown * 100.0,
                aggregate.p_value_adjusted,
                aggregate.family_size
            ),
            attributed_to: None,
        });

        // Regime sensitivity: spread between best and worst regime.
        let mut best: Option<(&String, f64)> = None;
        let mut worst: Option<(&String, f64)> = None;
        for (name, stats) in &aggregate.per_regime {
            if best.map(|(_, s)| stats.mean_sharpe > s).unwrap_or(true) {
                best = Some((name, stats.mean_sharpe));
            }
            if worst.map(|(_, s)| stats.mean_sharpe < s).unwrap_or(true) {
                worst = Some((name, stats.mean_sharpe));
            }
        }
        if let (Some((best_name, best_sharpe)), Some((worst_name, worst_sharpe))) = (best, worst) {
            if best_sharpe - worst_sharpe > 0.5 {
                insights.push(Insight {
                    dimension: InsightDimension::RegimeSensitivity,
                    statement: format!(
                        "regime-dependent: {best_name} Sharpe {best_sharpe:.2} vs \
                         {worst_name} {worst_sharpe:.2}"
                    ),
                    attributed_to: None,
                });
            }
        }
    }

    if insights.is_empty() {
        return Ok(StageOutcome::Error(format!(
            "{id} latest validation carries no aggregates to learn from"
        )));
    }

    let factors = doc
        .edge_provenance
        .as_ref()
        .and_then(|p| p.factor_alignment.clone())
        .into_iter()
        .collect();
    let count = insights.len();
    store.append_learning(&LearningRecord {
        strategy_id: id.clone(),
        validation_refs: vec![latest.key.definition_hash.to_string()],
        created: Utc::now(),
        factors,
        insights,
    })?;
    Ok(StageOutcome::Ok(format!("{id}: {count} insight(s) recorded")))
}

// =============================================================================
// Review + approval transitions
// =============================================================================

/// Human approval of a tier-3 artifact: NEEDS_REVIEW -> READY_TO_EXECUTE.
pub fn approve_review(store: &RecordStore, id: &StrategyId, note: &str) -> Result<StageOutcome> {
    match store.update_state(
        id,
        StrategyState::NeedsReview,
        StrategyState::ReadyToExecute,
        Some(note),
    ) {
        Ok(_) => Ok(StageOutcome::Ok(format!("{id} review approved"))),
        Err(StoreError::StateConflict { actual, .. }) => Ok(StageOutcome::Error(format!(
            "{id} is {actual}, not awaiting review"
        ))),
        Err(e) => Err(e.into()),
    }
}
