//! Red-flag detection over drafts.
//!
//! Hard flags reject outright; soft flags lower recorded trust and travel
//! with the record. Detection is deterministic: phrase lists, parameter
//! counts, and a fixed catalog of drawdown troughs for the cherry-picked
//! start-date check.

use chrono::NaiveDate;

use research_models::{flag_message, RedFlag};

use crate::draft::StrategyDraft;
use crate::rationale::FactorMatch;

/// Phrases claiming an absence of losing periods.
const NO_LOSS_PHRASES: &[&str] = &[
    "never had a losing",
    "never lost a month",
    "never lost a year",
    "no losing months",
    "no losing years",
    "no losing period",
];

/// Phrases claiming universal robustness.
const ALL_CONDITIONS_PHRASES: &[&str] = &[
    "works in all market conditions",
    "works in any market",
    "profitable in every market",
];

/// Phrases marking the author as a seller of courses/signals.
const SELLING_PHRASES: &[&str] = &[
    "course",
    "signal service",
    "signals subscription",
    "newsletter",
    "mentorship program",
];

/// Known bear-market troughs; a backtest starting within this window after
/// one of them is cherry-picked.
const DRAWDOWN_TROUGHS: &[(i32, u32, u32)] = &[
    (1987, 12, 4),
    (2002, 10, 9),
    (2009, 3, 9),
    (2011, 10, 3),
    (2016, 2, 11),
    (2018, 12, 24),
    (2020, 3, 23),
    (2022, 10, 12),
];

const TROUGH_WINDOW_DAYS: i64 = 180;

/// Factors crowded enough to warrant the crowded-factor flag.
const CROWDED_FACTORS: &[&str] = &["momentum", "value", "size", "low_volatility", "trend"];

fn soft(flag: &str) -> RedFlag {
    RedFlag::soft(flag, flag_message(flag).unwrap_or(flag))
}

fn hard(flag: &str) -> RedFlag {
    RedFlag::hard(flag, flag_message(flag).unwrap_or(flag))
}

fn starts_after_trough(start: NaiveDate) -> bool {
    DRAWDOWN_TROUGHS.iter().any(|&(y, m, d)| {
        NaiveDate::from_ymd_opt(y, m, d)
            .map(|trough| {
                let delta = (start - trough).num_days();
                (0..=TROUGH_WINDOW_DAYS).contains(&delta)
            })
            .unwrap_or(false)
    })
}

/// Detect all red flags for a draft.
///
/// `factor` is the rationale-inference result; it drives the
/// unknown-rationale and crowded-factor flags.
pub fn detect_red_flags(draft: &StrategyDraft, factor: Option<&FactorMatch>) -> Vec<RedFlag> {
    let mut flags = Vec::new();
    let text = draft.searchable_text();

    // ---- Hard flags -------------------------------------------------------

    let claimed_sharpe = draft
        .credibility
        .as_ref()
        .and_then(|c| c.claimed.as_ref())
        .and_then(|p| p.sharpe);
    if let Some(sharpe) = claimed_sharpe {
        if sharpe > 3.0 && !draft.evidence.is_hft {
            flags.push(hard("sharpe_above_3"));
        }
    }

    if NO_LOSS_PHRASES.iter().any(|p| text.contains(p)) {
        flags.push(hard("no_losing_periods"));
    }

    if ALL_CONDITIONS_PHRASES.iter().any(|p| text.contains(p)) {
        flags.push(hard("works_all_conditions"));
    }

    let conflicts = draft
        .credibility
        .as_ref()
        .and_then(|c| c.author_conflicts.as_deref())
        .unwrap_or("")
        .to_lowercase();
    if SELLING_PHRASES.iter().any(|p| conflicts.contains(p)) {
        flags.push(hard("author_selling"));
    }

    if let Some(def) = &draft.definition {
        if def.tunable_parameter_count() > 5 {
            flags.push(hard("excessive_parameters"));
        }
    }

    if let Some(start) = draft.evidence.backtest_start {
        if starts_after_trough(start) {
            flags.push(hard("convenient_start_date"));
        }
    }

    // ---- Soft flags -------------------------------------------------------

    let rationale_known = draft.rationale.is_some() || factor.is_some();
    if !rationale_known {
        flags.push(soft("unknown_rationale"));
    }

    if !draft.evidence.transaction_costs_discussed {
        flags.push(soft("no_transaction_costs"));
    }

    if !draft.evidence.drawdown_discussed {
        flags.push(soft("no_drawdown_mentioned"));
    }

    if draft.evidence.markets.len() <= 1 {
        flags.push(soft("single_market"));
    }

    if draft.evidence.regimes_covered.len() <= 1 {
        flags.push(soft("single_regime"));
    }

    if draft.evidence.sample_size.map(|n| n < 30).unwrap_or(false) {
        flags.push(soft("small_sample"));
    }

    if let Some(def) = &draft.definition {
        if def.position.max_leverage > 3.0 {
            flags.push(soft("high_leverage"));
        }

        // Parameters with suspicious precision and no stated justification.
        let has_magic = def.parameters.values().any(|&v| {
            let scaled = v * 100.0;
            (scaled - scaled.round()).abs() > 1e-9
        });
        if has_magic && draft.rationale.is_none() {
            flags.push(soft("magic_numbers"));
        }
    }

    if let Some(factor_match) = factor {
        if CROWDED_FACTORS.contains(&factor_match.factor) {
            flags.push(soft("crowded_factor"));
        }
    }

    flags
}
