//! Ingestion quality scoring: specificity, trust, red flags, decision.
//!
//! Specificity asks "can we actually backtest this?"; trust asks "is it
//! worth testing?". Hard red flags reject outright; soft flags lower trust
//! and travel with the record as warnings. The decision is a pure function
//! of the two scores and the flag set.

use serde::{Deserialize, Serialize};

// =============================================================================
// Specificity
// =============================================================================

/// Eight presence checks on the extracted draft. Score = count of true bits.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpecificityScore {
    pub has_entry_rules: bool,
    pub has_exit_rules: bool,
    pub has_position_sizing: bool,
    pub has_universe_definition: bool,
    pub has_backtest_period: bool,
    pub has_out_of_sample: bool,
    pub has_transaction_costs: bool,
    pub has_code_or_pseudocode: bool,
}

impl SpecificityScore {
    /// Total score, 0-8.
    pub fn score(&self) -> u8 {
        [
            self.has_entry_rules,
            self.has_exit_rules,
            self.has_position_sizing,
            self.has_universe_definition,
            self.has_backtest_period,
            self.has_out_of_sample,
            self.has_transaction_costs,
            self.has_code_or_pseudocode,
        ]
        .iter()
        .filter(|&&b| b)
        .count() as u8
    }

    pub fn passes(&self, threshold: u8) -> bool {
        self.score() >= threshold
    }
}

// =============================================================================
// Trust
// =============================================================================

/// Weighted trust composite, clamped to 0-100.
///
/// `economic_rationale (0-30) + oos_evidence (0-25) + implementation_realism
/// (0-20) + source_credibility (0-15) + novelty (0-10) - 15 * red_flag_count`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrustScore {
    pub economic_rationale: u8,
    pub out_of_sample_evidence: u8,
    pub implementation_realism: u8,
    pub source_credibility: u8,
    pub novelty: u8,
    /// Number of red flags applying the -15 penalty each.
    pub red_flag_count: u8,
}

/// Penalty per red flag.
pub const RED_FLAG_PENALTY: i32 = 15;

impl TrustScore {
    /// Component composite before red-flag penalties, clamped to 0-100.
    ///
    /// The archive gate applies here: soft flags demand scrutiny and lower
    /// the recorded score, but evidence-rich strategies still proceed.
    pub fn base_total(&self) -> u8 {
        let raw = self.economic_rationale as i32
            + self.out_of_sample_evidence as i32
            + self.implementation_realism as i32
            + self.source_credibility as i32
            + self.novelty as i32;
        raw.clamp(0, 100) as u8
    }

    /// Recorded score, penalties included, clamped to 0-100.
    pub fn total(&self) -> u8 {
        let raw =
            self.base_total() as i32 - RED_FLAG_PENALTY * self.red_flag_count as i32;
        raw.clamp(0, 100) as u8
    }

    pub fn passes(&self, threshold: u8) -> bool {
        self.base_total() >= threshold
    }
}

// =============================================================================
// Red flags
// =============================================================================

/// Severity of a red flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedFlagSeverity {
    /// Auto-reject.
    Hard,
    /// Warn and penalize trust.
    Soft,
}

/// A detected red flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedFlag {
    pub flag: String,
    pub severity: RedFlagSeverity,
    pub message: String,
}

impl RedFlag {
    pub fn hard(flag: &str, message: impl Into<String>) -> Self {
        Self {
            flag: flag.to_string(),
            severity: RedFlagSeverity::Hard,
            message: message.into(),
        }
    }

    pub fn soft(flag: &str, message: impl Into<String>) -> Self {
        Self {
            flag: flag.to_string(),
            severity: RedFlagSeverity::Soft,
            message: message.into(),
        }
    }
}

/// Hard flags and their canonical messages.
pub const HARD_RED_FLAGS: &[(&str, &str)] = &[
    (
        "sharpe_above_3",
        "Claimed Sharpe > 3.0 (non-HFT) - almost certainly overfit or fraud",
    ),
    (
        "no_losing_periods",
        "'Never had a losing month/year' - statistically implausible",
    ),
    (
        "works_all_conditions",
        "'Works in all market conditions' - nothing does",
    ),
    (
        "author_selling",
        "Author selling courses/signals/newsletters - massive incentive bias",
    ),
    (
        "convenient_start_date",
        "Backtest starts right after a known drawdown - cherry-picked period",
    ),
    (
        "excessive_parameters",
        "More than 5 tunable parameters - overfitting machine",
    ),
];

/// Soft flags and their canonical messages.
pub const SOFT_RED_FLAGS: &[(&str, &str)] = &[
    ("unknown_rationale", "No rationale found after inference"),
    ("no_transaction_costs", "No discussion of costs/slippage"),
    ("no_drawdown_mentioned", "No drawdown discussed - may be hiding pain"),
    ("single_market", "Only tested in one geography"),
    ("single_regime", "Only tested in one market regime"),
    ("small_sample", "Fewer than 30 independent observations"),
    ("high_leverage", "Requires leverage > 3x"),
    ("crowded_factor", "Relies on a well-known factor"),
    ("magic_numbers", "Specific parameters without justification"),
];

/// Canonical message for a known flag id.
pub fn flag_message(flag: &str) -> Option<&'static str> {
    HARD_RED_FLAGS
        .iter()
        .chain(SOFT_RED_FLAGS.iter())
        .find(|(id, _)| *id == flag)
        .map(|(_, msg)| *msg)
}

// =============================================================================
// Decision
// =============================================================================

/// Routing decision for an extracted draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionDecision {
    /// Enters the pipeline as PENDING.
    Accept,
    /// Held for manual triage (extraction ambiguous).
    Queue,
    /// Below threshold; kept for audit, never validated.
    Archive,
    /// Hard red flag.
    Reject,
}

/// Complete ingestion quality assessment attached to the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionQuality {
    pub specificity: SpecificityScore,
    pub trust: TrustScore,
    pub red_flags: Vec<RedFlag>,
    pub decision: IngestionDecision,
    pub decision_reason: Option<String>,
    /// Soft-flag messages carried forward on accept.
    pub warnings: Vec<String>,
}

impl IngestionQuality {
    pub fn hard_flags(&self) -> impl Iterator<Item = &RedFlag> {
        self.red_flags
            .iter()
            .filter(|f| f.severity == RedFlagSeverity::Hard)
    }

    pub fn soft_flags(&self) -> impl Iterator<Item = &RedFlag> {
        self.red_flags
            .iter()
            .filter(|f| f.severity == RedFlagSeverity::Soft)
    }

    /// Compute the decision from scores and flags.
    ///
    /// Order: hard flags reject; specificity below threshold archives
    /// (untestable); trust below threshold archives (not worth testing);
    /// otherwise accept, carrying soft-flag warnings.
    pub fn decide(&mut self, specificity_threshold: u8, trust_threshold: u8) -> IngestionDecision {
        let hard: Vec<String> = self.hard_flags().map(|f| f.flag.clone()).collect();
        if !hard.is_empty() {
            self.decision_reason = Some(format!("Hard red flags: {}", hard.join(", ")));
            self.decision = IngestionDecision::Reject;
            return self.decision;
        }

        if !self.specificity.passes(specificity_threshold) {
            self.decision_reason = Some(format!(
                "Specificity score {}/{} - too vague to test",
                self.specificity.score(),
                specificity_threshold
            ));
            self.decision = IngestionDecision::Archive;
            return self.decision;
        }

        if !self.trust.passes(trust_threshold) {
            self.decision_reason = Some(format!(
                "Trust score {}/{} - not worth testing",
                self.trust.base_total(),
                trust_threshold
            ));
            self.decision = IngestionDecision::Archive;
            return self.decision;
        }

        self.warnings = self.soft_flags().map(|f| f.message.clone()).collect();
        self.decision = IngestionDecision::Accept;
        self.decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quality(spec: u8, trust: TrustScore, flags: Vec<RedFlag>) -> IngestionQuality {
        let specificity = SpecificityScore {
            has_entry_rules: spec > 0,
            has_exit_rules: spec > 1,
            has_position_sizing: spec > 2,
            has_universe_definition: spec > 3,
            has_backtest_period: spec > 4,
            has_out_of_sample: spec > 5,
            has_transaction_costs: spec > 6,
            has_code_or_pseudocode: spec > 7,
        };
        IngestionQuality {
            specificity,
            trust,
            red_flags: flags,
            decision: IngestionDecision::Queue,
            decision_reason: None,
            warnings: vec![],
        }
    }

    fn strong_trust(red_flag_count: u8) -> TrustScore {
        TrustScore {
            economic_rationale: 28,
            out_of_sample_evidence: 22,
            implementation_realism: 16,
            source_credibility: 12,
            novelty: 7,
            red_flag_count,
        }
    }

    #[test]
    fn test_trust_clamps() {
        let t = TrustScore {
            red_flag_count: 10,
            ..Default::default()
        };
        assert_eq!(t.total(), 0);
    }

    #[test]
    fn test_hard_flag_rejects_regardless_of_scores() {
        let mut q = quality(
            8,
            strong_trust(0),
            vec![RedFlag::hard("author_selling", "sells a course")],
        );
        assert_eq!(q.decide(4, 50), IngestionDecision::Reject);
        assert!(q.decision_reason.as_deref().unwrap().contains("author_selling"));
    }

    #[test]
    fn test_low_specificity_archives() {
        let mut q = quality(2, strong_trust(0), vec![]);
        assert_eq!(q.decide(4, 50), IngestionDecision::Archive);
        assert!(q.decision_reason.as_deref().unwrap().contains("too vague"));
    }

    #[test]
    fn test_low_trust_archives() {
        let mut q = quality(8, TrustScore::default(), vec![]);
        assert_eq!(q.decide(4, 50), IngestionDecision::Archive);
        assert!(q
            .decision_reason
            .as_deref()
            .unwrap()
            .contains("not worth testing"));
    }

    #[test]
    fn test_soft_flags_accept_with_warnings() {
        let mut q = quality(
            8,
            strong_trust(2),
            vec![
                RedFlag::soft("crowded_factor", "well-known factor"),
                RedFlag::soft("no_transaction_costs", "no cost discussion"),
            ],
        );
        assert_eq!(q.decide(4, 50), IngestionDecision::Accept);
        assert_eq!(q.warnings.len(), 2);
    }

    #[test]
    fn test_decision_is_pure_in_scores_and_flags() {
        // Same inputs, same decision - no hidden state.
        let make = || quality(8, strong_trust(1), vec![RedFlag::soft("single_market", "m")]);
        let (mut a, mut b) = (make(), make());
        assert_eq!(a.decide(4, 50), b.decide(4, 50));
        assert_eq!(a.decision_reason, b.decision_reason);
    }
}
