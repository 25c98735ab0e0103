//! Specificity and trust scoring over drafts.
//!
//! Both scores are deterministic functions of the draft, the inferred
//! provenance, and the detected flag count. Component ceilings come from the
//! workspace scoring weights.

use research_models::{
    AuthorTrackRecord, EdgeProvenance, ProvenanceSource, SpecificityScore, TrustScore,
};
use research_store::ScoringWeights;

use crate::draft::StrategyDraft;

/// Compute the eight presence bits.
pub fn score_specificity(draft: &StrategyDraft) -> SpecificityScore {
    let def = draft.definition.as_ref();
    SpecificityScore {
        has_entry_rules: def.map(|d| !d.entry.condition.is_empty()).unwrap_or(false),
        has_exit_rules: def.map(|d| !d.exit.paths.is_empty()).unwrap_or(false),
        has_position_sizing: def.is_some(),
        has_universe_definition: def
            .map(|d| !d.universe.symbols.is_empty() || d.universe.base.is_some())
            .unwrap_or(false),
        has_backtest_period: draft.evidence.backtest_period.is_some(),
        has_out_of_sample: draft.evidence.out_of_sample,
        has_transaction_costs: draft.evidence.transaction_costs_discussed,
        has_code_or_pseudocode: draft.evidence.code_provided,
    }
}

/// Compute trust components. `red_flag_count` is the total detected flag
/// count; each flag costs 15 recorded points.
pub fn score_trust(
    draft: &StrategyDraft,
    provenance: &EdgeProvenance,
    factor_crowded: bool,
    red_flag_count: u8,
    weights: &ScoringWeights,
) -> TrustScore {
    TrustScore {
        economic_rationale: rationale_component(draft, provenance, weights.economic_rationale),
        out_of_sample_evidence: oos_component(draft, weights.out_of_sample),
        implementation_realism: realism_component(draft, weights.implementation_realism),
        source_credibility: credibility_component(draft, weights.source_credibility),
        novelty: novelty_component(provenance, factor_crowded, weights.novelty),
        red_flag_count,
    }
}

/// Rationale depth, scaled by provenance quality.
fn rationale_component(draft: &StrategyDraft, provenance: &EdgeProvenance, ceiling: u8) -> u8 {
    let fraction = match provenance.source {
        ProvenanceSource::SourceStated => {
            let detail = draft.rationale.as_deref().unwrap_or("").len();
            if detail >= 200 {
                1.0
            } else {
                0.8
            }
        }
        ProvenanceSource::SourceEnhanced => 0.75,
        ProvenanceSource::Inferred => 0.5,
        ProvenanceSource::Unknown => 0.0,
    };
    scale(ceiling, fraction)
}

/// Out-of-sample evidence: replications raise the score toward the ceiling;
/// a stated backtest period alone earns a sliver.
fn oos_component(draft: &StrategyDraft, ceiling: u8) -> u8 {
    if draft.evidence.out_of_sample {
        let replications = draft.evidence.oos_periods.min(5) as f64;
        scale(ceiling, 0.6 + 0.08 * replications)
    } else if draft.evidence.backtest_period.is_some() {
        scale(ceiling, 0.2)
    } else {
        0
    }
}

fn realism_component(draft: &StrategyDraft, ceiling: u8) -> u8 {
    let mut fraction = 0.0;
    if draft.evidence.transaction_costs_discussed {
        fraction += 0.4;
    }
    if draft.evidence.drawdown_discussed {
        fraction += 0.3;
    }
    if draft.evidence.capacity_discussed {
        fraction += 0.3;
    }
    scale(ceiling, fraction)
}

fn credibility_component(draft: &StrategyDraft, ceiling: u8) -> u8 {
    let Some(credibility) = &draft.credibility else {
        return scale(ceiling, 0.15);
    };
    let mut fraction: f64 = match credibility.author_track_record {
        AuthorTrackRecord::VerifiedFundManager => 0.8,
        AuthorTrackRecord::Academic => 0.8,
        AuthorTrackRecord::RetailVerified => 0.55,
        AuthorTrackRecord::RetailUnverified => 0.25,
        AuthorTrackRecord::Unknown => 0.15,
    };
    if credibility.author_skin_in_game {
        fraction += 0.2;
    }
    scale(ceiling, fraction.min(1.0))
}

/// New alpha scores high; repackaged crowded factors score zero.
fn novelty_component(provenance: &EdgeProvenance, factor_crowded: bool, ceiling: u8) -> u8 {
    if factor_crowded {
        0
    } else if provenance.factor_alignment.is_some() {
        scale(ceiling, 0.5)
    } else {
        scale(ceiling, 0.8)
    }
}

fn scale(ceiling: u8, fraction: f64) -> u8 {
    ((ceiling as f64) * fraction.clamp(0.0, 1.0)).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::DraftEvidence;
    use research_models::{Hypothesis, ProvenanceConfidence};

    fn academic_momentum_draft() -> StrategyDraft {
        StrategyDraft {
            name: "12-1 Momentum".into(),
            reference: "Jegadeesh & Titman replication".into(),
            url: None,
            excerpt: "Buy trailing 12-1 month winners, monthly rebalance.".into(),
            credibility: Some(research_models::SourceCredibility {
                source_type: research_models::SourceType::Academic,
                author_track_record: AuthorTrackRecord::Academic,
                author_skin_in_game: false,
                author_conflicts: None,
                claimed: None,
            }),
            hypothesis: Hypothesis {
                summary: "Cross-sectional momentum".into(),
                detail: "Winners keep winning over 3-12 month horizons.".into(),
            },
            rationale: Some(
                "Underreaction to firm-specific news and the disposition effect cause \
                 prices to adjust slowly; institutional flows then amplify the drift. \
                 Documented across decades and most developed markets."
                    .into(),
            ),
            definition: None,
            evidence: DraftEvidence {
                backtest_period: Some("1927-2012".into()),
                out_of_sample: true,
                oos_periods: 5,
                transaction_costs_discussed: true,
                drawdown_discussed: true,
                capacity_discussed: true,
                markets: vec!["us".into(), "europe".into(), "japan".into()],
                regimes_covered: vec!["bull".into(), "bear".into()],
                sample_size: Some(1000),
                code_provided: false,
                ..Default::default()
            },
            raw_text: String::new(),
        }
    }

    #[test]
    fn test_academic_momentum_trust_is_high() {
        let draft = academic_momentum_draft();
        let provenance = EdgeProvenance {
            source: ProvenanceSource::SourceStated,
            confidence: ProvenanceConfidence::High,
            factor_alignment: Some("momentum".into()),
            research_notes: None,
        };
        let trust = score_trust(&draft, &provenance, true, 0, &ScoringWeights::default());
        // rationale 30 + oos 25 + realism 20 + credibility 12 + novelty 0
        assert!(trust.base_total() >= 80, "got {}", trust.base_total());
        assert_eq!(trust.total(), trust.base_total());
    }

    #[test]
    fn test_unknown_rationale_scores_zero_rationale() {
        let mut draft = academic_momentum_draft();
        draft.rationale = None;
        let provenance = EdgeProvenance {
            source: ProvenanceSource::Unknown,
            confidence: ProvenanceConfidence::Low,
            factor_alignment: None,
            research_notes: None,
        };
        let trust = score_trust(&draft, &provenance, false, 0, &ScoringWeights::default());
        assert_eq!(trust.economic_rationale, 0);
    }

    #[test]
    fn test_specificity_counts_presence_bits() {
        let draft = academic_momentum_draft();
        let spec = score_specificity(&draft);
        // No definition: entry/exit/sizing/universe bits are false.
        // Period + OOS + costs are present.
        assert_eq!(spec.score(), 3);
    }

    #[test]
    fn test_red_flags_penalize_recorded_trust_only() {
        let draft = academic_momentum_draft();
        let provenance = EdgeProvenance {
            source: ProvenanceSource::SourceStated,
            confidence: ProvenanceConfidence::High,
            factor_alignment: None,
            research_notes: None,
        };
        let trust = score_trust(&draft, &provenance, false, 3, &ScoringWeights::default());
        assert_eq!(trust.total(), trust.base_total().saturating_sub(45));
        assert!(trust.passes(50));
    }
}
