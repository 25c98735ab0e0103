//! Transform synthesis output into learnings, proposals, and ideas.

use chrono::Utc;

use research_models::{
    IdeaId, IdeaRecord, IdeaStatus, Insight, InsightDimension, LearningRecord, ProposalId,
    ProposalKind, ProposalRecord, ProposalStatus, StrategyDocument, ValidationRecord,
};
use research_store::{RecordStore, StoreError};

use crate::orchestrator::AnalysisResult;
use crate::persona::PersonaStatus;

/// What one analysis run wrote.
#[derive(Debug, Default)]
pub struct AppliedOutputs {
    pub learnings: usize,
    pub proposals: Vec<ProposalId>,
    pub ideas: Vec<IdeaId>,
}

fn proposal_kind(kind: &str) -> Option<ProposalKind> {
    match kind {
        "combination" => Some(ProposalKind::Combination),
        "enhancement" => Some(ProposalKind::Enhancement),
        "data_acquisition" => Some(ProposalKind::DataAcquisition),
        "refined_hypothesis" => Some(ProposalKind::RefinedHypothesis),
        _ => None,
    }
}

/// Persist one analysis run: a learning record from the panel, proposals
/// for actionable follow-ups, and idea records for idea-kind actions.
pub fn apply_synthesis(
    store: &RecordStore,
    doc: &StrategyDocument,
    validation: &ValidationRecord,
    analysis: &AnalysisResult,
) -> Result<AppliedOutputs, StoreError> {
    let mut applied = AppliedOutputs::default();

    // ---- Learning record ---------------------------------------------------
    let mut insights = Vec::new();
    for line in &analysis.synthesis.consensus {
        insights.push(Insight {
            dimension: InsightDimension::EdgeMechanism,
            statement: line.clone(),
            attributed_to: Some("synthesizer".into()),
        });
    }
    for response in &analysis.responses {
        if response.status != PersonaStatus::Ok {
            continue;
        }
        let Some(report) = &response.report else {
            continue;
        };
        for concern in report.concerns() {
            insights.push(Insight {
                dimension: InsightDimension::RiskProfile,
                statement: concern.clone(),
                attributed_to: Some(response.persona.to_string()),
            });
        }
    }
    let factors = doc
        .edge_provenance
        .as_ref()
        .and_then(|p| p.factor_alignment.clone())
        .into_iter()
        .collect();
    store.append_learning(&LearningRecord {
        strategy_id: doc.id.clone(),
        validation_refs: vec![validation.key.definition_hash.to_string()],
        created: Utc::now(),
        factors,
        insights,
    })?;
    applied.learnings = 1;

    // ---- Proposals and ideas ----------------------------------------------
    let counters = store.workspace().counters();
    for action in &analysis.synthesis.actions {
        if action.kind == "idea" {
            let seq = counters.allocate(IdeaId::PREFIX)?;
            let idea = IdeaRecord {
                id: IdeaId::from_seq(seq),
                status: IdeaStatus::Pending,
                created: Utc::now(),
                name: action.title.clone(),
                thesis: action.rationale.clone(),
                hypothesis: action
                    .expected_benefit
                    .clone()
                    .unwrap_or_else(|| action.rationale.clone()),
                entry_logic: String::new(),
                exit_logic: String::new(),
                risk_management: String::new(),
                data_requirements: vec![],
                parents: vec![doc.id.clone()],
                generated_by: "synthesizer".into(),
                confidence: "medium".into(),
            };
            store.save_idea(&idea)?;
            applied.ideas.push(idea.id);
        } else if let Some(kind) = proposal_kind(&action.kind) {
            let seq = counters.allocate(ProposalId::PREFIX)?;
            let proposal = ProposalRecord {
                id: ProposalId::from_seq(seq),
                kind,
                status: ProposalStatus::Pending,
                created: Utc::now(),
                title: action.title.clone(),
                rationale: action.rationale.clone(),
                source_strategies: vec![doc.id.clone()],
                proposed_by: "synthesizer".into(),
                expected_benefit: action.expected_benefit.clone(),
                reviewed_at: None,
                review_note: None,
            };
            store.save_proposal(&proposal)?;
            applied.proposals.push(proposal.id);
        } else {
            tracing::warn!(kind = %action.kind, "unrecognized synthesis action kind; dropped");
        }
    }

    tracing::info!(
        id = %doc.id,
        proposals = applied.proposals.len(),
        ideas = applied.ideas.len(),
        "synthesis outputs persisted"
    );
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::AnalysisResult;
    use crate::persona::{
        Confidence, PersonaReport, PersonaResponse, PersonaStatus, RiskRead, SynthesisAction,
        SynthesisOutput, SynthesisStatus,
    };
    use chrono::Utc;
    use research_models::Persona;
    use research_models::{
        Archetype, ContentHash, Entry, EntryKind, Exit, ExitKind, ExitPath, Hypothesis, Position,
        PositionManagement, SizingMethod, StrategyDefinition, StrategyId, StrategyLogic,
        StrategySource, StrategyState, Tier, Universe, ValidationGates, ValidationKey, Verdict,
    };
    use research_store::Workspace;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn doc() -> StrategyDocument {
        let definition = StrategyDefinition {
            tier: Tier::Templated,
            logic: StrategyLogic::Template {
                archetype: Archetype::Breakout,
            },
            universe: Universe {
                symbols: vec!["SPY".into()],
                base: None,
                criteria: vec![],
                point_in_time: true,
            },
            entry: Entry {
                kind: EntryKind::Technical,
                condition: "55-day breakout".into(),
                indicators: vec![],
                filters: vec![],
            },
            position: Position {
                sizing: SizingMethod::EqualWeight,
                sizing_params: BTreeMap::new(),
                max_leverage: 1.0,
                max_positions: None,
                max_position_pct: None,
            },
            exit: Exit {
                paths: vec![ExitPath {
                    name: "channel".into(),
                    kind: ExitKind::SignalReversal,
                    params: BTreeMap::new(),
                    condition: None,
                }],
            },
            position_management: PositionManagement::default(),
            regimes: None,
            data_requirements: vec![],
            parameters: BTreeMap::new(),
            assumptions: vec![],
            risks: vec![],
        };
        let definition_hash = definition.definition_hash();
        StrategyDocument {
            id: StrategyId::from_seq(1),
            name: "breakout".into(),
            created: Utc::now(),
            state: StrategyState::Validated,
            status_reason: None,
            source: StrategySource {
                reference: "r".into(),
                url: None,
                excerpt: "e".into(),
                content_hash: ContentHash("0".repeat(64)),
                extracted_at: Utc::now(),
                credibility: None,
            },
            lineage: None,
            hypothesis: Hypothesis {
                summary: "breakout".into(),
                detail: "d".into(),
            },
            edge: None,
            edge_provenance: None,
            quality: None,
            definition,
            definition_hash,
        }
    }

    fn validation(doc: &StrategyDocument) -> ValidationRecord {
        ValidationRecord {
            schema_version: "1".into(),
            strategy_id: doc.id.clone(),
            key: ValidationKey {
                definition_hash: doc.definition_hash.clone(),
                code_hash: ContentHash("c".repeat(64)),
                generator_version: "gen-4.2.0".into(),
            },
            started_at: Utc::now(),
            windows: vec![],
            gates: ValidationGates::default(),
            gate_checks: vec![],
            aggregate: None,
            verdict: Verdict::Validated,
            passing_regimes: vec![],
            notes: None,
        }
    }

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            responses: vec![PersonaResponse {
                persona: Persona::RiskManager,
                status: PersonaStatus::Ok,
                report: Some(PersonaReport::RiskManager(RiskRead {
                    assessment: "drawdowns acceptable".into(),
                    failure_modes: vec!["channel whipsaw".into()],
                    concerns: vec!["gap risk at entries".into()],
                    actions: vec![],
                    confidence: Confidence::Medium,
                })),
            }],
            synthesis: SynthesisOutput {
                status: SynthesisStatus::Validated,
                consensus: vec!["channel breakouts carry through".into()],
                disagreements: vec![],
                actions: vec![
                    SynthesisAction {
                        kind: "enhancement".into(),
                        title: "volatility filter".into(),
                        rationale: "skip high-vol regimes".into(),
                        expected_benefit: Some("smaller drawdowns".into()),
                    },
                    SynthesisAction {
                        kind: "idea".into(),
                        title: "futures breakout variant".into(),
                        rationale: "same channel logic on commodity futures".into(),
                        expected_benefit: None,
                    },
                    SynthesisAction {
                        kind: "interpretive_dance".into(),
                        title: "ignored".into(),
                        rationale: "unknown kind is dropped".into(),
                        expected_benefit: None,
                    },
                ],
            },
        }
    }

    #[test]
    fn test_apply_synthesis_writes_all_record_kinds() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(Workspace::init(dir.path()).unwrap());
        let document = doc();
        store.create_strategy(&document).unwrap();
        let record = validation(&document);

        let applied = apply_synthesis(&store, &document, &record, &analysis()).unwrap();
        assert_eq!(applied.learnings, 1);
        assert_eq!(applied.proposals.len(), 1);
        assert_eq!(applied.ideas.len(), 1);

        let learnings = store.list_learnings().unwrap();
        // Consensus + one persona concern.
        assert_eq!(learnings[0].insights.len(), 2);

        let proposals = store.list_proposals().unwrap();
        assert_eq!(proposals[0].kind, ProposalKind::Enhancement);
        assert_eq!(proposals[0].status, ProposalStatus::Pending);

        let ideas = store.list_ideas().unwrap();
        assert_eq!(ideas[0].parents, vec![document.id.clone()]);
    }

    #[test]
    fn test_proposal_kind_mapping() {
        assert_eq!(proposal_kind("combination"), Some(ProposalKind::Combination));
        assert_eq!(
            proposal_kind("data_acquisition"),
            Some(ProposalKind::DataAcquisition)
        );
        assert_eq!(proposal_kind("interpretive_dance"), None);
    }
}
