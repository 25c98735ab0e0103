//! Promotion of approved ideas and proposals into strategy records.
//!
//! Approval is the only path from the idea store into the catalog. Promoted
//! records enter as pending tier-3 strategies (free-form logic, so the
//! review gate still applies before anything executes) with lineage back to
//! their parents. Lineage must stay a DAG: an approval that would introduce
//! a back edge is refused.

use std::collections::BTreeMap;

use chrono::Utc;

use research_models::{
    sha256_hex, Entry, EntryKind, Exit, ExitKind, ExitPath, Hypothesis, IdeaRecord,
    LineageRelationship, Position, PositionManagement, ProposalKind, ProposalRecord,
    SizingMethod, StrategyDefinition, StrategyDocument, StrategyId, StrategyLineage,
    StrategyLogic, StrategySource, StrategyState, Tier, Universe,
};
use research_store::{RecordStore, StoreError};

use crate::filter::IngestError;

/// Build the tier-3 definition skeleton for a promoted record. The entry
/// and exit text become the document conditions; the code body is the
/// pseudocode a reviewer fleshes out during tier-3 review.
fn custom_definition(entry_logic: &str, exit_logic: &str, risk: &str) -> StrategyDefinition {
    let code = format!(
        "# entry: {entry_logic}\n# exit: {exit_logic}\n# risk: {risk}\n\
         def OnData(self, data):\n    raise NotImplementedError(\"pending review\")\n"
    );
    StrategyDefinition {
        tier: Tier::Custom,
        logic: StrategyLogic::Custom { code },
        universe: Universe {
            symbols: vec![],
            base: Some("us_equities".into()),
            criteria: vec![],
            point_in_time: true,
        },
        entry: Entry {
            kind: EntryKind::Compound,
            condition: entry_logic.to_string(),
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
                name: "primary".into(),
                kind: ExitKind::SignalReversal,
                params: BTreeMap::new(),
                condition: Some(exit_logic.to_string()),
            }],
        },
        position_management: PositionManagement::default(),
        regimes: None,
        data_requirements: vec![],
        parameters: BTreeMap::new(),
        assumptions: vec![],
        risks: vec![risk.to_string()],
    }
}

fn create_promoted(
    store: &RecordStore,
    name: &str,
    summary: &str,
    detail: &str,
    definition: StrategyDefinition,
    parents: Vec<StrategyId>,
    relationship: LineageRelationship,
    origin: &str,
    note: &str,
) -> Result<StrategyId, IngestError> {
    // Parents must exist; resolve_lineage also rejects pre-existing cycles.
    for parent in &parents {
        store.resolve_lineage(parent)?;
    }

    let seq = store.workspace().counters().allocate(StrategyId::PREFIX)?;
    let id = StrategyId::from_seq(seq);

    if !parents.is_empty() && store.would_create_cycle(&id, &parents)? {
        return Err(IngestError::Store(StoreError::LineageCycle(id)));
    }

    let definition_hash = definition.definition_hash();
    let doc = StrategyDocument {
        id: id.clone(),
        name: name.to_string(),
        created: Utc::now(),
        state: StrategyState::Pending,
        status_reason: (!note.is_empty()).then(|| note.to_string()),
        source: StrategySource {
            reference: origin.to_string(),
            url: None,
            excerpt: summary.to_string(),
            content_hash: sha256_hex(format!("{origin}:{name}:{detail}").as_bytes()),
            extracted_at: Utc::now(),
            credibility: None,
        },
        lineage: (!parents.is_empty()).then(|| StrategyLineage {
            parents,
            relationship,
            notes: (!note.is_empty()).then(|| note.to_string()),
        }),
        hypothesis: Hypothesis {
            summary: summary.to_string(),
            detail: detail.to_string(),
        },
        edge: None,
        edge_provenance: None,
        quality: None,
        definition,
        definition_hash,
    };
    store.create_strategy(&doc)?;
    Ok(id)
}

/// Approve an idea: create the pending strategy it implies.
pub fn promote_idea(
    store: &RecordStore,
    idea: &IdeaRecord,
    note: &str,
) -> Result<StrategyId, IngestError> {
    let definition =
        custom_definition(&idea.entry_logic, &idea.exit_logic, &idea.risk_management);
    create_promoted(
        store,
        &idea.name,
        &idea.thesis,
        &idea.hypothesis,
        definition,
        idea.parents.clone(),
        LineageRelationship::Refinement,
        &format!("idea {} ({})", idea.id, idea.generated_by),
        note,
    )
}

/// Materialize an approved proposal into its implied record.
pub fn materialize_proposal(
    store: &RecordStore,
    proposal: &ProposalRecord,
    note: &str,
) -> Result<Option<StrategyId>, IngestError> {
    match proposal.kind {
        ProposalKind::Combination | ProposalKind::Enhancement | ProposalKind::RefinedHypothesis => {
            let relationship = match proposal.kind {
                ProposalKind::Combination => LineageRelationship::Combination,
                ProposalKind::Enhancement => LineageRelationship::Variant,
                _ => LineageRelationship::Refinement,
            };
            let definition = custom_definition(
                &proposal.rationale,
                "per proposal rationale",
                proposal.expected_benefit.as_deref().unwrap_or("unspecified"),
            );
            let id = create_promoted(
                store,
                &proposal.title,
                &proposal.title,
                &proposal.rationale,
                definition,
                proposal.source_strategies.clone(),
                relationship,
                &format!("proposal {}", proposal.id),
                note,
            )?;
            Ok(Some(id))
        }
        ProposalKind::DataAcquisition => {
            // Data entries go to the acquisition queue, not the catalog.
            let path = store.workspace().root().join("data-requests.yaml");
            let mut requests: Vec<String> = if path.exists() {
                research_store::read_yaml(&path)?
            } else {
                Vec::new()
            };
            requests.push(format!("{}: {}", proposal.id, proposal.title));
            research_store::write_yaml_atomic(&path, &requests)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use research_models::{IdeaId, IdeaStatus, ProposalId, ProposalStatus};
    use research_store::Workspace;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempdir().unwrap();
        let ws = Workspace::init(dir.path()).unwrap();
        (dir, RecordStore::new(ws))
    }

    fn idea(parents: Vec<StrategyId>) -> IdeaRecord {
        IdeaRecord {
            id: IdeaId::from_seq(1),
            status: IdeaStatus::Pending,
            created: Utc::now(),
            name: "vol-filtered momentum".into(),
            thesis: "momentum decays in high vol".into(),
            hypothesis: "filtering improves Sharpe".into(),
            entry_logic: "12-1 momentum, vix < 25".into(),
            exit_logic: "monthly rotation".into(),
            risk_management: "no leverage".into(),
            data_requirements: vec![],
            parents,
            generated_by: "quant-researcher".into(),
            confidence: "medium".into(),
        }
    }

    #[test]
    fn test_idea_promotes_to_pending_tier3() {
        let (_dir, store) = store();
        let id = promote_idea(&store, &idea(vec![]), "looks testable").unwrap();
        let doc = store.get_strategy(&id).unwrap();
        assert_eq!(doc.state, StrategyState::Pending);
        assert_eq!(doc.definition.tier, Tier::Custom);
        assert!(doc.definition.tier_consistent());
    }

    #[test]
    fn test_missing_parent_refused() {
        let (_dir, store) = store();
        let orphan = idea(vec![StrategyId::from_seq(99)]);
        assert!(promote_idea(&store, &orphan, "").is_err());
    }

    #[test]
    fn test_data_acquisition_appends_request() {
        let (dir, store) = store();
        let proposal = ProposalRecord {
            id: ProposalId::from_seq(1),
            kind: ProposalKind::DataAcquisition,
            status: ProposalStatus::Pending,
            created: Utc::now(),
            title: "options chain history".into(),
            rationale: "needed for tier-2 vol strategies".into(),
            source_strategies: vec![],
            proposed_by: "synthesizer".into(),
            expected_benefit: None,
            reviewed_at: None,
            review_note: None,
        };
        let created = materialize_proposal(&store, &proposal, "").unwrap();
        assert!(created.is_none());
        let requests: Vec<String> =
            research_store::read_yaml(&dir.path().join("data-requests.yaml")).unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("PROP-001"));
    }
}
