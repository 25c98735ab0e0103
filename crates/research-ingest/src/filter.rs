//! The ingestion filter engine.
//!
//! For each draft: idempotence check, rationale inference, scoring, red-flag
//! detection, decision, then similarity routing for accepted strategies.
//! Every outcome leaves an audit trail: accepted drafts become PENDING
//! records, rejected and archived drafts land in the archive partition with
//! their scores and flags attached.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use research_models::{
    EdgeProvenance, IngestionDecision, IngestionQuality, LineageRelationship, StrategyDocument,
    StrategyId, StrategyLineage, StrategySource, StrategyState,
};
use research_store::{MatchKind, RecordStore, SimilarityIndex, SimilarityMatch, StoreError};

use crate::draft::StrategyDraft;
use crate::rationale::infer_rationale;
use crate::red_flags::detect_red_flags;
use crate::scoring::{score_specificity, score_trust};

/// Ingestion failures.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result of ingesting one draft.
#[derive(Debug)]
pub struct IngestOutcome {
    pub decision: IngestionDecision,
    /// Created record id; absent for queued drafts and definition-less
    /// archive entries.
    pub strategy_id: Option<StrategyId>,
    pub quality: IngestionQuality,
    pub provenance: EdgeProvenance,
    pub similarity: Option<SimilarityMatch>,
    /// Set when the draft duplicates an existing catalog entry.
    pub duplicate_of: Option<StrategyId>,
    /// True when the source hash was already ingested (no-op).
    pub already_ingested: bool,
}

/// Archive entry for drafts that never became strategies.
#[derive(Debug, Serialize, Deserialize)]
struct ArchivedDraft {
    archived_at: chrono::DateTime<Utc>,
    quality: IngestionQuality,
    provenance: EdgeProvenance,
    draft: StrategyDraft,
}

pub struct IngestionFilter<'a> {
    store: &'a RecordStore,
}

impl<'a> IngestionFilter<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Ingest one draft. Re-ingesting the same source content is a no-op
    /// that reports the existing record.
    pub fn ingest(&self, draft: &StrategyDraft) -> Result<IngestOutcome, IngestError> {
        let source_hash = draft.source_hash();

        // Idempotence: same source content, one record, no side effects.
        if let Some(existing) = self.store.find_by_source_hash(&source_hash)? {
            tracing::info!(id = %existing.id, "source already ingested; skipping");
            let quality = existing.quality.clone().unwrap_or_else(|| IngestionQuality {
                specificity: Default::default(),
                trust: Default::default(),
                red_flags: vec![],
                decision: IngestionDecision::Accept,
                decision_reason: None,
                warnings: vec![],
            });
            let provenance = existing.edge_provenance.clone().unwrap_or(EdgeProvenance {
                source: research_models::ProvenanceSource::Unknown,
                confidence: research_models::ProvenanceConfidence::Low,
                factor_alignment: None,
                research_notes: None,
            });
            return Ok(IngestOutcome {
                decision: quality.decision,
                strategy_id: Some(existing.id),
                quality,
                provenance,
                similarity: None,
                duplicate_of: None,
                already_ingested: true,
            });
        }

        let config = self.store.workspace().config().clone();

        // Rationale inference runs before scoring; it never gates.
        let (provenance, factor) = infer_rationale(draft);

        let red_flags = detect_red_flags(draft, factor.as_ref());
        let specificity = score_specificity(draft);
        let trust = score_trust(
            draft,
            &provenance,
            factor.as_ref().map(|f| f.crowded).unwrap_or(false),
            red_flags.len() as u8,
            &config.scoring,
        );

        let mut quality = IngestionQuality {
            specificity,
            trust,
            red_flags,
            decision: IngestionDecision::Queue,
            decision_reason: None,
            warnings: vec![],
        };
        quality.decide(
            config.ingestion.specificity_threshold,
            config.ingestion.trust_threshold,
        );

        match quality.decision {
            IngestionDecision::Reject => {
                self.archive_outcome(draft, &quality, &provenance, StrategyState::Rejected)
            }
            IngestionDecision::Archive => {
                self.archive_outcome(draft, &quality, &provenance, StrategyState::Archived)
            }
            IngestionDecision::Accept | IngestionDecision::Queue => {
                let Some(definition) = &draft.definition else {
                    // Scored as testable but carries no structured
                    // definition: hold for manual triage.
                    quality.decision = IngestionDecision::Queue;
                    quality.decision_reason =
                        Some("accepted on scores but draft has no structured definition".into());
                    return Ok(IngestOutcome {
                        decision: IngestionDecision::Queue,
                        strategy_id: None,
                        quality,
                        provenance,
                        similarity: None,
                        duplicate_of: None,
                        already_ingested: false,
                    });
                };

                // Similarity routing against the committed catalog.
                let catalog = self.store.all_strategies()?;
                let index = SimilarityIndex::build(
                    config.similarity.clone(),
                    catalog.iter().map(|d| (&d.id, &d.definition)),
                );
                let similarity = index.lookup(definition);

                if similarity.kind == MatchKind::Duplicate {
                    let matched = similarity.matched.clone();
                    quality.decision = IngestionDecision::Reject;
                    quality.decision_reason = Some(format!(
                        "duplicate of {} (similarity {:.3})",
                        matched
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_default(),
                        similarity.score
                    ));
                    self.write_archived_draft(draft, &quality, &provenance)?;
                    return Ok(IngestOutcome {
                        decision: IngestionDecision::Reject,
                        strategy_id: None,
                        quality,
                        provenance,
                        duplicate_of: matched,
                        similarity: Some(similarity),
                        already_ingested: false,
                    });
                }

                let lineage = if similarity.kind == MatchKind::Variant {
                    similarity.matched.clone().map(|parent| StrategyLineage {
                        parents: vec![parent],
                        relationship: LineageRelationship::Variant,
                        notes: Some(format!("similarity {:.3}", similarity.score)),
                    })
                } else {
                    None
                };

                let seq = self.store.workspace().counters().allocate(StrategyId::PREFIX)?;
                let id = StrategyId::from_seq(seq);
                let definition = definition.clone();
                let definition_hash = definition.definition_hash();

                let doc = StrategyDocument {
                    id: id.clone(),
                    name: draft.name.clone(),
                    created: Utc::now(),
                    state: StrategyState::Pending,
                    status_reason: None,
                    source: StrategySource {
                        reference: draft.reference.clone(),
                        url: draft.url.clone(),
                        excerpt: draft.excerpt.clone(),
                        content_hash: source_hash,
                        extracted_at: Utc::now(),
                        credibility: draft.credibility.clone(),
                    },
                    lineage,
                    hypothesis: draft.hypothesis.clone(),
                    edge: None,
                    edge_provenance: Some(provenance.clone()),
                    quality: Some(quality.clone()),
                    definition,
                    definition_hash,
                };
                self.store.create_strategy(&doc)?;
                tracing::info!(
                    id = %id,
                    trust = quality.trust.total(),
                    specificity = quality.specificity.score(),
                    "draft accepted"
                );

                Ok(IngestOutcome {
                    decision: IngestionDecision::Accept,
                    strategy_id: Some(id),
                    quality,
                    provenance,
                    similarity: Some(similarity),
                    duplicate_of: None,
                    already_ingested: false,
                })
            }
        }
    }

    /// Reject/archive path: a structured draft becomes a terminal record in
    /// the archive partition; a loose draft is archived as-is.
    fn archive_outcome(
        &self,
        draft: &StrategyDraft,
        quality: &IngestionQuality,
        provenance: &EdgeProvenance,
        state: StrategyState,
    ) -> Result<IngestOutcome, IngestError> {
        let strategy_id = if let Some(definition) = &draft.definition {
            let seq = self.store.workspace().counters().allocate(StrategyId::PREFIX)?;
            let id = StrategyId::from_seq(seq);
            let definition = definition.clone();
            let definition_hash = definition.definition_hash();
            let doc = StrategyDocument {
                id: id.clone(),
                name: draft.name.clone(),
                created: Utc::now(),
                state,
                status_reason: quality.decision_reason.clone(),
                source: StrategySource {
                    reference: draft.reference.clone(),
                    url: draft.url.clone(),
                    excerpt: draft.excerpt.clone(),
                    content_hash: draft.source_hash(),
                    extracted_at: Utc::now(),
                    credibility: draft.credibility.clone(),
                },
                lineage: None,
                hypothesis: draft.hypothesis.clone(),
                edge: None,
                edge_provenance: Some(provenance.clone()),
                quality: Some(quality.clone()),
                definition,
                definition_hash,
            };
            self.store.create_strategy(&doc)?;
            Some(id)
        } else {
            self.write_archived_draft(draft, quality, provenance)?;
            None
        };

        tracing::info!(
            decision = ?quality.decision,
            reason = quality.decision_reason.as_deref().unwrap_or(""),
            "draft filtered out"
        );

        Ok(IngestOutcome {
            decision: quality.decision,
            strategy_id,
            quality: quality.clone(),
            provenance: provenance.clone(),
            similarity: None,
            duplicate_of: None,
            already_ingested: false,
        })
    }

    fn write_archived_draft(
        &self,
        draft: &StrategyDraft,
        quality: &IngestionQuality,
        provenance: &EdgeProvenance,
    ) -> Result<(), IngestError> {
        let entry = ArchivedDraft {
            archived_at: Utc::now(),
            quality: quality.clone(),
            provenance: provenance.clone(),
            draft: draft.clone(),
        };
        let path = self
            .store
            .workspace()
            .strategies_dir()
            .join("archive")
            .join(format!("draft-{}.yaml", draft.source_hash().short()));
        research_store::write_yaml_atomic(&path, &entry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::DraftEvidence;
    use research_models::{
        Archetype, AuthorTrackRecord, ClaimedPerformance, Entry, EntryKind, Exit, ExitKind,
        ExitPath, Hypothesis, Position, PositionManagement, SizingMethod, SourceCredibility,
        SourceType, StrategyDefinition, StrategyLogic, Tier, Universe,
    };
    use research_store::Workspace;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn momentum_definition() -> StrategyDefinition {
        StrategyDefinition {
            tier: Tier::Templated,
            logic: StrategyLogic::Template {
                archetype: Archetype::MomentumRotation,
            },
            universe: Universe {
                symbols: vec!["SPY".into(), "EFA".into(), "AGG".into()],
                base: None,
                criteria: vec![],
                point_in_time: true,
            },
            entry: Entry {
                kind: EntryKind::Technical,
                condition: "rank by 12-1 month momentum, hold top 1".into(),
                indicators: vec![],
                filters: vec![],
            },
            position: Position {
                sizing: SizingMethod::EqualWeight,
                sizing_params: BTreeMap::new(),
                max_leverage: 1.0,
                max_positions: Some(1),
                max_position_pct: None,
            },
            exit: Exit {
                paths: vec![ExitPath {
                    name: "rotate".into(),
                    kind: ExitKind::SignalReversal,
                    params: BTreeMap::new(),
                    condition: None,
                }],
            },
            position_management: PositionManagement::default(),
            regimes: None,
            data_requirements: vec![],
            parameters: [("lookback_days".to_string(), 252.0)].into_iter().collect(),
            assumptions: vec![],
            risks: vec![],
        }
    }

    fn academic_momentum_draft() -> StrategyDraft {
        StrategyDraft {
            name: "12-1 Momentum".into(),
            reference: "academic replication".into(),
            url: None,
            excerpt: "Buy trailing 12-1 month momentum winners monthly.".into(),
            credibility: Some(SourceCredibility {
                source_type: SourceType::Academic,
                author_track_record: AuthorTrackRecord::Academic,
                author_skin_in_game: false,
                author_conflicts: None,
                claimed: None,
            }),
            hypothesis: Hypothesis {
                summary: "Momentum".into(),
                detail: "Winners keep winning.".into(),
            },
            rationale: Some(
                "Underreaction to firm-specific news causes drift; the effect has \
                 replicated out of sample across decades and markets with costs \
                 and capacity documented in the literature."
                    .into(),
            ),
            definition: Some(momentum_definition()),
            evidence: DraftEvidence {
                backtest_period: Some("1927-2012".into()),
                out_of_sample: true,
                oos_periods: 5,
                transaction_costs_discussed: true,
                drawdown_discussed: true,
                capacity_discussed: true,
                markets: vec!["us".into(), "europe".into()],
                regimes_covered: vec!["bull".into(), "bear".into()],
                sample_size: Some(1000),
                code_provided: true,
                ..Default::default()
            },
            raw_text: "momentum replication study".into(),
        }
    }

    fn store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempdir().unwrap();
        let ws = Workspace::init(dir.path()).unwrap();
        (dir, RecordStore::new(ws))
    }

    #[test]
    fn test_accept_academic_momentum() {
        let (_dir, store) = store();
        let filter = IngestionFilter::new(&store);
        let outcome = filter.ingest(&academic_momentum_draft()).unwrap();

        assert_eq!(outcome.decision, IngestionDecision::Accept);
        // Definition present, full evidence: 8/8 presence bits.
        assert_eq!(outcome.quality.specificity.score(), 8);
        assert!(outcome.quality.trust.base_total() >= 80);
        assert!(outcome.quality.hard_flags().next().is_none());

        let id = outcome.strategy_id.unwrap();
        let doc = store.get_strategy(&id).unwrap();
        assert_eq!(doc.state, StrategyState::Pending);
    }

    #[test]
    fn test_ingestion_is_idempotent() {
        let (_dir, store) = store();
        let filter = IngestionFilter::new(&store);
        let draft = academic_momentum_draft();
        let first = filter.ingest(&draft).unwrap();
        let second = filter.ingest(&draft).unwrap();
        assert!(!first.already_ingested);
        assert!(second.already_ingested);
        assert_eq!(first.strategy_id, second.strategy_id);
        assert_eq!(store.all_strategies().unwrap().len(), 1);
    }

    #[test]
    fn test_hard_reject_course_seller() {
        let (_dir, store) = store();
        let filter = IngestionFilter::new(&store);
        let mut draft = academic_momentum_draft();
        draft.raw_text = "This AI system never had a losing month. Join my course!".into();
        draft.credibility = Some(SourceCredibility {
            source_type: SourceType::Blog,
            author_track_record: AuthorTrackRecord::RetailUnverified,
            author_skin_in_game: false,
            author_conflicts: Some("sells a course and signal service".into()),
            claimed: Some(ClaimedPerformance {
                sharpe: Some(4.2),
                ..Default::default()
            }),
        });

        let outcome = filter.ingest(&draft).unwrap();
        assert_eq!(outcome.decision, IngestionDecision::Reject);
        let hard: Vec<&str> = outcome.quality.hard_flags().map(|f| f.flag.as_str()).collect();
        assert!(hard.contains(&"sharpe_above_3"));
        assert!(hard.contains(&"no_losing_periods"));
        assert!(hard.contains(&"author_selling"));

        // Rejected strategies land in the archive partition for audit.
        let id = outcome.strategy_id.unwrap();
        let doc = store.get_strategy(&id).unwrap();
        assert_eq!(doc.state, StrategyState::Rejected);
    }

    #[test]
    fn test_vague_draft_archives_without_record() {
        let (dir, store) = store();
        let filter = IngestionFilter::new(&store);
        let draft = StrategyDraft {
            name: "Buy Quality".into(),
            reference: "long-form essay".into(),
            url: None,
            excerpt: "Own high quality businesses for the long run.".into(),
            credibility: None,
            hypothesis: Hypothesis {
                summary: "Quality wins".into(),
                detail: "Good companies outperform.".into(),
            },
            rationale: None,
            definition: None,
            evidence: DraftEvidence {
                backtest_period: Some("2000-2020".into()),
                out_of_sample: true,
                ..Default::default()
            },
            raw_text: "prose about quality investing".into(),
        };

        let outcome = filter.ingest(&draft).unwrap();
        assert_eq!(outcome.decision, IngestionDecision::Archive);
        assert_eq!(outcome.quality.specificity.score(), 2);
        assert!(outcome.strategy_id.is_none());
        assert!(outcome
            .quality
            .decision_reason
            .as_deref()
            .unwrap()
            .contains("too vague"));
        // Draft archived for audit.
        let archive: Vec<_> = std::fs::read_dir(dir.path().join("strategies/archive"))
            .unwrap()
            .collect();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn test_duplicate_blocks_with_pointer() {
        let (_dir, store) = store();
        let filter = IngestionFilter::new(&store);
        let first = filter.ingest(&academic_momentum_draft()).unwrap();
        let original_id = first.strategy_id.unwrap();

        // Same definition from a different source document.
        let mut dup = academic_momentum_draft();
        dup.raw_text = "a different blog quoting the same rules".into();
        dup.reference = "another reference".into();

        let outcome = filter.ingest(&dup).unwrap();
        assert_eq!(outcome.decision, IngestionDecision::Reject);
        assert_eq!(outcome.duplicate_of, Some(original_id));
        assert!(outcome.strategy_id.is_none());
    }

    #[test]
    fn test_variant_attaches_lineage() {
        let (_dir, store) = store();
        let filter = IngestionFilter::new(&store);
        let first = filter.ingest(&academic_momentum_draft()).unwrap();
        let parent_id = first.strategy_id.unwrap();

        let mut variant = academic_momentum_draft();
        variant.raw_text = "variant source".into();
        let def = variant.definition.as_mut().unwrap();
        def.parameters.insert("lookback_days".into(), 126.0);
        def.entry.condition = "rank by 6-1 month momentum, hold top 1".into();

        let outcome = filter.ingest(&variant).unwrap();
        assert_eq!(outcome.decision, IngestionDecision::Accept);
        let id = outcome.strategy_id.unwrap();
        let doc = store.get_strategy(&id).unwrap();
        let lineage = doc.lineage.unwrap();
        assert_eq!(lineage.parents, vec![parent_id]);
    }
}
