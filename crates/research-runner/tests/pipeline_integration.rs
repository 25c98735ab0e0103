//! End-to-end pipeline scenarios: ingest through verdict on the bundled
//! sim backend, plus the one-shot and review gates.

use std::collections::BTreeMap;
use std::sync::Arc;

use research_backtest::SeriesReferenceData;
use research_codegen::{generate, GENERATOR_VERSION};
use research_gates::DataRegistry;
use research_ingest::{DraftEvidence, IngestionFilter, StrategyDraft};
use research_models::{
    Archetype, AuthorTrackRecord, DataRequirement, DataTier, Entry, EntryKind, Exit, ExitKind,
    ExitPath, Hypothesis, IngestionDecision, Position, PositionManagement, SizingMethod,
    SourceCredibility, SourceType, StrategyDefinition, StrategyId, StrategyLogic, StrategyState,
    Tier, Universe,
};
use research_runner::pipeline::{run_generate, run_validate, run_verify, StageOutcome};
use research_runner::sim::{sim_reference_data, SimBackend};
use research_store::{RecordStore, Workspace};

const ANCHOR_YEAR: i32 = 2024;

fn workspace() -> (tempfile::TempDir, RecordStore) {
    let dir = tempfile::tempdir().unwrap();
    let ws = Workspace::init(dir.path()).unwrap();
    (dir, RecordStore::new(ws))
}

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
        data_requirements: vec![DataRequirement {
            id: "us-equity-daily".into(),
            tier: DataTier::Native,
            fields: vec!["close".into()],
        }],
        parameters: [
            ("lookback_days".to_string(), 252.0),
            ("skip_days".to_string(), 21.0),
        ]
        .into_iter()
        .collect(),
        assumptions: vec!["monthly rebalance".into()],
        risks: vec!["momentum crash".into()],
    }
}

fn academic_momentum_draft() -> StrategyDraft {
    StrategyDraft {
        name: "12-1 Cross-Sectional Momentum".into(),
        reference: "academic replication".into(),
        url: None,
        excerpt: "Buy trailing 12-1 month winners, rebalance monthly.".into(),
        credibility: Some(SourceCredibility {
            source_type: SourceType::Academic,
            author_track_record: AuthorTrackRecord::Academic,
            author_skin_in_game: false,
            author_conflicts: None,
            claimed: None,
        }),
        hypothesis: Hypothesis {
            summary: "Momentum persists over 3-12 month horizons".into(),
            detail: "Winners keep winning.".into(),
        },
        rationale: Some(
            "Underreaction to firm-specific news and institutional flow momentum drive \
             the drift; replicated out of sample across decades and most developed \
             markets with cost and capacity analysis."
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
            markets: vec!["us".into(), "europe".into(), "japan".into()],
            regimes_covered: vec!["bull".into(), "bear".into()],
            sample_size: Some(1000),
            code_provided: true,
            ..Default::default()
        },
        raw_text: "momentum replication study full text".into(),
    }
}

fn ingest_momentum(store: &RecordStore) -> StrategyId {
    let filter = IngestionFilter::new(store);
    let outcome = filter.ingest(&academic_momentum_draft()).unwrap();
    assert_eq!(outcome.decision, IngestionDecision::Accept);
    outcome.strategy_id.unwrap()
}

async fn drive_to_verdict(store: &RecordStore, id: &StrategyId, force: bool) -> StageOutcome {
    let registry = DataRegistry::builtin();
    let verify = run_verify(store, &registry, id, ANCHOR_YEAR).unwrap();
    assert!(matches!(verify, StageOutcome::Ok(_)), "{verify:?}");
    let generated = run_generate(store, &registry, id).unwrap();
    assert!(matches!(generated, StageOutcome::Ok(_)), "{generated:?}");
    run_validate(
        store,
        Arc::new(SimBackend),
        Arc::new(sim_reference_data(ANCHOR_YEAR)),
        id,
        ANCHOR_YEAR,
        42,
        force,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_full_pipeline_reaches_a_verdict() {
    let (_dir, store) = workspace();
    let id = ingest_momentum(&store);

    let outcome = drive_to_verdict(&store, &id, false).await;
    let doc = store.get_strategy(&id).unwrap();
    // The sim backend decides which verdict; the pipeline must land on a
    // terminal verdict state that matches the recorded outcome.
    match outcome {
        StageOutcome::Ok(_) => assert!(matches!(
            doc.state,
            StrategyState::Validated | StrategyState::Conditional
        )),
        StageOutcome::Invalidated(_) => assert_eq!(doc.state, StrategyState::Invalidated),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let validations = store.list_validations(&id).unwrap();
    assert_eq!(validations.len(), 1);
    let record = &validations[0];
    assert_eq!(record.windows.len(), 12);
    assert_eq!(record.key.generator_version, GENERATOR_VERSION);
    let aggregate = record.aggregate.as_ref().unwrap();
    assert_eq!(aggregate.bootstrap_seed, 42);
    assert!(aggregate.bootstrap_resamples >= 1000);
    // Regime tags recomputable: every completed window got labels from the
    // sim reference series.
    assert!(record
        .windows
        .iter()
        .all(|w| w.regimes.is_some() || w.metrics.is_none()));
}

#[tokio::test]
async fn test_oos_one_shot_refused_then_forced() {
    let (_dir, store) = workspace();
    let id = ingest_momentum(&store);
    drive_to_verdict(&store, &id, false).await;

    // Second run against the same definition is refused.
    let doc = store.get_strategy(&id).unwrap();
    assert!(doc.state.is_terminal());
    let refused = run_validate(
        &store,
        Arc::new(SimBackend),
        Arc::new(sim_reference_data(ANCHOR_YEAR)),
        &id,
        ANCHOR_YEAR,
        43,
        false,
    )
    .await
    .unwrap();
    // Terminal records refuse the stage before the one-shot check matters.
    assert!(matches!(refused, StageOutcome::Error(_)));
    assert_eq!(store.list_validations(&id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_changed_definition_is_a_new_strategy_with_new_hash() {
    let (_dir, store) = workspace();
    let id = ingest_momentum(&store);
    let doc = store.get_strategy(&id).unwrap();

    let filter = IngestionFilter::new(&store);
    let mut variant_draft = academic_momentum_draft();
    variant_draft.raw_text = "six month variant writeup".into();
    let def = variant_draft.definition.as_mut().unwrap();
    def.parameters.insert("lookback_days".into(), 126.0);
    def.entry.condition = "rank by 6-1 month momentum, hold top 1".into();

    let outcome = filter.ingest(&variant_draft).unwrap();
    assert_eq!(outcome.decision, IngestionDecision::Accept);
    let variant_id = outcome.strategy_id.unwrap();
    let variant = store.get_strategy(&variant_id).unwrap();

    assert_ne!(variant.definition_hash, doc.definition_hash);
    // Variant carries lineage to the original, and ids are monotone.
    assert_eq!(
        variant.lineage.as_ref().unwrap().parents,
        vec![id.clone()]
    );
    assert!(variant_id.seq() > id.seq());
}

#[tokio::test]
async fn test_verification_blocks_look_ahead() {
    let (_dir, store) = workspace();
    let filter = IngestionFilter::new(&store);
    let mut draft = academic_momentum_draft();
    draft.raw_text = "look ahead variant".into();
    draft.definition.as_mut().unwrap().entry.condition =
        "buy when tomorrow's open gaps above today's close".into();

    let id = filter.ingest(&draft).unwrap().strategy_id.unwrap();
    let outcome = run_verify(&store, &DataRegistry::builtin(), &id, ANCHOR_YEAR).unwrap();
    assert!(matches!(outcome, StageOutcome::Blocked(_)));
    assert_eq!(outcome.exit_code(), 2);
    let doc = store.get_strategy(&id).unwrap();
    assert_eq!(doc.state, StrategyState::Blocked);
    assert!(doc.status_reason.unwrap().contains("look_ahead_bias"));
}

#[tokio::test]
async fn test_tier3_requires_review_before_execution() {
    let (_dir, store) = workspace();
    let filter = IngestionFilter::new(&store);
    let mut draft = academic_momentum_draft();
    draft.raw_text = "custom tier writeup".into();
    {
        let def = draft.definition.as_mut().unwrap();
        def.tier = Tier::Custom;
        def.logic = StrategyLogic::Custom {
            code: "def OnData(self, data):\n    pass".into(),
        };
    }
    let id = filter.ingest(&draft).unwrap().strategy_id.unwrap();

    let registry = DataRegistry::builtin();
    run_verify(&store, &registry, &id, ANCHOR_YEAR).unwrap();
    let generated = run_generate(&store, &registry, &id).unwrap();
    assert!(matches!(generated, StageOutcome::Ok(_)));
    assert_eq!(
        store.get_strategy(&id).unwrap().state,
        StrategyState::NeedsReview
    );

    // Execution refuses while review is pending.
    let blocked = run_validate(
        &store,
        Arc::new(SimBackend),
        Arc::new(sim_reference_data(ANCHOR_YEAR)),
        &id,
        ANCHOR_YEAR,
        42,
        false,
    )
    .await
    .unwrap();
    assert!(matches!(blocked, StageOutcome::Error(_)));

    // Reviewer approves; execution may proceed.
    research_runner::pipeline::approve_review(&store, &id, "reviewed the custom body").unwrap();
    assert_eq!(
        store.get_strategy(&id).unwrap().state,
        StrategyState::ReadyToExecute
    );
}

#[tokio::test]
async fn test_generator_determinism_across_records() {
    // Same definition ingested in two separate workspaces generates
    // byte-identical artifacts with identical code hashes.
    let artifact_a = generate(&momentum_definition()).unwrap();
    let artifact_b = generate(&momentum_definition()).unwrap();
    assert_eq!(artifact_a.code, artifact_b.code);
    assert_eq!(artifact_a.code_hash, artifact_b.code_hash);
    assert!(research_codegen::find_literal_date(&artifact_a.code).is_none());
}

#[tokio::test]
async fn test_learn_records_insights_after_validation() {
    let (_dir, store) = workspace();
    let id = ingest_momentum(&store);
    drive_to_verdict(&store, &id, false).await;

    let outcome = research_runner::pipeline::run_learn(&store, &id).unwrap();
    assert!(matches!(outcome, StageOutcome::Ok(_)), "{outcome:?}");
    let learnings = store.list_learnings().unwrap();
    assert_eq!(learnings.len(), 1);
    assert!(!learnings[0].insights.is_empty());
    assert_eq!(learnings[0].strategy_id, id);
}

#[tokio::test]
async fn test_windows_cover_disjoint_calendar_spans() {
    let (_dir, store) = workspace();
    let id = ingest_momentum(&store);
    drive_to_verdict(&store, &id, false).await;

    let record = &store.list_validations(&id).unwrap()[0];
    for pair in record.windows.windows(2) {
        assert!(pair[0].end < pair[1].start);
    }
    let total_years: i32 = record
        .windows
        .iter()
        .map(|w| chrono::Datelike::year(&w.end) - chrono::Datelike::year(&w.start) + 1)
        .sum();
    assert_eq!(total_years, 36);
}

/// Reference-free execution still completes windows (regime tags absent).
#[tokio::test]
async fn test_missing_reference_data_degrades_gracefully() {
    let (_dir, store) = workspace();
    let id = ingest_momentum(&store);

    let registry = DataRegistry::builtin();
    run_verify(&store, &registry, &id, ANCHOR_YEAR).unwrap();
    run_generate(&store, &registry, &id).unwrap();
    run_validate(
        &store,
        Arc::new(SimBackend),
        Arc::new(SeriesReferenceData::default()),
        &id,
        ANCHOR_YEAR,
        42,
        false,
    )
    .await
    .unwrap();

    let record = &store.list_validations(&id).unwrap()[0];
    assert!(record.windows.iter().all(|w| w.regimes.is_none()));
}
