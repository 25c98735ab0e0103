//! Command implementations over the core crates.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use research_gates::DataRegistry;
use research_ingest::{IngestionFilter, StrategyDraft};
use research_models::{
    IdeaId, IdeaStatus, IngestionDecision, ProposalId, ProposalStatus, StrategyId, StrategyState,
};
use research_store::{init_tracing, QueryFilter, RecordStore, Workspace};
use research_synthesis::{
    apply_synthesis, run_ideation, IdeationGate, PersonaOrchestrator,
};

use crate::pipeline::{
    self, approve_review, default_anchor_year, run_learn, run_validate, run_verify, StageOutcome,
};
use crate::sim::{sim_reference_data, SimBackend};
use crate::{Cli, Commands};

/// Dispatch one parsed CLI invocation; returns the process exit code.
pub async fn dispatch(cli: Cli) -> i32 {
    let root = Workspace::resolve_root(cli.workspace.as_deref());

    if matches!(&cli.command, Commands::Init) {
        return match Workspace::init(&root) {
            Ok(ws) => {
                println!("workspace initialized at {}", ws.root().display());
                0
            }
            Err(e) => {
                eprintln!("init failed: {e:#}");
                1
            }
        };
    }

    let workspace = match Workspace::open(&root) {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("{e:#}");
            return 1;
        }
    };
    let _guards = init_tracing(
        &workspace.logs_dir(),
        "research-kit",
        workspace.config().log_level,
    );
    let store = RecordStore::new(workspace);

    let result = match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Ingest { file } => cmd_ingest(&store, file.as_deref()),
        Commands::Verify { id, anchor_year } => {
            cmd_stage_outcome(parse_strategy_id(&id).and_then(|id| {
                run_verify(
                    &store,
                    &DataRegistry::builtin(),
                    &id,
                    anchor_year.unwrap_or_else(default_anchor_year),
                )
            }))
        }
        Commands::Generate { id } => cmd_stage_outcome(
            parse_strategy_id(&id)
                .and_then(|id| pipeline::run_generate(&store, &DataRegistry::builtin(), &id)),
        ),
        Commands::Validate {
            id,
            anchor_year,
            seed,
            force,
        } => {
            let anchor = anchor_year.unwrap_or_else(default_anchor_year);
            match parse_strategy_id(&id) {
                Ok(id) => cmd_stage_outcome(
                    run_validate(
                        &store,
                        Arc::new(SimBackend),
                        Arc::new(sim_reference_data(anchor)),
                        &id,
                        anchor,
                        seed,
                        force,
                    )
                    .await,
                ),
                Err(e) => {
                    eprintln!("{e:#}");
                    1
                }
            }
        }
        Commands::Learn { id } => {
            cmd_stage_outcome(parse_strategy_id(&id).and_then(|id| run_learn(&store, &id)))
        }
        Commands::Synthesize { id } => cmd_synthesize(&store, &id).await,
        Commands::Ideate => cmd_ideate(&store).await,
        Commands::List { state } => cmd_list(&store, state.as_deref()),
        Commands::Show { id } => cmd_show(&store, &id),
        Commands::Status => cmd_status(&store),
        Commands::Approve { id, decision, note } => cmd_approve(&store, &id, &decision, &note).await,
    };

    result
}

fn parse_strategy_id(raw: &str) -> anyhow::Result<StrategyId> {
    StrategyId::parse(raw).map_err(Into::into)
}

fn cmd_stage_outcome(result: anyhow::Result<StageOutcome>) -> i32 {
    match result {
        Ok(outcome) => {
            println!("{}", outcome.message());
            outcome.exit_code()
        }
        Err(e) => {
            eprintln!("{e:#}");
            1
        }
    }
}

// =============================================================================
// ingest
// =============================================================================

fn cmd_ingest(store: &RecordStore, file: Option<&Path>) -> i32 {
    let files = match file {
        Some(path) => vec![path.to_path_buf()],
        None => match store.workspace().inbox_files() {
            Ok(files) => files,
            Err(e) => {
                eprintln!("inbox scan failed: {e:#}");
                return 1;
            }
        },
    };
    if files.is_empty() {
        println!("inbox empty; nothing to ingest");
        return 0;
    }

    let filter = IngestionFilter::new(store);
    let mut failures = 0;
    for path in files {
        let draft = match StrategyDraft::load(&path) {
            Ok(draft) => draft,
            Err(e) => {
                eprintln!("{}: unreadable draft: {e:#}", path.display());
                failures += 1;
                continue;
            }
        };
        match filter.ingest(&draft) {
            Ok(outcome) => {
                let id = outcome
                    .strategy_id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{}: {:?} ({id}) specificity {}/8 trust {} {}",
                    path.display(),
                    outcome.decision,
                    outcome.quality.specificity.score(),
                    outcome.quality.trust.total(),
                    outcome
                        .quality
                        .decision_reason
                        .as_deref()
                        .unwrap_or_default()
                );
                // Accepted or archived drafts leave the inbox; queued
                // drafts stay for triage.
                let keep = outcome.decision == IngestionDecision::Queue;
                if !keep && !outcome.already_ingested {
                    let _ = std::fs::remove_file(&path);
                }
            }
            Err(e) => {
                eprintln!("{}: ingest failed: {e:#}", path.display());
                failures += 1;
            }
        }
    }
    if failures > 0 { 1 } else { 0 }
}

// =============================================================================
// synthesize / ideate
// =============================================================================

async fn cmd_synthesize(store: &RecordStore, raw_id: &str) -> i32 {
    let id = match parse_strategy_id(raw_id) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("{e:#}");
            return 1;
        }
    };
    let doc = match store.get_strategy(&id) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };
    let validations = match store.list_validations(&id) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{e}");
            return 4;
        }
    };
    let Some(latest) = validations.last() else {
        eprintln!("{id} has no validation records; run validate first");
        return 1;
    };

    let Some(provider) = agent_provider() else {
        eprintln!("no LLM provider configured; set ANTHROPIC_API_KEY (synthesis skipped)");
        return 1;
    };

    let orchestrator =
        PersonaOrchestrator::new(provider, store.workspace().config().synthesis.clone());
    match orchestrator.analyze(&doc, latest).await {
        Ok(analysis) => match apply_synthesis(store, &doc, latest, &analysis) {
            Ok(applied) => {
                println!(
                    "{id}: synthesis {:?}; {} learning(s), {} proposal(s), {} idea(s)",
                    analysis.synthesis.status,
                    applied.learnings,
                    applied.proposals.len(),
                    applied.ideas.len()
                );
                0
            }
            Err(e) => {
                eprintln!("persisting synthesis failed: {e}");
                4
            }
        },
        Err(e) => {
            eprintln!("synthesis failed: {e}");
            4
        }
    }
}

async fn cmd_ideate(store: &RecordStore) -> i32 {
    let Some(provider) = agent_provider() else {
        eprintln!("no LLM provider configured; set ANTHROPIC_API_KEY (ideation skipped)");
        return 1;
    };
    let config = store.workspace().config().synthesis.clone();

    let context = match workspace_context(store) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("{e}");
            return 4;
        }
    };

    let raw = run_ideation(provider, &config, &context).await;
    let gate = IdeationGate {
        available_data: DataRegistry::builtin().entries.keys().cloned().collect(),
        max_ideas: config.max_ideas,
    };
    let (accepted, rejected) = gate.filter(raw);

    let counters = store.workspace().counters();
    let mut saved = 0;
    for idea in &accepted {
        let seq = match counters.allocate(IdeaId::PREFIX) {
            Ok(seq) => seq,
            Err(e) => {
                eprintln!("counter allocation failed: {e:#}");
                return 4;
            }
        };
        let record = research_models::IdeaRecord {
            id: IdeaId::from_seq(seq),
            status: IdeaStatus::Pending,
            created: Utc::now(),
            name: idea.name.clone(),
            thesis: idea.thesis.clone(),
            hypothesis: idea.hypothesis.clone(),
            entry_logic: idea.entry_logic.clone(),
            exit_logic: idea.exit_logic.clone(),
            risk_management: idea.risk_management.clone(),
            data_requirements: idea.data_requirements.clone(),
            parents: vec![],
            generated_by: "ideation".into(),
            confidence: idea.confidence.clone(),
        };
        if let Err(e) = store.save_idea(&record) {
            eprintln!("saving idea failed: {e}");
            return 4;
        }
        saved += 1;
    }
    println!("{saved} idea(s) filed, {} rejected", rejected.len());
    for reason in rejected {
        println!("  rejected: {reason}");
    }
    0
}

/// Real provider wiring is environment-driven; absent credentials mean
/// offline mode and the command reports it rather than failing silently.
pub fn agent_provider() -> Option<Arc<dyn research_synthesis::AgentProvider>> {
    // The LLM provider is an external collaborator; the core only consumes
    // the dispatch interface. Without credentials we run offline.
    if std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty()).is_some() {
        tracing::warn!("LLM provider credentials found but no provider linked in this build");
    }
    None
}

fn workspace_context(store: &RecordStore) -> Result<String, research_store::StoreError> {
    let mut out = String::new();
    for state in [
        StrategyState::Validated,
        StrategyState::Conditional,
        StrategyState::Invalidated,
        StrategyState::Pending,
    ] {
        let docs = store.query(&QueryFilter {
            state: Some(state),
            ..Default::default()
        })?;
        if docs.is_empty() {
            continue;
        }
        out.push_str(&format!("## {state}\n\n"));
        for doc in docs {
            out.push_str(&format!("- {} {}: {}\n", doc.id, doc.name, doc.hypothesis.summary));
        }
        out.push('\n');
    }
    Ok(out)
}

// =============================================================================
// list / show / status
// =============================================================================

fn parse_state(raw: &str) -> Option<StrategyState> {
    serde_yaml::from_str(raw).ok()
}

fn cmd_list(store: &RecordStore, state: Option<&str>) -> i32 {
    let filter = QueryFilter {
        state: state.and_then(parse_state),
        ..Default::default()
    };
    match store.query(&filter) {
        Ok(docs) => {
            for doc in docs {
                let trust = doc
                    .quality
                    .as_ref()
                    .map(|q| q.trust.total().to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{}  {:<18} trust {:>3}  {}",
                    doc.id, doc.state, trust, doc.name
                );
            }
            0
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}

fn cmd_show(store: &RecordStore, raw_id: &str) -> i32 {
    if raw_id.starts_with(IdeaId::PREFIX) {
        return show_yaml(IdeaId::parse(raw_id).map_err(anyhow::Error::from).and_then(|id| {
            store.get_idea(&id).map_err(Into::into)
        }));
    }
    if raw_id.starts_with(ProposalId::PREFIX) {
        return show_yaml(
            ProposalId::parse(raw_id)
                .map_err(anyhow::Error::from)
                .and_then(|id| store.get_proposal(&id).map_err(Into::into)),
        );
    }

    match parse_strategy_id(raw_id).and_then(|id| Ok((store.get_strategy(&id)?, id))) {
        Ok((doc, id)) => {
            match serde_yaml::to_string(&doc) {
                Ok(text) => print!("{text}"),
                Err(e) => {
                    eprintln!("{e}");
                    return 1;
                }
            }
            if let Ok(validations) = store.list_validations(&id) {
                for record in validations {
                    println!(
                        "validation {} ({:?}): {} windows",
                        record.started_at.format("%Y-%m-%d %H:%M:%S"),
                        record.verdict,
                        record.windows.len()
                    );
                }
            }
            0
        }
        Err(e) => {
            eprintln!("{e:#}");
            1
        }
    }
}

fn show_yaml<T: serde::Serialize>(record: anyhow::Result<T>) -> i32 {
    match record.and_then(|r| serde_yaml::to_string(&r).map_err(Into::into)) {
        Ok(text) => {
            print!("{text}");
            0
        }
        Err(e) => {
            eprintln!("{e:#}");
            1
        }
    }
}

fn cmd_status(store: &RecordStore) -> i32 {
    match store.all_strategies() {
        Ok(docs) => {
            let mut counts = std::collections::BTreeMap::new();
            for doc in &docs {
                *counts.entry(doc.state.to_string()).or_insert(0u32) += 1;
            }
            println!("strategies: {}", docs.len());
            for (state, count) in counts {
                println!("  {state:<18} {count}");
            }
            let ideas = store.list_ideas().map(|i| i.len()).unwrap_or(0);
            let proposals = store.list_proposals().map(|p| p.len()).unwrap_or(0);
            println!("ideas: {ideas}");
            println!("proposals: {proposals}");
            0
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}

// =============================================================================
// approve
// =============================================================================

async fn cmd_approve(store: &RecordStore, raw_id: &str, decision: &str, note: &str) -> i32 {
    if raw_id.starts_with(IdeaId::PREFIX) {
        return cmd_approve_idea(store, raw_id, decision, note);
    }
    if raw_id.starts_with(ProposalId::PREFIX) {
        return cmd_approve_proposal(store, raw_id, decision, note);
    }
    // Strategy id: tier-3 review approval.
    match parse_strategy_id(raw_id).and_then(|id| approve_review(store, &id, note)) {
        Ok(outcome) => {
            println!("{}", outcome.message());
            outcome.exit_code()
        }
        Err(e) => {
            eprintln!("{e:#}");
            1
        }
    }
}

/// Idea approval converts the idea into a pending tier-3 strategy with
/// lineage back to its parents; rejected approvals that would introduce a
/// lineage cycle are refused.
fn cmd_approve_idea(store: &RecordStore, raw_id: &str, decision: &str, note: &str) -> i32 {
    let idea = match IdeaId::parse(raw_id).map_err(anyhow::Error::from).and_then(|id| {
        store.get_idea(&id).map_err(Into::into)
    }) {
        Ok(idea) => idea,
        Err(e) => {
            eprintln!("{e:#}");
            return 1;
        }
    };

    if decision != "approve" {
        let mut rejected = idea;
        rejected.status = IdeaStatus::Rejected;
        if let Err(e) = store.save_idea(&rejected) {
            eprintln!("{e}");
            return 4;
        }
        println!("{} rejected", rejected.id);
        return 0;
    }

    match research_ingest::promote_idea(store, &idea, note) {
        Ok(strategy_id) => {
            if let Err(e) = store.delete_idea(&idea.id) {
                eprintln!("warning: idea cleanup failed: {e}");
            }
            println!("{} approved -> {strategy_id} (pending, tier 3)", idea.id);
            0
        }
        Err(e) => {
            eprintln!("approval refused: {e}");
            1
        }
    }
}

fn cmd_approve_proposal(store: &RecordStore, raw_id: &str, decision: &str, note: &str) -> i32 {
    let mut proposal = match ProposalId::parse(raw_id)
        .map_err(anyhow::Error::from)
        .and_then(|id| store.get_proposal(&id).map_err(Into::into))
    {
        Ok(proposal) => proposal,
        Err(e) => {
            eprintln!("{e:#}");
            return 1;
        }
    };

    if proposal.status != ProposalStatus::Pending {
        eprintln!("{} is {:?}, not pending", proposal.id, proposal.status);
        return 1;
    }

    proposal.reviewed_at = Some(Utc::now());
    proposal.review_note = (!note.is_empty()).then(|| note.to_string());
    proposal.status = match decision {
        "approve" => ProposalStatus::Approved,
        "reject" => ProposalStatus::Rejected,
        "defer" => ProposalStatus::Deferred,
        other => {
            eprintln!("unknown decision '{other}' (approve|reject|defer)");
            return 1;
        }
    };

    if proposal.status == ProposalStatus::Approved {
        if let Err(e) = research_ingest::materialize_proposal(store, &proposal, note) {
            eprintln!("approval refused: {e}");
            return 1;
        }
    }

    if let Err(e) = store.save_proposal(&proposal) {
        eprintln!("{e}");
        return 4;
    }

    // Expired deferrals prune on every review pass.
    if let Ok(pruned) = store.prune_expired_proposals(Utc::now()) {
        for id in pruned {
            println!("pruned expired deferred proposal {id}");
        }
    }

    println!("{} {:?}", proposal.id, proposal.status);
    0
}
