//! The record store: single source of truth for every record family.
//!
//! Strategies live under `strategies/{state}/STRAT-NNN.yaml` and move
//! directories on state transition. Transitions are CAS on the current state
//! (optimistic concurrency) and appended to `.state/transitions.jsonl`.
//! Validation bundles are written once with a sha256 manifest and verified
//! untouched on every read.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use research_models::{
    ContentHash, IdeaId, IdeaRecord, LearningRecord, ProposalId, ProposalRecord, ProposalStatus,
    StrategyDocument, StrategyId, StrategyState, TransitionError, ValidationKey, ValidationRecord,
};

use crate::io::{append_jsonl, read_yaml, write_atomic, write_yaml_atomic};
use crate::workspace::Workspace;

// =============================================================================
// Errors
// =============================================================================

/// Store-level failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("state conflict on {id}: expected {expected}, found {actual}")]
    StateConflict {
        id: StrategyId,
        expected: StrategyState,
        actual: StrategyState,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(
        "validation already exists for definition {definition}, code {code}, generator {generator}; \
         out-of-sample runs are one-shot (use force to append a new record)"
    )]
    DuplicateValidation {
        definition: String,
        code: String,
        generator: String,
    },

    #[error("lineage cycle detected at {0}")]
    LineageCycle(StrategyId),

    #[error("validation bundle tampered: {0}")]
    ValidationTampered(PathBuf),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// =============================================================================
// Transition log
// =============================================================================

/// One line in `.state/transitions.jsonl`.
#[derive(Debug, Serialize, Deserialize)]
struct TransitionLogEntry {
    id: StrategyId,
    from: Option<StrategyState>,
    to: StrategyState,
    reason: Option<String>,
    at: DateTime<Utc>,
}

// =============================================================================
// Query
// =============================================================================

/// Filter for `query`.
#[derive(Debug, Default, Clone)]
pub struct QueryFilter {
    pub state: Option<StrategyState>,
    /// Substring match on the strategy name (case-insensitive).
    pub name_contains: Option<String>,
    pub min_trust: Option<u8>,
    /// Match against edge-provenance factor alignment.
    pub factor: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
}

impl QueryFilter {
    fn matches(&self, doc: &StrategyDocument) -> bool {
        if let Some(state) = self.state {
            if doc.state != state {
                return false;
            }
        }
        if let Some(ref needle) = self.name_contains {
            if !doc.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(min_trust) = self.min_trust {
            let trust = doc.quality.as_ref().map(|q| q.trust.total()).unwrap_or(0);
            if trust < min_trust {
                return false;
            }
        }
        if let Some(ref factor) = self.factor {
            let aligned = doc
                .edge_provenance
                .as_ref()
                .and_then(|p| p.factor_alignment.as_deref())
                .map(|f| f.eq_ignore_ascii_case(factor))
                .unwrap_or(false);
            if !aligned {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if doc.created < after {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Record store
// =============================================================================

/// Distinct strategy partition directories.
const STRATEGY_DIRS: &[&str] = &[
    "pending",
    "active",
    "blocked",
    "error",
    "validated",
    "conditional",
    "invalidated",
    "archive",
];

pub struct RecordStore {
    workspace: Workspace,
}

impl RecordStore {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn strategy_path(&self, id: &StrategyId, state: StrategyState) -> PathBuf {
        self.workspace
            .strategies_dir()
            .join(state.dir_name())
            .join(format!("{id}.yaml"))
    }

    fn transitions_log(&self) -> PathBuf {
        self.workspace.state_dir().join("transitions.jsonl")
    }

    // -------------------------------------------------------------------------
    // Strategies
    // -------------------------------------------------------------------------

    /// Persist a new strategy record in its current state partition.
    pub fn create_strategy(&self, doc: &StrategyDocument) -> Result<(), StoreError> {
        let path = self.strategy_path(&doc.id, doc.state);
        write_yaml_atomic(&path, doc)?;
        append_jsonl(
            &self.transitions_log(),
            &TransitionLogEntry {
                id: doc.id.clone(),
                from: None,
                to: doc.state,
                reason: doc.status_reason.clone(),
                at: Utc::now(),
            },
        )?;
        tracing::info!(id = %doc.id, state = %doc.state, "strategy created");
        Ok(())
    }

    /// Locate a strategy across all state partitions.
    fn find_strategy(&self, id: &StrategyId) -> Result<Option<(StrategyDocument, PathBuf)>, StoreError> {
        for dir in STRATEGY_DIRS {
            let path = self
                .workspace
                .strategies_dir()
                .join(dir)
                .join(format!("{id}.yaml"));
            if path.exists() {
                let doc: StrategyDocument = read_yaml(&path)?;
                return Ok(Some((doc, path)));
            }
        }
        Ok(None)
    }

    pub fn get_strategy(&self, id: &StrategyId) -> Result<StrategyDocument, StoreError> {
        self.find_strategy(id)?
            .map(|(doc, _)| doc)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// CAS state transition. Fails if the current state is not `from`, or if
    /// the transition is illegal. Moves the record file between partitions
    /// and appends to the transition log.
    pub fn update_state(
        &self,
        id: &StrategyId,
        from: StrategyState,
        to: StrategyState,
        reason: Option<&str>,
    ) -> Result<StrategyDocument, StoreError> {
        let (mut doc, old_path) = self
            .find_strategy(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if doc.state != from {
            return Err(StoreError::StateConflict {
                id: id.clone(),
                expected: from,
                actual: doc.state,
            });
        }
        doc.state = from.transition(to)?;
        doc.status_reason = reason.map(str::to_string);

        let new_path = self.strategy_path(id, to);
        write_yaml_atomic(&new_path, &doc)?;
        if new_path != old_path {
            std::fs::remove_file(&old_path)
                .map_err(|e| StoreError::Internal(anyhow::Error::new(e)))?;
        }

        append_jsonl(
            &self.transitions_log(),
            &TransitionLogEntry {
                id: id.clone(),
                from: Some(from),
                to,
                reason: reason.map(str::to_string),
                at: Utc::now(),
            },
        )?;
        tracing::info!(id = %id, from = %from, to = %to, reason, "state transition");
        Ok(doc)
    }

    /// Persist in-place metadata updates (quality, provenance). The state
    /// field must be unchanged; transitions go through `update_state`.
    pub fn save_strategy(&self, doc: &StrategyDocument) -> Result<(), StoreError> {
        let (existing, path) = self
            .find_strategy(&doc.id)?
            .ok_or_else(|| StoreError::NotFound(doc.id.to_string()))?;
        if existing.state != doc.state {
            return Err(StoreError::StateConflict {
                id: doc.id.clone(),
                expected: existing.state,
                actual: doc.state,
            });
        }
        write_yaml_atomic(&path, doc)?;
        Ok(())
    }

    /// All strategies across all partitions, ordered by id.
    pub fn all_strategies(&self) -> Result<Vec<StrategyDocument>, StoreError> {
        let mut docs = Vec::new();
        for dir in STRATEGY_DIRS {
            let dir_path = self.workspace.strategies_dir().join(dir);
            if !dir_path.exists() {
                continue;
            }
            for entry in std::fs::read_dir(&dir_path)
                .map_err(|e| StoreError::Internal(anyhow::Error::new(e)))?
            {
                let path = entry
                    .map_err(|e| StoreError::Internal(anyhow::Error::new(e)))?
                    .path();
                if path.extension().map(|e| e == "yaml").unwrap_or(false) {
                    docs.push(read_yaml::<StrategyDocument>(&path)?);
                }
            }
        }
        docs.sort_by_key(|d| d.id.seq());
        Ok(docs)
    }

    pub fn query(&self, filter: &QueryFilter) -> Result<Vec<StrategyDocument>, StoreError> {
        Ok(self
            .all_strategies()?
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect())
    }

    /// Ingestion idempotence: find an existing record for a source hash.
    pub fn find_by_source_hash(
        &self,
        hash: &ContentHash,
    ) -> Result<Option<StrategyDocument>, StoreError> {
        Ok(self
            .all_strategies()?
            .into_iter()
            .find(|d| &d.source.content_hash == hash))
    }

    // -------------------------------------------------------------------------
    // Lineage
    // -------------------------------------------------------------------------

    /// Ancestors of a strategy in dependency order. Errors on a cycle.
    pub fn resolve_lineage(&self, id: &StrategyId) -> Result<Vec<StrategyId>, StoreError> {
        let mut out = Vec::new();
        let mut visited = BTreeSet::new();
        let mut in_path: BTreeSet<StrategyId> = BTreeSet::new();
        self.walk_lineage(id, &mut out, &mut visited, &mut in_path)?;
        Ok(out)
    }

    fn walk_lineage(
        &self,
        id: &StrategyId,
        out: &mut Vec<StrategyId>,
        visited: &mut BTreeSet<StrategyId>,
        in_path: &mut BTreeSet<StrategyId>,
    ) -> Result<(), StoreError> {
        if in_path.contains(id) {
            return Err(StoreError::LineageCycle(id.clone()));
        }
        if !visited.insert(id.clone()) {
            return Ok(());
        }
        in_path.insert(id.clone());
        let doc = self.get_strategy(id)?;
        if let Some(lineage) = &doc.lineage {
            for parent in &lineage.parents {
                self.walk_lineage(parent, out, visited, in_path)?;
                if !out.contains(parent) {
                    out.push(parent.clone());
                }
            }
        }
        in_path.remove(id);
        Ok(())
    }

    /// Whether attaching `parents` to a new child would introduce a cycle:
    /// true when any parent's lineage already contains the child.
    pub fn would_create_cycle(
        &self,
        child: &StrategyId,
        parents: &[StrategyId],
    ) -> Result<bool, StoreError> {
        for parent in parents {
            if parent == child {
                return Ok(true);
            }
            match self.resolve_lineage(parent) {
                Ok(ancestors) => {
                    if ancestors.contains(child) {
                        return Ok(true);
                    }
                }
                Err(StoreError::LineageCycle(_)) => return Ok(true),
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    // -------------------------------------------------------------------------
    // Validations
    // -------------------------------------------------------------------------

    fn validation_root(&self, id: &StrategyId) -> PathBuf {
        self.workspace.validations_dir().join(id.to_string())
    }

    /// Append an immutable validation bundle:
    /// `validations/STRAT-NNN/{timestamp}/{metadata,windows,aggregate}.yaml`
    /// plus `code.py` and a sha256 manifest.
    ///
    /// Out-of-sample is one-shot: a second validation for the same
    /// `(definition_hash, code_hash, generator_version)` is refused unless
    /// `force`, which appends rather than overwrites.
    pub fn append_validation(
        &self,
        record: &ValidationRecord,
        code: &str,
        force: bool,
    ) -> Result<PathBuf, StoreError> {
        if !force && self.has_validation(&record.strategy_id, &record.key)? {
            return Err(StoreError::DuplicateValidation {
                definition: record.key.definition_hash.short().to_string(),
                code: record.key.code_hash.short().to_string(),
                generator: record.key.generator_version.clone(),
            });
        }

        let dir = self
            .validation_root(&record.strategy_id)
            .join(record.started_at.format("%Y%m%dT%H%M%S%.3fZ").to_string());
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Internal(anyhow::Error::new(e)))?;

        let metadata = ValidationMetadata::from_record(record);
        write_yaml_atomic(&dir.join("metadata.yaml"), &metadata)?;
        write_yaml_atomic(&dir.join("windows.yaml"), &record.windows)?;
        write_yaml_atomic(&dir.join("aggregate.yaml"), &record.aggregate)?;
        write_atomic(&dir.join("code.py"), code.as_bytes())?;

        // Manifest last: it seals the bundle.
        let mut manifest = String::new();
        for name in ["metadata.yaml", "windows.yaml", "aggregate.yaml", "code.py"] {
            let bytes = std::fs::read(dir.join(name))
                .map_err(|e| StoreError::Internal(anyhow::Error::new(e)))?;
            let hash = research_models::sha256_hex(&bytes);
            manifest.push_str(&format!("{}  {}\n", hash, name));
        }
        write_atomic(&dir.join("manifest.sha256"), manifest.as_bytes())?;

        tracing::info!(
            id = %record.strategy_id,
            verdict = ?record.verdict,
            dir = %dir.display(),
            "validation appended"
        );
        Ok(dir)
    }

    /// Whether a completed validation exists for the key.
    pub fn has_validation(
        &self,
        id: &StrategyId,
        key: &ValidationKey,
    ) -> Result<bool, StoreError> {
        Ok(self
            .list_validations(id)?
            .iter()
            .any(|record| &record.key == key))
    }

    /// All validation records for a strategy, oldest first, with bundle
    /// integrity verified against the manifest.
    pub fn list_validations(&self, id: &StrategyId) -> Result<Vec<ValidationRecord>, StoreError> {
        let root = self.validation_root(id);
        let mut records = Vec::new();
        if !root.exists() {
            return Ok(records);
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&root)
            .map_err(|e| StoreError::Internal(anyhow::Error::new(e)))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        for dir in dirs {
            self.verify_bundle(&dir)?;
            records.push(self.load_validation(&dir)?);
        }
        Ok(records)
    }

    /// Count of validations across a definition lineage; this is the
    /// family size for multiple-testing correction.
    pub fn validation_family_size(&self, id: &StrategyId) -> Result<u32, StoreError> {
        let mut family = self.list_validations(id)?.len() as u32;
        for ancestor in self.resolve_lineage(id)? {
            family += self.list_validations(&ancestor)?.len() as u32;
        }
        Ok(family)
    }

    fn load_validation(&self, dir: &Path) -> Result<ValidationRecord, StoreError> {
        let metadata: ValidationMetadata = read_yaml(&dir.join("metadata.yaml"))?;
        let windows = read_yaml(&dir.join("windows.yaml"))?;
        let aggregate = read_yaml(&dir.join("aggregate.yaml"))?;
        Ok(metadata.into_record(windows, aggregate))
    }

    /// Verify the bundle's bytes against its manifest.
    fn verify_bundle(&self, dir: &Path) -> Result<(), StoreError> {
        let manifest_path = dir.join("manifest.sha256");
        let manifest = std::fs::read_to_string(&manifest_path)
            .map_err(|_| StoreError::ValidationTampered(dir.to_path_buf()))?;
        for line in manifest.lines() {
            let Some((expected, name)) = line.split_once("  ") else {
                return Err(StoreError::ValidationTampered(dir.to_path_buf()));
            };
            let bytes = std::fs::read(dir.join(name))
                .map_err(|_| StoreError::ValidationTampered(dir.to_path_buf()))?;
            if research_models::sha256_hex(&bytes).as_str() != expected {
                return Err(StoreError::ValidationTampered(dir.to_path_buf()));
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Learnings, ideas, proposals
    // -------------------------------------------------------------------------

    /// Append a learning record; filenames are unique per (strategy, time).
    pub fn append_learning(&self, record: &LearningRecord) -> Result<PathBuf, StoreError> {
        let path = self.workspace.learnings_dir().join(format!(
            "{}-{}.yaml",
            record.strategy_id,
            record.created.format("%Y%m%dT%H%M%S%.3fZ")
        ));
        write_yaml_atomic(&path, record)?;
        Ok(path)
    }

    pub fn list_learnings(&self) -> Result<Vec<LearningRecord>, StoreError> {
        self.list_dir(&self.workspace.learnings_dir())
    }

    pub fn save_idea(&self, idea: &IdeaRecord) -> Result<(), StoreError> {
        let path = self
            .workspace
            .ideas_dir()
            .join(format!("{}.yaml", idea.id));
        write_yaml_atomic(&path, idea)?;
        Ok(())
    }

    pub fn get_idea(&self, id: &IdeaId) -> Result<IdeaRecord, StoreError> {
        let path = self.workspace.ideas_dir().join(format!("{id}.yaml"));
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(read_yaml(&path)?)
    }

    pub fn delete_idea(&self, id: &IdeaId) -> Result<(), StoreError> {
        let path = self.workspace.ideas_dir().join(format!("{id}.yaml"));
        std::fs::remove_file(path).map_err(|e| StoreError::Internal(anyhow::Error::new(e)))
    }

    pub fn list_ideas(&self) -> Result<Vec<IdeaRecord>, StoreError> {
        let mut ideas: Vec<IdeaRecord> = self.list_dir(&self.workspace.ideas_dir())?;
        ideas.sort_by_key(|i| i.id.seq());
        Ok(ideas)
    }

    pub fn save_proposal(&self, proposal: &ProposalRecord) -> Result<(), StoreError> {
        let path = self
            .workspace
            .proposals_dir()
            .join(format!("{}.yaml", proposal.id));
        write_yaml_atomic(&path, proposal)?;
        Ok(())
    }

    pub fn get_proposal(&self, id: &ProposalId) -> Result<ProposalRecord, StoreError> {
        let path = self.workspace.proposals_dir().join(format!("{id}.yaml"));
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(read_yaml(&path)?)
    }

    /// Proposals in FIFO (allocation) order.
    pub fn list_proposals(&self) -> Result<Vec<ProposalRecord>, StoreError> {
        let mut proposals: Vec<ProposalRecord> = self.list_dir(&self.workspace.proposals_dir())?;
        proposals.sort_by_key(|p| p.id.seq());
        Ok(proposals)
    }

    /// Remove deferred proposals past their TTL; returns pruned ids.
    pub fn prune_expired_proposals(&self, now: DateTime<Utc>) -> Result<Vec<ProposalId>, StoreError> {
        let mut pruned = Vec::new();
        for proposal in self.list_proposals()? {
            if proposal.status == ProposalStatus::Deferred && proposal.is_expired(now) {
                let path = self
                    .workspace
                    .proposals_dir()
                    .join(format!("{}.yaml", proposal.id));
                std::fs::remove_file(path)
                    .map_err(|e| StoreError::Internal(anyhow::Error::new(e)))?;
                pruned.push(proposal.id);
            }
        }
        Ok(pruned)
    }

    fn list_dir<T: serde::de::DeserializeOwned>(&self, dir: &Path) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        if !dir.exists() {
            return Ok(out);
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| StoreError::Internal(anyhow::Error::new(e)))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "yaml").unwrap_or(false))
            .collect();
        paths.sort();
        for path in paths {
            out.push(read_yaml(&path)?);
        }
        Ok(out)
    }
}

// =============================================================================
// Validation bundle metadata
// =============================================================================

/// `metadata.yaml` inside a validation bundle; windows and aggregate live in
/// their own files.
#[derive(Debug, Serialize, Deserialize)]
struct ValidationMetadata {
    schema_version: String,
    strategy_id: StrategyId,
    key: ValidationKey,
    started_at: DateTime<Utc>,
    gates: research_models::ValidationGates,
    gate_checks: Vec<research_models::GateCheck>,
    verdict: research_models::Verdict,
    passing_regimes: Vec<String>,
    notes: Option<String>,
}

impl ValidationMetadata {
    fn from_record(record: &ValidationRecord) -> Self {
        Self {
            schema_version: record.schema_version.clone(),
            strategy_id: record.strategy_id.clone(),
            key: record.key.clone(),
            started_at: record.started_at,
            gates: record.gates.clone(),
            gate_checks: record.gate_checks.clone(),
            verdict: record.verdict,
            passing_regimes: record.passing_regimes.clone(),
            notes: record.notes.clone(),
        }
    }

    fn into_record(
        self,
        windows: Vec<research_models::WindowResult>,
        aggregate: Option<research_models::AggregateMetrics>,
    ) -> ValidationRecord {
        ValidationRecord {
            schema_version: self.schema_version,
            strategy_id: self.strategy_id,
            key: self.key,
            started_at: self.started_at,
            windows,
            gates: self.gates,
            gate_checks: self.gate_checks,
            aggregate,
            verdict: self.verdict,
            passing_regimes: self.passing_regimes,
            notes: self.notes,
        }
    }
}
