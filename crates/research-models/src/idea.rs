//! Lightweight idea records generated by the persona orchestrator.
//!
//! Ideas are drafts: approval converts an idea into a pending strategy after
//! a lineage cycle check; unapproved ideas are pruned by TTL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{IdeaId, StrategyId};

/// Review status of an idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    Pending,
    Approved,
    Rejected,
}

/// A strategy idea awaiting formalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaRecord {
    pub id: IdeaId,
    pub status: IdeaStatus,
    pub created: DateTime<Utc>,
    pub name: String,
    /// Why the edge should exist and persist.
    pub thesis: String,
    /// Specific, testable hypothesis.
    pub hypothesis: String,
    pub entry_logic: String,
    pub exit_logic: String,
    pub risk_management: String,
    pub data_requirements: Vec<String>,
    /// Parent strategies this idea derives from; must form a DAG.
    pub parents: Vec<StrategyId>,
    /// Persona that generated the idea.
    pub generated_by: String,
    pub confidence: String,
}
