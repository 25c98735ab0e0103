//! Proposal records: synthesis outputs awaiting human review.
//!
//! The queue is FIFO per kind. Human review is the only transition out of
//! `pending`; approval materializes the implied record, rejection records the
//! reason, deferral keeps the entry in-queue until its TTL expires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ProposalId, StrategyId};

/// Days a deferred proposal survives before pruning.
pub const DEFERRED_TTL_DAYS: i64 = 30;

/// What the proposal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    /// Combine existing strategies into a composite.
    Combination,
    /// Parameter or structural enhancement of one strategy.
    Enhancement,
    /// Acquire a dataset to unblock or improve strategies.
    DataAcquisition,
    /// Re-test a refined hypothesis.
    RefinedHypothesis,
}

/// Review status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Deferred,
}

/// A proposal in the human-review queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub id: ProposalId,
    pub kind: ProposalKind,
    pub status: ProposalStatus,
    pub created: DateTime<Utc>,
    pub title: String,
    pub rationale: String,
    /// Strategies the proposal builds on.
    pub source_strategies: Vec<StrategyId>,
    /// Persona or synthesizer that generated it.
    pub proposed_by: String,
    /// Expected benefit in the proposer's words.
    pub expected_benefit: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_note: Option<String>,
}

impl ProposalRecord {
    /// Deferred proposals expire after the TTL; approved are permanent.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Deferred
            && (now - self.reviewed_at.unwrap_or(self.created)).num_days() >= DEFERRED_TTL_DAYS
    }
}
