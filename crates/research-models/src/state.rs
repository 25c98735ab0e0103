//! Strategy lifecycle state machine.
//!
//! States advance only forward; terminal verdicts never regress. Any state
//! may fall to `Error` with a structured cause and is recoverable by
//! re-running the faulted stage against the same definition hash.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a strategy record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyState {
    /// Accepted by ingestion, waiting for verification.
    Pending,
    /// Verification checks running.
    Verifying,
    /// A verification check failed; cause recorded on the record.
    Blocked,
    /// All verification checks passed.
    ReadyToGenerate,
    /// Code generation running.
    Generating,
    /// Generation failed after retry.
    GenFailed,
    /// Tier-3 artifact awaiting human review before execution.
    NeedsReview,
    /// Artifact generated and fingerprint-checked.
    ReadyToExecute,
    /// Walk-forward windows dispatched.
    Executing,
    /// Windows complete; statistical validation and synthesis running.
    Analyzing,
    /// All gates passed.
    Validated,
    /// Regime-conditional pass.
    Conditional,
    /// Gate failure (data, not error).
    Invalidated,
    /// Filtered out at ingestion (below threshold).
    Archived,
    /// Hard red flag at ingestion.
    Rejected,
    /// Terminal fault with structured cause; recoverable by stage re-run.
    Error,
}

impl StrategyState {
    /// Directory name under `strategies/` for this state.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verifying
            | Self::ReadyToGenerate
            | Self::Generating
            | Self::NeedsReview
            | Self::ReadyToExecute
            | Self::Executing
            | Self::Analyzing => "active",
            Self::Blocked => "blocked",
            Self::GenFailed | Self::Error => "error",
            Self::Validated => "validated",
            Self::Conditional => "conditional",
            Self::Invalidated => "invalidated",
            Self::Archived | Self::Rejected => "archive",
        }
    }

    /// Terminal states accept no further forward transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Validated
                | Self::Conditional
                | Self::Invalidated
                | Self::Archived
                | Self::Rejected
        )
    }

    /// Verdict states produced by the statistical validator.
    pub fn is_verdict(&self) -> bool {
        matches!(self, Self::Validated | Self::Conditional | Self::Invalidated)
    }

    /// Whether `self -> to` is a legal transition.
    ///
    /// `Error` is reachable from any non-terminal state, and an errored
    /// record may resume into the stage it faulted from.
    pub fn can_transition_to(&self, to: StrategyState) -> bool {
        use StrategyState::*;
        if *self == to {
            return false;
        }
        if to == Error {
            return !self.is_terminal();
        }
        match self {
            Pending => matches!(to, Verifying),
            Verifying => matches!(to, Blocked | ReadyToGenerate),
            Blocked => matches!(to, Verifying),
            ReadyToGenerate => matches!(to, Generating),
            Generating => matches!(to, GenFailed | NeedsReview | ReadyToExecute),
            GenFailed => matches!(to, Generating),
            NeedsReview => matches!(to, ReadyToExecute | Blocked),
            ReadyToExecute => matches!(to, Executing),
            Executing => matches!(to, Analyzing),
            Analyzing => matches!(to, Validated | Conditional | Invalidated),
            // Recovery: resume the faulted stage.
            Error => matches!(
                to,
                Verifying | Generating | Executing | Analyzing
            ),
            Validated | Conditional | Invalidated | Archived | Rejected => false,
        }
    }

    /// Validate a transition, returning a structured error on refusal.
    pub fn transition(&self, to: StrategyState) -> Result<StrategyState, TransitionError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TransitionError {
                from: *self,
                to,
            })
        }
    }
}

impl std::fmt::Display for StrategyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Verifying => "verifying",
            Self::Blocked => "blocked",
            Self::ReadyToGenerate => "ready_to_generate",
            Self::Generating => "generating",
            Self::GenFailed => "gen_failed",
            Self::NeedsReview => "needs_review",
            Self::ReadyToExecute => "ready_to_execute",
            Self::Executing => "executing",
            Self::Analyzing => "analyzing",
            Self::Validated => "validated",
            Self::Conditional => "conditional",
            Self::Invalidated => "invalidated",
            Self::Archived => "archived",
            Self::Rejected => "rejected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Refused state transition.
#[derive(Debug, Clone, thiserror::Error)]
#[error("illegal state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: StrategyState,
    pub to: StrategyState,
}
