//! # Research Models
//!
//! Canonical record types shared across the research pipeline.
//!
//! ## Record Families
//! - **Strategy**: declarative strategy document + state machine
//! - **Validation**: immutable walk-forward results (per-window + aggregate)
//! - **Learning**: append-only insights linked to validations
//! - **Proposal / Idea**: synthesis outputs awaiting human review
//!
//! ## Determinism Contract
//! Every digest in the system is SHA-256 over canonical JSON: typed structs
//! with fixed field order, `BTreeMap` for all keyed collections, and
//! normalized (sorted, deduplicated) unordered sets. Same definition, same
//! `definition_hash` regardless of field ordering in the source YAML.

pub mod canonical;
pub mod idea;
pub mod ids;
pub mod ingestion;
pub mod learning;
pub mod persona;
pub mod proposal;
pub mod regime;
pub mod state;
pub mod strategy;
pub mod validation;

pub use canonical::{canonical_json, hash_canonical, sha256_hex, ContentHash};
pub use idea::{IdeaRecord, IdeaStatus};
pub use ids::{IdError, IdeaId, ProposalId, StrategyId};
pub use ingestion::{
    flag_message, IngestionDecision, IngestionQuality, RedFlag, RedFlagSeverity,
    SpecificityScore, TrustScore, HARD_RED_FLAGS, RED_FLAG_PENALTY, SOFT_RED_FLAGS,
};
pub use learning::{Insight, InsightDimension, LearningRecord};
pub use persona::{IdeationPersona, Persona};
pub use proposal::{ProposalKind, ProposalRecord, ProposalStatus, DEFERRED_TTL_DAYS};
pub use regime::{
    CapRegime, DirectionRegime, RatesRegime, RegimeTags, RegimeThresholds, VolatilityRegime,
    REGIME_THRESHOLDS,
};
pub use state::{StrategyState, TransitionError};
pub use strategy::{
    Archetype, AuthorTrackRecord, ClaimedPerformance, DataRequirement, DataTier, EdgeCategory,
    EdgeProvenance, Entry, EntryKind, Exit, ExitKind, ExitPath, Hypothesis, IndicatorRef,
    LineageRelationship, ManagementRule, Position, PositionManagement, ProvenanceConfidence,
    ProvenanceSource, RegimeAdaptive, RegimeMode, SizingMethod, SourceCredibility, SourceType,
    StrategyDefinition, StrategyDocument, StrategyEdge, StrategyLineage, StrategyLogic,
    StrategySource, Tier, Universe,
};
pub use validation::{
    AggregateMetrics, CorrectionMethod, GateCheck, GateOutcome, RegimeAggregate, ValidationGates,
    ValidationKey, ValidationRecord, Verdict, WindowMetrics, WindowResult, WindowStatus,
    VALIDATION_SCHEMA_VERSION,
};
