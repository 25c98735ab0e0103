//! # Research Ingest
//!
//! The ingestion quality filter: turns extracted strategy drafts into
//! catalog records, or archives them with a recorded reason.
//!
//! ## Flow
//! 1. Idempotence check on the source content hash (re-ingesting is a no-op)
//! 2. Rationale inference when the source states no edge
//! 3. Specificity + trust scoring, red-flag detection
//! 4. Decision: reject / archive / queue / accept
//! 5. Similarity check on accept: duplicates block, variants attach lineage

pub mod draft;
pub mod filter;
pub mod promote;
pub mod rationale;
pub mod red_flags;
pub mod scoring;

pub use draft::{DraftEvidence, StrategyDraft};
pub use filter::{IngestError, IngestOutcome, IngestionFilter};
pub use promote::{materialize_proposal, promote_idea};
pub use rationale::{infer_rationale, FactorMatch, FACTOR_CATALOG};
pub use red_flags::detect_red_flags;
pub use scoring::{score_specificity, score_trust};
