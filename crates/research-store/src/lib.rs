//! # Research Store
//!
//! Workspace management and the record store: the single source of truth
//! for every record family in the pipeline.
//!
//! ## Layout
//! ```text
//! <workspace>/
//!   research-kit.yaml            # validated configuration
//!   inbox/                       # files awaiting ingestion
//!   strategies/{state}/          # STRAT-NNN.yaml, moved on transition
//!   validations/STRAT-NNN/{ts}/  # immutable per-validation bundles
//!   learnings/                   # append-only learning records
//!   ideas/                       # IDEA-NNN.yaml
//!   proposals/                   # PROP-NNN.yaml
//!   .state/                      # counters journal, transition log, locks
//!   logs/                        # daily-rotated tracing output
//! ```
//!
//! ## Write Discipline
//! Every write is atomic (temp file + rename). Validation bundles get a
//! sha256 manifest at write time and are verified untouched on read. State
//! transitions are CAS on the current state and logged to
//! `.state/transitions.jsonl`.

pub mod config;
pub mod counters;
pub mod io;
pub mod logging;
pub mod similarity;
pub mod store;
pub mod workspace;

pub use config::{
    IngestionConfig, LogLevel, ResearchConfig, ScoringWeights, SimilarityConfig, SynthesisConfig,
    VerificationConfig, WalkForwardConfig, VALID_CHECKS,
};
pub use counters::CounterJournal;
pub use io::{append_jsonl, read_yaml, write_atomic, write_yaml_atomic};
pub use logging::{init_tracing, TracingGuards};
pub use similarity::{similarity, Fingerprint, MatchKind, SimilarityIndex, SimilarityMatch};
pub use store::{QueryFilter, RecordStore, StoreError};
pub use workspace::{Workspace, CONFIG_FILENAME, WORKSPACE_ENV_VAR};
