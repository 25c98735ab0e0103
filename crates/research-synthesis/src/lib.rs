//! # Research Synthesis
//!
//! The persona orchestrator (C10) and proposal/idea outputs (C11 inputs).
//!
//! Personas are tagged variants of a closed set, each carrying its own
//! request and response types; `dispatch_persona::<P>` is the generic
//! typed entry point and schema validation happens at that boundary. The
//! panel runs in parallel, each call context-isolated under its own
//! deadline; a persona that times out is recorded `missing` and synthesis
//! proceeds on quorum. The synthesizer is commutative in response order:
//! inputs are sorted by persona before it runs.

pub mod ideation;
pub mod orchestrator;
pub mod outputs;
pub mod persona;
pub mod provider;
pub mod rate_limit;

pub use ideation::{run_ideation, IdeationGate, RawIdea};
pub use orchestrator::{AnalysisResult, OrchestratorError, PersonaOrchestrator};
pub use outputs::{apply_synthesis, AppliedOutputs};
pub use persona::{
    specs, synthesizer_prompt, synthesizer_system_prompt, AnalysisContext, Confidence,
    ContrarianRead, MomentumRead, PersonaReport, PersonaResponse, PersonaSpec, PersonaStatus,
    RiskLevel, RiskRead, StatisticalRead, SynthesisAction, SynthesisOutput, SynthesisStatus,
    VariantRead,
};
pub use provider::{dispatch_persona, AgentProvider, AgentRole, AgentTask, DispatchError};
pub use rate_limit::TokenBucket;
