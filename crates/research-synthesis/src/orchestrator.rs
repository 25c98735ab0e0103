//! Parallel persona dispatch with quorum and order-commutative synthesis.
//!
//! Each roster entry is a `Persona` variant routed through its
//! `PersonaSpec` via the generic `dispatch_persona` entry point; the
//! orchestrator only fans the calls out, enforces quorum, and feeds the
//! sorted reports to the synthesizer.

use std::sync::Arc;

use tokio::time::{timeout, Duration};

use research_models::{Persona, StrategyDocument, ValidationRecord};
use research_store::SynthesisConfig;

use crate::persona::{
    specs, synthesizer_prompt, synthesizer_system_prompt, AnalysisContext, PersonaResponse,
    PersonaSpec, PersonaStatus, SynthesisOutput,
};
use crate::provider::{dispatch_persona, AgentProvider, AgentRole, AgentTask, DispatchError};
use crate::rate_limit::TokenBucket;

/// Orchestration failures.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("quorum not met: {responded} of {required} personas responded")]
    QuorumNotMet { responded: usize, required: usize },

    #[error("synthesizer failed: {0}")]
    SynthesizerFailed(String),
}

/// Result of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Persona responses in persona order, independent of completion order.
    pub responses: Vec<PersonaResponse>,
    pub synthesis: SynthesisOutput,
}

pub struct PersonaOrchestrator {
    provider: Arc<dyn AgentProvider>,
    limiter: TokenBucket,
    config: SynthesisConfig,
}

/// Run one panelist through its typed spec and fold the outcome into a
/// collected response.
async fn run_spec<P: PersonaSpec>(
    provider: &dyn AgentProvider,
    doc: &StrategyDocument,
    validation: &ValidationRecord,
    deadline: Duration,
) -> PersonaResponse {
    match dispatch_persona::<P>(provider, doc, validation, deadline).await {
        Ok(response) => PersonaResponse {
            persona: P::PERSONA,
            status: PersonaStatus::Ok,
            report: Some(response.into()),
        },
        Err(DispatchError::Schema(e)) => {
            tracing::warn!(persona = %P::PERSONA, error = %e, "persona payload invalid");
            PersonaResponse {
                persona: P::PERSONA,
                status: PersonaStatus::Invalid,
                report: None,
            }
        }
        Err(e) => {
            tracing::warn!(persona = %P::PERSONA, error = %e, "persona dispatch failed");
            PersonaResponse {
                persona: P::PERSONA,
                status: PersonaStatus::Missing,
                report: None,
            }
        }
    }
}

/// Enum-to-spec routing: the one place a `Persona` value meets its types.
async fn run_panelist(
    provider: Arc<dyn AgentProvider>,
    persona: Persona,
    doc: Arc<StrategyDocument>,
    validation: Arc<ValidationRecord>,
    deadline: Duration,
) -> PersonaResponse {
    match persona {
        Persona::MomentumTrader => {
            run_spec::<specs::MomentumTrader>(&*provider, &doc, &validation, deadline).await
        }
        Persona::RiskManager => {
            run_spec::<specs::RiskManager>(&*provider, &doc, &validation, deadline).await
        }
        Persona::QuantResearcher => {
            run_spec::<specs::QuantResearcher>(&*provider, &doc, &validation, deadline).await
        }
        Persona::Contrarian => {
            run_spec::<specs::Contrarian>(&*provider, &doc, &validation, deadline).await
        }
        Persona::MadGenius => {
            run_spec::<specs::MadGenius>(&*provider, &doc, &validation, deadline).await
        }
    }
}

impl PersonaOrchestrator {
    pub fn new(provider: Arc<dyn AgentProvider>, config: SynthesisConfig) -> Self {
        let limiter = TokenBucket::per_minute(config.rate_limit_per_minute);
        Self {
            provider,
            limiter,
            config,
        }
    }

    /// Run the full panel plus synthesizer for one validation.
    pub async fn analyze(
        &self,
        doc: &StrategyDocument,
        validation: &ValidationRecord,
    ) -> Result<AnalysisResult, OrchestratorError> {
        let deadline = Duration::from_secs(self.config.persona_timeout_secs);
        let doc = Arc::new(doc.clone());
        let validation = Arc::new(validation.clone());

        let mut handles = Vec::new();
        for &persona in &self.config.personas {
            // Rate-limit before spawning so the burst respects the bucket.
            self.limiter.acquire().await;
            handles.push(tokio::spawn(run_panelist(
                Arc::clone(&self.provider),
                persona,
                Arc::clone(&doc),
                Arc::clone(&validation),
                deadline,
            )));
        }

        let mut responses = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(response) = handle.await {
                responses.push(response);
            }
        }

        // Persona order, not completion order: synthesis must be
        // commutative in its inputs.
        responses.sort_by_key(|r| r.persona);

        let responded = responses
            .iter()
            .filter(|r| r.status == PersonaStatus::Ok)
            .count();
        if responded < self.config.quorum {
            return Err(OrchestratorError::QuorumNotMet {
                responded,
                required: self.config.quorum,
            });
        }

        self.limiter.acquire().await;
        let context = AnalysisContext::build(&doc, &validation);
        let synth_task = AgentTask {
            role: AgentRole::Synthesizer,
            system_prompt: synthesizer_system_prompt(),
            user_prompt: synthesizer_prompt(&context, &responses),
            max_tokens: 8000,
        };
        let synthesis = match timeout(deadline, self.provider.dispatch(&synth_task)).await {
            Ok(Ok(value)) => serde_json::from_value::<SynthesisOutput>(value)
                .map_err(|e| OrchestratorError::SynthesizerFailed(e.to_string()))?,
            Ok(Err(e)) => return Err(OrchestratorError::SynthesizerFailed(e.to_string())),
            Err(_) => return Err(OrchestratorError::SynthesizerFailed("timeout".into())),
        };

        tracing::info!(
            id = %doc.id,
            responded,
            status = ?synthesis.status,
            actions = synthesis.actions.len(),
            "analysis complete"
        );

        Ok(AnalysisResult {
            responses,
            synthesis,
        })
    }
}
