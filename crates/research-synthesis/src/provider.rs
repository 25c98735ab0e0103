//! LLM agent provider seam and the generic typed dispatch entry point.
//!
//! Tasks are fully context-isolated: each call carries everything the
//! persona may see, and no persona sees another's output. The provider
//! returns raw JSON; `dispatch_persona::<P>` deserializes it into the
//! persona's declared response type, so schema validation happens at the
//! boundary and a payload that does not match fails the call.

use async_trait::async_trait;
use tokio::time::{timeout, Duration};

use research_models::{IdeationPersona, Persona, StrategyDocument, ValidationRecord};

use crate::persona::PersonaSpec;

/// Who an agent call runs as. Routing and logging key off this, never a
/// free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Analysis(Persona),
    Ideation(IdeationPersona),
    Synthesizer,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analysis(persona) => write!(f, "{persona}"),
            Self::Ideation(persona) => write!(f, "{persona}"),
            Self::Synthesizer => f.write_str("synthesizer"),
        }
    }
}

/// One isolated agent call.
#[derive(Debug, Clone)]
pub struct AgentTask {
    pub role: AgentRole,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
}

/// Provider of structured agent completions.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    /// Run one task and return its JSON payload. Implementations must
    /// return an error for payloads that are not valid JSON.
    async fn dispatch(&self, task: &AgentTask) -> anyhow::Result<serde_json::Value>;
}

/// One dispatch's failure modes.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("deadline elapsed")]
    Timeout,

    #[error("provider failed: {0}")]
    Provider(String),

    #[error("payload failed the persona schema: {0}")]
    Schema(String),
}

/// Generic typed dispatch: build `P`'s request from the record pair, run
/// the call under a deadline, and validate the payload against `P`'s
/// response schema.
pub async fn dispatch_persona<P: PersonaSpec>(
    provider: &dyn AgentProvider,
    doc: &StrategyDocument,
    validation: &ValidationRecord,
    deadline: Duration,
) -> Result<P::Response, DispatchError> {
    let request = P::build_request(doc, validation);
    let task = AgentTask {
        role: AgentRole::Analysis(P::PERSONA),
        system_prompt: P::system_prompt(),
        user_prompt: P::render_request(&request),
        max_tokens: 4000,
    };
    match timeout(deadline, provider.dispatch(&task)).await {
        Ok(Ok(value)) => serde_json::from_value::<P::Response>(value)
            .map_err(|e| DispatchError::Schema(e.to_string())),
        Ok(Err(e)) => Err(DispatchError::Provider(e.to_string())),
        Err(_) => Err(DispatchError::Timeout),
    }
}
