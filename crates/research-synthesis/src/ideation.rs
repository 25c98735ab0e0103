//! Ideation mode: generation personas propose ideas through a quality gate.
//!
//! Three generation personas (edge-hunter, macro-strategist,
//! quant-archaeologist) each return a list of raw ideas. The gate drops
//! incomplete ideas and ideas requiring unavailable data, deduplicates by
//! name, and caps the accepted count.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use research_models::IdeationPersona;
use research_store::SynthesisConfig;

use crate::provider::{AgentProvider, AgentRole, AgentTask};

/// One idea as returned by a generation persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIdea {
    pub name: String,
    pub thesis: String,
    pub hypothesis: String,
    #[serde(default)]
    pub entry_logic: String,
    #[serde(default)]
    pub exit_logic: String,
    #[serde(default)]
    pub risk_management: String,
    #[serde(default)]
    pub data_requirements: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: String,
}

fn default_confidence() -> String {
    "medium".into()
}

#[derive(Debug, Deserialize)]
struct IdeationPayload {
    #[serde(default)]
    ideas: Vec<RawIdea>,
}

/// Quality gate over generated ideas.
pub struct IdeationGate {
    /// Dataset ids the workspace can actually serve.
    pub available_data: BTreeSet<String>,
    pub max_ideas: usize,
}

impl IdeationGate {
    /// Filter ideas: complete fields, available data, unique names, capped.
    pub fn filter(&self, ideas: Vec<RawIdea>) -> (Vec<RawIdea>, Vec<String>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut seen_names = BTreeSet::new();

        for idea in ideas {
            if accepted.len() >= self.max_ideas {
                rejected.push(format!("{}: idea cap reached", idea.name));
                continue;
            }
            if idea.name.is_empty()
                || idea.thesis.is_empty()
                || idea.hypothesis.is_empty()
                || idea.entry_logic.is_empty()
                || idea.exit_logic.is_empty()
            {
                rejected.push(format!("{}: incomplete idea", idea.name));
                continue;
            }
            if !seen_names.insert(idea.name.to_lowercase()) {
                rejected.push(format!("{}: duplicate name", idea.name));
                continue;
            }
            let unavailable: Vec<&String> = idea
                .data_requirements
                .iter()
                .filter(|d| !self.available_data.contains(*d))
                .collect();
            if !unavailable.is_empty() {
                rejected.push(format!(
                    "{}: requires unavailable data ({})",
                    idea.name,
                    unavailable
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
                continue;
            }
            accepted.push(idea);
        }

        (accepted, rejected)
    }
}

fn ideation_emphasis(persona: IdeationPersona) -> &'static str {
    match persona {
        IdeationPersona::EdgeHunter => {
            "Hunt for specific, testable edges in entry types and trade frequency."
        }
        IdeationPersona::MacroStrategist => "Work from cross-asset and regime patterns.",
        IdeationPersona::QuantArchaeologist => {
            "Mine failed and invalidated strategies for salvageable pieces."
        }
    }
}

fn ideation_system_prompt(persona: IdeationPersona) -> String {
    format!(
        "You are the {persona} ideation persona.\n{}\n\
         Respond with strict JSON only:\n\
         {{\"ideas\": [{{\"name\": str, \"thesis\": str, \"hypothesis\": str, \
         \"entry_logic\": str, \"exit_logic\": str, \"risk_management\": str, \
         \"data_requirements\": [str], \"confidence\": \"high|medium|low\"}}]}}",
        ideation_emphasis(persona)
    )
}

/// Run the ideation bench and pool the raw ideas. Persona failures are
/// tolerated; an empty pool is a valid (if disappointing) outcome.
pub async fn run_ideation(
    provider: Arc<dyn AgentProvider>,
    config: &SynthesisConfig,
    workspace_context: &str,
) -> Vec<RawIdea> {
    let mut all = Vec::new();
    for persona in IdeationPersona::ALL {
        let task = AgentTask {
            role: AgentRole::Ideation(persona),
            system_prompt: ideation_system_prompt(persona),
            user_prompt: workspace_context.to_string(),
            max_tokens: 4000,
        };
        let deadline = Duration::from_secs(config.persona_timeout_secs);
        match timeout(deadline, provider.dispatch(&task)).await {
            Ok(Ok(value)) => match serde_json::from_value::<IdeationPayload>(value) {
                Ok(payload) => {
                    tracing::info!(
                        persona = %persona,
                        ideas = payload.ideas.len(),
                        "ideation persona done"
                    );
                    all.extend(payload.ideas);
                }
                Err(e) => tracing::warn!(persona = %persona, error = %e, "ideation payload invalid"),
            },
            Ok(Err(e)) => tracing::warn!(persona = %persona, error = %e, "ideation persona failed"),
            Err(_) => tracing::warn!(persona = %persona, "ideation persona timed out"),
        }
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idea(name: &str, data: &[&str]) -> RawIdea {
        RawIdea {
            name: name.into(),
            thesis: "t".into(),
            hypothesis: "h".into(),
            entry_logic: "entry".into(),
            exit_logic: "exit".into(),
            risk_management: "1x, equal weight".into(),
            data_requirements: data.iter().map(|s| s.to_string()).collect(),
            confidence: "medium".into(),
        }
    }

    fn gate() -> IdeationGate {
        IdeationGate {
            available_data: ["us-equity-daily".to_string(), "vol-index".to_string()]
                .into_iter()
                .collect(),
            max_ideas: 3,
        }
    }

    #[test]
    fn test_complete_available_ideas_pass() {
        let (accepted, rejected) = gate().filter(vec![
            idea("a", &["us-equity-daily"]),
            idea("b", &["vol-index"]),
        ]);
        assert_eq!(accepted.len(), 2);
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_unavailable_data_rejected() {
        let (accepted, rejected) = gate().filter(vec![idea("sat", &["satellite-imagery"])]);
        assert!(accepted.is_empty());
        assert!(rejected[0].contains("unavailable data"));
    }

    #[test]
    fn test_incomplete_idea_rejected() {
        let mut incomplete = idea("x", &[]);
        incomplete.exit_logic = String::new();
        let (accepted, rejected) = gate().filter(vec![incomplete]);
        assert!(accepted.is_empty());
        assert!(rejected[0].contains("incomplete"));
    }

    #[test]
    fn test_cap_and_dedup() {
        let ideas = vec![
            idea("a", &[]),
            idea("A", &[]),
            idea("b", &[]),
            idea("c", &[]),
            idea("d", &[]),
        ];
        let (accepted, rejected) = gate().filter(ideas);
        assert_eq!(accepted.len(), 3);
        assert_eq!(rejected.len(), 2);
        assert!(rejected.iter().any(|r| r.contains("duplicate")));
        assert!(rejected.iter().any(|r| r.contains("cap")));
    }
}
