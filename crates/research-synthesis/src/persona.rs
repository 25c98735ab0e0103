//! Typed persona dispatch: tagged variants with per-persona schemas.
//!
//! Every analytical persona is a variant of the closed `Persona` set and
//! carries its own request and response types. Requests share the common
//! context block (validation aggregates, regime breakdown, definition) and
//! add the emphasis slice that persona works from; responses deserialize
//! into the variant's declared schema at the provider boundary, so a
//! payload that does not match the schema fails the call. Collected
//! reports are the tagged `PersonaReport` enum.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use research_models::{Persona, StrategyDocument, ValidationRecord};

/// Confidence grade used across persona payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Graded risk call used by the quant-researcher schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Elevated,
    High,
}

// =============================================================================
// Shared context
// =============================================================================

/// Definition summary every persona receives.
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionBrief {
    pub id: String,
    pub name: String,
    pub hypothesis: String,
    pub tier: u8,
    pub universe: Vec<String>,
    pub entry_condition: String,
    pub sizing: String,
    pub max_leverage: f64,
}

/// Aggregate summary every persona receives.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateBrief {
    pub verdict: String,
    pub mean_sharpe: f64,
    pub sharpe_ci_low: f64,
    pub sharpe_ci_high: f64,
    pub consistency: f64,
    pub worst_drawdown: f64,
    pub total_trades: u32,
    pub p_value_adjusted: f64,
    pub family_size: u32,
}

/// One regime-breakdown row.
#[derive(Debug, Clone, Serialize)]
pub struct RegimeRow {
    pub regime: String,
    pub window_count: u32,
    pub mean_sharpe: f64,
}

/// One walk-forward window row.
#[derive(Debug, Clone, Serialize)]
pub struct WindowRow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub sharpe: Option<f64>,
    pub max_drawdown: Option<f64>,
}

/// The context block shared by the whole panel: validation aggregates,
/// regime breakdown, and the definition. Personas never see each other's
/// output, only this block plus their own emphasis slice.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisContext {
    pub definition: DefinitionBrief,
    pub aggregate: Option<AggregateBrief>,
    pub regimes: Vec<RegimeRow>,
}

impl AnalysisContext {
    pub fn build(doc: &StrategyDocument, validation: &ValidationRecord) -> Self {
        let definition = DefinitionBrief {
            id: doc.id.to_string(),
            name: doc.name.clone(),
            hypothesis: doc.hypothesis.summary.clone(),
            tier: doc.definition.tier.number(),
            universe: doc.definition.universe.symbols.clone(),
            entry_condition: doc.definition.entry.condition.clone(),
            sizing: format!("{:?}", doc.definition.position.sizing),
            max_leverage: doc.definition.position.max_leverage,
        };
        let aggregate = validation.aggregate.as_ref().map(|a| AggregateBrief {
            verdict: format!("{:?}", validation.verdict),
            mean_sharpe: a.mean_sharpe,
            sharpe_ci_low: a.sharpe_ci_low,
            sharpe_ci_high: a.sharpe_ci_high,
            consistency: a.consistency,
            worst_drawdown: a.worst_drawdown,
            total_trades: a.total_trades,
            p_value_adjusted: a.p_value_adjusted,
            family_size: a.family_size,
        });
        let regimes = validation
            .aggregate
            .as_ref()
            .map(|a| {
                a.per_regime
                    .iter()
                    .map(|(regime, stats)| RegimeRow {
                        regime: regime.clone(),
                        window_count: stats.window_count,
                        mean_sharpe: stats.mean_sharpe,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            definition,
            aggregate,
            regimes,
        }
    }

    pub fn render(&self) -> String {
        let def = &self.definition;
        let mut out = format!(
            "## Strategy {} - {}\n\nHypothesis: {}\nDefinition: tier {} | universe [{}] | \
             entry: {} | sizing {} (max leverage {})\n\n",
            def.id,
            def.name,
            def.hypothesis,
            def.tier,
            def.universe.join(", "),
            def.entry_condition,
            def.sizing,
            def.max_leverage,
        );
        if let Some(agg) = &self.aggregate {
            out.push_str(&format!(
                "## Validation ({})\n\nmean Sharpe {:.2} (95% CI {:.2}..{:.2}), consistency \
                 {:.2}, worst drawdown {:.1}%, trades {}, adjusted p {:.4} (family {})\n\n",
                agg.verdict,
                agg.mean_sharpe,
                agg.sharpe_ci_low,
                agg.sharpe_ci_high,
                agg.consistency,
                agg.worst_drawdown * 100.0,
                agg.total_trades,
                agg.p_value_adjusted,
                agg.family_size,
            ));
        }
        if !self.regimes.is_empty() {
            out.push_str("## Regime breakdown\n\n");
            for row in &self.regimes {
                out.push_str(&format!(
                    "- {}: {} windows, mean Sharpe {:.2}\n",
                    row.regime, row.window_count, row.mean_sharpe
                ));
            }
            out.push('\n');
        }
        out
    }
}

fn window_rows(validation: &ValidationRecord) -> Vec<WindowRow> {
    validation
        .windows
        .iter()
        .map(|w| WindowRow {
            start: w.start,
            end: w.end,
            sharpe: w.metrics.as_ref().map(|m| m.sharpe),
            max_drawdown: w.metrics.as_ref().map(|m| m.max_drawdown),
        })
        .collect()
}

fn render_windows(rows: &[WindowRow]) -> String {
    let mut out = String::from("## Windows\n\n");
    for row in rows {
        let sharpe = row
            .sharpe
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "error".into());
        out.push_str(&format!("- {} to {}: Sharpe {}\n", row.start, row.end, sharpe));
    }
    out
}

// =============================================================================
// Per-persona requests
// =============================================================================

/// Momentum trader: timing focus, sees the full window sequence.
#[derive(Debug, Clone, Serialize)]
pub struct MomentumTraderRequest {
    pub context: AnalysisContext,
    pub windows: Vec<WindowRow>,
}

/// Risk manager: tail focus, sees per-window drawdowns.
#[derive(Debug, Clone, Serialize)]
pub struct RiskManagerRequest {
    pub context: AnalysisContext,
    pub window_drawdowns: Vec<WindowRow>,
}

/// Quant researcher: statistical focus, sees the raw Sharpe sample and
/// the bootstrap configuration.
#[derive(Debug, Clone, Serialize)]
pub struct QuantResearcherRequest {
    pub context: AnalysisContext,
    pub window_sharpes: Vec<f64>,
    pub bootstrap_resamples: Option<u32>,
}

/// Contrarian: argues the other side, sees the stated edge and risks.
#[derive(Debug, Clone, Serialize)]
pub struct ContrarianRequest {
    pub context: AnalysisContext,
    pub stated_edge: Option<String>,
    pub known_risks: Vec<String>,
}

/// Mad genius: variation mining, sees the inferred factor alignment.
#[derive(Debug, Clone, Serialize)]
pub struct MadGeniusRequest {
    pub context: AnalysisContext,
    pub factor_alignment: Option<String>,
}

// =============================================================================
// Per-persona responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumRead {
    pub assessment: String,
    pub trend_quality: String,
    pub entry_timing_note: String,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRead {
    pub assessment: String,
    /// What breaks the strategy, in order of likelihood.
    pub failure_modes: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalRead {
    pub assessment: String,
    pub sample_adequate: bool,
    pub overfitting_risk: RiskLevel,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContrarianRead {
    pub assessment: String,
    /// The strongest case against the edge.
    pub counter_thesis: String,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantRead {
    pub assessment: String,
    /// Unconventional variations worth filing as ideas.
    pub variations: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub confidence: Confidence,
}

/// One collected persona report, tagged by variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "persona", rename_all = "kebab-case")]
pub enum PersonaReport {
    MomentumTrader(MomentumRead),
    RiskManager(RiskRead),
    QuantResearcher(StatisticalRead),
    Contrarian(ContrarianRead),
    MadGenius(VariantRead),
}

impl PersonaReport {
    pub fn persona(&self) -> Persona {
        match self {
            Self::MomentumTrader(_) => Persona::MomentumTrader,
            Self::RiskManager(_) => Persona::RiskManager,
            Self::QuantResearcher(_) => Persona::QuantResearcher,
            Self::Contrarian(_) => Persona::Contrarian,
            Self::MadGenius(_) => Persona::MadGenius,
        }
    }

    pub fn assessment(&self) -> &str {
        match self {
            Self::MomentumTrader(r) => &r.assessment,
            Self::RiskManager(r) => &r.assessment,
            Self::QuantResearcher(r) => &r.assessment,
            Self::Contrarian(r) => &r.assessment,
            Self::MadGenius(r) => &r.assessment,
        }
    }

    pub fn concerns(&self) -> &[String] {
        match self {
            Self::MomentumTrader(r) => &r.concerns,
            Self::RiskManager(r) => &r.concerns,
            Self::QuantResearcher(r) => &r.concerns,
            Self::Contrarian(r) => &r.concerns,
            Self::MadGenius(r) => &r.concerns,
        }
    }

    pub fn actions(&self) -> &[String] {
        match self {
            Self::MomentumTrader(r) => &r.actions,
            Self::RiskManager(r) => &r.actions,
            Self::QuantResearcher(r) => &r.actions,
            Self::Contrarian(r) => &r.actions,
            Self::MadGenius(r) => &r.actions,
        }
    }

    pub fn confidence(&self) -> Confidence {
        match self {
            Self::MomentumTrader(r) => r.confidence,
            Self::RiskManager(r) => r.confidence,
            Self::QuantResearcher(r) => r.confidence,
            Self::Contrarian(r) => r.confidence,
            Self::MadGenius(r) => r.confidence,
        }
    }

    /// Variant-specific lines surfaced to the synthesizer.
    pub fn detail_lines(&self) -> Vec<String> {
        match self {
            Self::MomentumTrader(r) => vec![
                format!("trend quality: {}", r.trend_quality),
                format!("entry timing: {}", r.entry_timing_note),
            ],
            Self::RiskManager(r) => r
                .failure_modes
                .iter()
                .map(|m| format!("failure mode: {m}"))
                .collect(),
            Self::QuantResearcher(r) => vec![
                format!("sample adequate: {}", r.sample_adequate),
                format!("overfitting risk: {:?}", r.overfitting_risk).to_lowercase(),
            ],
            Self::Contrarian(r) => vec![format!("counter-thesis: {}", r.counter_thesis)],
            Self::MadGenius(r) => r
                .variations
                .iter()
                .map(|v| format!("variation: {v}"))
                .collect(),
        }
    }
}

impl From<MomentumRead> for PersonaReport {
    fn from(read: MomentumRead) -> Self {
        Self::MomentumTrader(read)
    }
}
impl From<RiskRead> for PersonaReport {
    fn from(read: RiskRead) -> Self {
        Self::RiskManager(read)
    }
}
impl From<StatisticalRead> for PersonaReport {
    fn from(read: StatisticalRead) -> Self {
        Self::QuantResearcher(read)
    }
}
impl From<ContrarianRead> for PersonaReport {
    fn from(read: ContrarianRead) -> Self {
        Self::Contrarian(read)
    }
}
impl From<VariantRead> for PersonaReport {
    fn from(read: VariantRead) -> Self {
        Self::MadGenius(read)
    }
}

// =============================================================================
// Persona specs: the tagged variants behind generic dispatch
// =============================================================================

/// One persona's declared contract: its variant, request type, response
/// schema, and prompts. `dispatch_persona::<P>` is generic over this.
pub trait PersonaSpec {
    const PERSONA: Persona;
    type Request: Serialize + Send + Sync;
    type Response: serde::de::DeserializeOwned + Into<PersonaReport>;

    fn system_prompt() -> String;
    fn build_request(doc: &StrategyDocument, validation: &ValidationRecord) -> Self::Request;
    fn render_request(request: &Self::Request) -> String;
}

fn system_preamble(persona: Persona, emphasis: &str, schema: &str) -> String {
    format!(
        "You are the {persona} persona on a strategy research desk.\n{emphasis}\n\
         Respond with strict JSON only:\n{schema}"
    )
}

/// Marker types implementing `PersonaSpec`, one per variant.
pub mod specs {
    use super::*;

    pub struct MomentumTrader;

    impl PersonaSpec for MomentumTrader {
        const PERSONA: Persona = Persona::MomentumTrader;
        type Request = MomentumTraderRequest;
        type Response = MomentumRead;

        fn system_prompt() -> String {
            system_preamble(
                Self::PERSONA,
                "Judge the entry/exit timing and trend capture. Would you trade this book?",
                r#"{"assessment": str, "trend_quality": str, "entry_timing_note": str,
 "concerns": [str], "actions": [str], "confidence": "high|medium|low"}"#,
            )
        }

        fn build_request(doc: &StrategyDocument, validation: &ValidationRecord) -> Self::Request {
            MomentumTraderRequest {
                context: AnalysisContext::build(doc, validation),
                windows: window_rows(validation),
            }
        }

        fn render_request(request: &Self::Request) -> String {
            format!(
                "{}{}",
                request.context.render(),
                render_windows(&request.windows)
            )
        }
    }

    pub struct RiskManager;

    impl PersonaSpec for RiskManager {
        const PERSONA: Persona = Persona::RiskManager;
        type Request = RiskManagerRequest;
        type Response = RiskRead;

        fn system_prompt() -> String {
            system_preamble(
                Self::PERSONA,
                "Judge drawdown, tail exposure, leverage, and regime fragility. What breaks it?",
                r#"{"assessment": str, "failure_modes": [str], "concerns": [str],
 "actions": [str], "confidence": "high|medium|low"}"#,
            )
        }

        fn build_request(doc: &StrategyDocument, validation: &ValidationRecord) -> Self::Request {
            RiskManagerRequest {
                context: AnalysisContext::build(doc, validation),
                window_drawdowns: window_rows(validation),
            }
        }

        fn render_request(request: &Self::Request) -> String {
            let mut out = request.context.render();
            out.push_str("## Per-window drawdowns\n\n");
            for row in &request.window_drawdowns {
                let dd = row
                    .max_drawdown
                    .map(|d| format!("{:.1}%", d * 100.0))
                    .unwrap_or_else(|| "error".into());
                out.push_str(&format!("- {} to {}: {}\n", row.start, row.end, dd));
            }
            out
        }
    }

    pub struct QuantResearcher;

    impl PersonaSpec for QuantResearcher {
        const PERSONA: Persona = Persona::QuantResearcher;
        type Request = QuantResearcherRequest;
        type Response = StatisticalRead;

        fn system_prompt() -> String {
            system_preamble(
                Self::PERSONA,
                "Judge statistical strength: sample size, multiple testing, effect size, decay.",
                r#"{"assessment": str, "sample_adequate": bool,
 "overfitting_risk": "low|elevated|high", "concerns": [str], "actions": [str],
 "confidence": "high|medium|low"}"#,
            )
        }

        fn build_request(doc: &StrategyDocument, validation: &ValidationRecord) -> Self::Request {
            QuantResearcherRequest {
                context: AnalysisContext::build(doc, validation),
                window_sharpes: validation
                    .windows
                    .iter()
                    .filter_map(|w| w.metrics.as_ref().map(|m| m.sharpe))
                    .collect(),
                bootstrap_resamples: validation
                    .aggregate
                    .as_ref()
                    .map(|a| a.bootstrap_resamples),
            }
        }

        fn render_request(request: &Self::Request) -> String {
            let sharpes: Vec<String> = request
                .window_sharpes
                .iter()
                .map(|s| format!("{s:.2}"))
                .collect();
            format!(
                "{}## Sharpe sample\n\n[{}] ({} bootstrap resamples)\n",
                request.context.render(),
                sharpes.join(", "),
                request
                    .bootstrap_resamples
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "unknown".into()),
            )
        }
    }

    pub struct Contrarian;

    impl PersonaSpec for Contrarian {
        const PERSONA: Persona = Persona::Contrarian;
        type Request = ContrarianRequest;
        type Response = ContrarianRead;

        fn system_prompt() -> String {
            system_preamble(
                Self::PERSONA,
                "Argue against this strategy. Who is on the other side, and why are they wrong to be?",
                r#"{"assessment": str, "counter_thesis": str, "concerns": [str],
 "actions": [str], "confidence": "high|medium|low"}"#,
            )
        }

        fn build_request(doc: &StrategyDocument, validation: &ValidationRecord) -> Self::Request {
            ContrarianRequest {
                context: AnalysisContext::build(doc, validation),
                stated_edge: doc.edge.as_ref().map(|e| e.why_exists.clone()),
                known_risks: doc.definition.risks.clone(),
            }
        }

        fn render_request(request: &Self::Request) -> String {
            let mut out = request.context.render();
            out.push_str(&format!(
                "## Stated edge\n\n{}\n\n## Known risks\n\n{}\n",
                request.stated_edge.as_deref().unwrap_or("none stated"),
                if request.known_risks.is_empty() {
                    "none listed".to_string()
                } else {
                    request.known_risks.join("; ")
                }
            ));
            out
        }
    }

    pub struct MadGenius;

    impl PersonaSpec for MadGenius {
        const PERSONA: Persona = Persona::MadGenius;
        type Request = MadGeniusRequest;
        type Response = VariantRead;

        fn system_prompt() -> String {
            system_preamble(
                Self::PERSONA,
                "Propose unconventional variations and combinations others would miss.",
                r#"{"assessment": str, "variations": [str], "concerns": [str],
 "actions": [str], "confidence": "high|medium|low"}"#,
            )
        }

        fn build_request(doc: &StrategyDocument, validation: &ValidationRecord) -> Self::Request {
            MadGeniusRequest {
                context: AnalysisContext::build(doc, validation),
                factor_alignment: doc
                    .edge_provenance
                    .as_ref()
                    .and_then(|p| p.factor_alignment.clone()),
            }
        }

        fn render_request(request: &Self::Request) -> String {
            format!(
                "{}## Factor alignment\n\n{}\n",
                request.context.render(),
                request.factor_alignment.as_deref().unwrap_or("unaligned"),
            )
        }
    }
}

// =============================================================================
// Collected responses and the synthesizer schema
// =============================================================================

/// Outcome of one persona dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaStatus {
    Ok,
    /// Timed out or failed; does not block synthesis if quorum holds.
    Missing,
    /// Returned a payload that failed its variant's schema.
    Invalid,
}

/// One persona's response as collected by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaResponse {
    pub persona: Persona,
    pub status: PersonaStatus,
    pub report: Option<PersonaReport>,
}

/// Synthesizer's verdict field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SynthesisStatus {
    Validated,
    Conditional,
    Invalidated,
}

/// A follow-up the synthesizer proposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisAction {
    /// combination | enhancement | data_acquisition | refined_hypothesis | idea
    pub kind: String,
    pub title: String,
    pub rationale: String,
    #[serde(default)]
    pub expected_benefit: Option<String>,
}

/// Synthesizer output schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub status: SynthesisStatus,
    #[serde(default)]
    pub consensus: Vec<String>,
    #[serde(default)]
    pub disagreements: Vec<String>,
    #[serde(default)]
    pub actions: Vec<SynthesisAction>,
}

/// Synthesizer system prompt.
pub fn synthesizer_system_prompt() -> String {
    "You are the synthesis director. You receive the persona panel's structured \
     assessments and deliver an independent final judgment.\n\
     Respond with strict JSON only:\n\
     {\"status\": \"VALIDATED|CONDITIONAL|INVALIDATED\", \"consensus\": [str], \
     \"disagreements\": [str], \"actions\": [{\"kind\": \
     \"combination|enhancement|data_acquisition|refined_hypothesis|idea\", \
     \"title\": str, \"rationale\": str, \"expected_benefit\": str}]}"
        .to_string()
}

/// Synthesizer input. Responses must already be sorted by persona so
/// synthesis is invariant to completion order.
pub fn synthesizer_prompt(context: &AnalysisContext, responses: &[PersonaResponse]) -> String {
    let mut out = context.render();
    out.push_str("\n## Panel responses\n\n");
    for response in responses {
        match (&response.status, &response.report) {
            (PersonaStatus::Ok, Some(report)) => {
                out.push_str(&format!(
                    "### {}\n{}\n",
                    response.persona,
                    report.assessment()
                ));
                for line in report.detail_lines() {
                    out.push_str(&format!("{line}\n"));
                }
                out.push_str(&format!(
                    "concerns: {}\nactions: {}\nconfidence: {:?}\n\n",
                    report.concerns().join("; "),
                    report.actions().join("; "),
                    report.confidence(),
                ));
            }
            _ => {
                out.push_str(&format!("### {}\nstatus: missing\n\n", response.persona));
            }
        }
    }
    out
}
