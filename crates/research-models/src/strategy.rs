//! Strategy record: provenance, hypothesis, and the declarative definition.
//!
//! The definition subtree is the testable configuration: it is normalized
//! (unordered sets sorted and deduplicated) and content-addressed into
//! `definition_hash`. Metadata mutables (state, quality, provenance notes)
//! live outside the subtree and never move the hash.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::{hash_canonical, ContentHash};
use crate::ids::StrategyId;
use crate::ingestion::IngestionQuality;
use crate::state::StrategyState;

// =============================================================================
// Enums
// =============================================================================

/// Generation tier of the strategy definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Known archetype, deterministic template expansion.
    Templated,
    /// Expressed in the declarative indicator DSL.
    Composed,
    /// Free-form code; always routed through human review.
    Custom,
}

impl Tier {
    pub fn number(&self) -> u8 {
        match self {
            Self::Templated => 1,
            Self::Composed => 2,
            Self::Custom => 3,
        }
    }
}

/// Where a strategy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Academic,
    Podcast,
    Blog,
    Practitioner,
    Personal,
}

/// Author's verifiable track record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorTrackRecord {
    VerifiedFundManager,
    Academic,
    RetailVerified,
    RetailUnverified,
    Unknown,
}

/// Relationship of a derived strategy to its parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageRelationship {
    Variant,
    Combination,
    Refinement,
    Reversal,
}

/// Category of the claimed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCategory {
    Structural,
    Behavioral,
    Informational,
    RiskPremium,
}

/// How the edge rationale was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    SourceStated,
    SourceEnhanced,
    Inferred,
    Unknown,
}

/// Confidence in the edge rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceConfidence {
    Low,
    Medium,
    High,
}

/// Entry signal family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Technical,
    Statistical,
    EventDriven,
    Fundamental,
    Compound,
}

/// Exit path family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    SignalReversal,
    TimeBased,
    StopLoss,
    TrailingStop,
    TakeProfit,
    VolatilityExit,
}

/// Position sizing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    EqualWeight,
    FixedFractional,
    VolatilityTarget,
    RiskParity,
}

/// Tier-1 strategy archetypes with deterministic templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    MomentumRotation,
    MeanReversion,
    TrendFollowing,
    DualMomentum,
    Breakout,
    DividendCapture,
}

/// Data registry tier for a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataTier {
    Native,
    Marketplace,
    Custom,
}

// =============================================================================
// Provenance
// =============================================================================

/// Claimed performance lifted from the source material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimedPerformance {
    pub sharpe: Option<f64>,
    pub cagr: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub sample_period: Option<String>,
    pub out_of_sample: Option<bool>,
}

/// Credibility assessment of the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCredibility {
    pub source_type: SourceType,
    pub author_track_record: AuthorTrackRecord,
    /// Does the author actually trade this?
    pub author_skin_in_game: bool,
    /// Known conflicts (selling courses, signals, newsletters).
    pub author_conflicts: Option<String>,
    pub claimed: Option<ClaimedPerformance>,
}

/// Source reference for a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySource {
    /// Where this came from (title, citation, filename).
    pub reference: String,
    pub url: Option<String>,
    /// Key excerpt describing the strategy.
    pub excerpt: String,
    /// SHA-256 of the source content; ingestion idempotence key.
    pub content_hash: ContentHash,
    pub extracted_at: DateTime<Utc>,
    pub credibility: Option<SourceCredibility>,
}

/// Lineage for derived strategies. Parents must exist; the graph is a DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyLineage {
    pub parents: Vec<StrategyId>,
    pub relationship: LineageRelationship,
    pub notes: Option<String>,
}

// =============================================================================
// Edge
// =============================================================================

/// The "why" framework behind the strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyEdge {
    /// What drives returns.
    pub mechanism: String,
    pub category: EdgeCategory,
    /// Economic rationale.
    pub why_exists: String,
    /// Who is on the other side.
    pub counterparty: String,
    /// Why it has not been arbitraged away.
    pub why_persists: String,
    /// When and why the edge should stop working.
    pub decay_conditions: String,
    pub capacity_estimate: Option<String>,
}

/// Provenance of the edge rationale. Feeds trust calibration, never gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeProvenance {
    pub source: ProvenanceSource,
    pub confidence: ProvenanceConfidence,
    /// Which documented factor this aligns with, if any.
    pub factor_alignment: Option<String>,
    pub research_notes: Option<String>,
}

// =============================================================================
// Definition subtree
// =============================================================================

/// Trading universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Universe {
    /// Static symbols; empty for filtered universes.
    pub symbols: Vec<String>,
    /// Base universe for filtered selection (e.g. "sp500").
    pub base: Option<String>,
    /// Filter criteria, one expression per entry.
    pub criteria: Vec<String>,
    /// Membership is point-in-time (survivorship-safe).
    pub point_in_time: bool,
}

/// Reference to an indicator with its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorRef {
    pub name: String,
    pub params: BTreeMap<String, f64>,
}

/// Entry logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub kind: EntryKind,
    /// Human-readable rule; for composed strategies this is the DSL source.
    pub condition: String,
    pub indicators: Vec<IndicatorRef>,
    pub filters: Vec<String>,
}

/// One exit path. Paths evaluate first-triggered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitPath {
    pub name: String,
    pub kind: ExitKind,
    pub params: BTreeMap<String, f64>,
    pub condition: Option<String>,
}

/// Exit logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exit {
    pub paths: Vec<ExitPath>,
}

/// Position structure and sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub sizing: SizingMethod,
    pub sizing_params: BTreeMap<String, f64>,
    /// Declared leverage ceiling; verification enforces it.
    pub max_leverage: f64,
    pub max_positions: Option<u32>,
    pub max_position_pct: Option<f64>,
}

/// In-flight position management rule (rebalance, hedge, roll).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementRule {
    pub name: String,
    pub trigger: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionManagement {
    pub enabled: bool,
    pub rules: Vec<ManagementRule>,
}

/// Mode of a regime-adaptive strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeMode {
    pub name: String,
    /// When the mode is active, stated over the detection indicator.
    pub condition: String,
    /// "trade" or "flat".
    pub action: String,
}

/// Regime-adaptive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeAdaptive {
    pub detection_method: String,
    pub lookback_days: u32,
    pub modes: Vec<RegimeMode>,
}

/// A data requirement resolved against the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequirement {
    /// Registry id, e.g. "us-equity-daily".
    pub id: String,
    pub tier: DataTier,
    pub fields: Vec<String>,
}

/// Executable logic of the definition; decides the generation tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyLogic {
    /// Tier 1: known archetype, parameters in `definition.parameters`.
    Template { archetype: Archetype },
    /// Tier 2: entry/exit expressed in the indicator DSL.
    Composed { entry_expr: String, exit_expr: String },
    /// Tier 3: free-form code body; requires human review before execution.
    Custom { code: String },
}

impl StrategyLogic {
    pub fn tier(&self) -> Tier {
        match self {
            Self::Template { .. } => Tier::Templated,
            Self::Composed { .. } => Tier::Composed,
            Self::Custom { .. } => Tier::Custom,
        }
    }
}

/// The declarative, testable configuration of a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub tier: Tier,
    pub logic: StrategyLogic,
    pub universe: Universe,
    pub entry: Entry,
    pub position: Position,
    pub exit: Exit,
    #[serde(default)]
    pub position_management: PositionManagement,
    pub regimes: Option<RegimeAdaptive>,
    pub data_requirements: Vec<DataRequirement>,
    /// Named tunable parameters (lookbacks, thresholds).
    pub parameters: BTreeMap<String, f64>,
    pub assumptions: Vec<String>,
    pub risks: Vec<String>,
}

impl StrategyDefinition {
    /// Normalize unordered sets so semantically identical definitions hash
    /// identically: symbols, criteria, filters, fields, assumptions and risks
    /// are sorted and deduplicated; indicators sort by name.
    pub fn normalized(&self) -> StrategyDefinition {
        fn sorted_dedup(mut v: Vec<String>) -> Vec<String> {
            v.sort();
            v.dedup();
            v
        }

        let mut def = self.clone();
        def.universe.symbols = sorted_dedup(def.universe.symbols);
        def.universe.criteria = sorted_dedup(def.universe.criteria);
        def.entry.filters = sorted_dedup(def.entry.filters);
        def.entry.indicators.sort_by(|a, b| a.name.cmp(&b.name));
        def.assumptions = sorted_dedup(def.assumptions);
        def.risks = sorted_dedup(def.risks);
        for req in &mut def.data_requirements {
            req.fields = sorted_dedup(std::mem::take(&mut req.fields));
        }
        def.data_requirements.sort_by(|a, b| a.id.cmp(&b.id));
        def
    }

    /// Content hash of the normalized definition.
    ///
    /// JSON refuses non-finite floats; ingestion rejects such parameters, so
    /// the Debug fallback only guards against records built outside the
    /// pipeline. Both branches are deterministic.
    pub fn definition_hash(&self) -> ContentHash {
        let normalized = self.normalized();
        match hash_canonical(&normalized) {
            Ok(hash) => hash,
            Err(_) => crate::canonical::sha256_hex(format!("{normalized:?}").as_bytes()),
        }
    }

    /// Structural consistency between `tier` and `logic`.
    pub fn tier_consistent(&self) -> bool {
        self.tier == self.logic.tier()
    }

    /// Count of tunable parameters, used by the excessive-parameters flag.
    pub fn tunable_parameter_count(&self) -> usize {
        self.parameters.len()
    }
}

// =============================================================================
// Strategy document
// =============================================================================

/// One-line plus full hypothesis statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub summary: String,
    pub detail: String,
}

/// Complete strategy record as persisted under `strategies/{state}/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDocument {
    pub id: StrategyId,
    pub name: String,
    pub created: DateTime<Utc>,
    pub state: StrategyState,
    /// Reason attached to the latest transition (gate failure, error cause).
    pub status_reason: Option<String>,

    pub source: StrategySource,
    pub lineage: Option<StrategyLineage>,
    pub hypothesis: Hypothesis,
    pub edge: Option<StrategyEdge>,
    pub edge_provenance: Option<EdgeProvenance>,
    pub quality: Option<IngestionQuality>,

    pub definition: StrategyDefinition,

    /// Cached definition hash; recomputed on load and must match.
    pub definition_hash: ContentHash,
}

impl StrategyDocument {
    /// Recompute the definition hash and compare with the cached value.
    pub fn hash_consistent(&self) -> bool {
        self.definition.definition_hash() == self.definition_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn fixture_definition() -> StrategyDefinition {
        StrategyDefinition {
            tier: Tier::Templated,
            logic: StrategyLogic::Template {
                archetype: Archetype::MomentumRotation,
            },
            universe: Universe {
                symbols: vec!["SPY".into(), "EFA".into(), "AGG".into()],
                base: None,
                criteria: vec![],
                point_in_time: true,
            },
            entry: Entry {
                kind: EntryKind::Technical,
                condition: "rank by 12-1 month momentum, hold top 1".into(),
                indicators: vec![IndicatorRef {
                    name: "roc".into(),
                    params: [("period".to_string(), 252.0)].into_iter().collect(),
                }],
                filters: vec![],
            },
            position: Position {
                sizing: SizingMethod::EqualWeight,
                sizing_params: BTreeMap::new(),
                max_leverage: 1.0,
                max_positions: Some(1),
                max_position_pct: Some(1.0),
            },
            exit: Exit {
                paths: vec![ExitPath {
                    name: "rotate".into(),
                    kind: ExitKind::SignalReversal,
                    params: BTreeMap::new(),
                    condition: Some("rank drops out of top 1".into()),
                }],
            },
            position_management: PositionManagement::default(),
            regimes: None,
            data_requirements: vec![DataRequirement {
                id: "us-equity-daily".into(),
                tier: DataTier::Native,
                fields: vec!["close".into(), "open".into()],
            }],
            parameters: [
                ("lookback_days".to_string(), 252.0),
                ("skip_days".to_string(), 21.0),
            ]
            .into_iter()
            .collect(),
            assumptions: vec!["monthly rebalance at close".into()],
            risks: vec!["momentum crash".into()],
        }
    }

    #[test]
    fn test_hash_stable_under_set_reordering() {
        let def = fixture_definition();
        let mut shuffled = def.clone();
        shuffled.universe.symbols.reverse();
        shuffled.data_requirements[0].fields.reverse();
        assert_eq!(def.definition_hash(), shuffled.definition_hash());
    }

    #[test]
    fn test_hash_moves_on_semantic_change() {
        let def = fixture_definition();
        let mut changed = def.clone();
        changed.parameters.insert("lookback_days".into(), 126.0);
        assert_ne!(def.definition_hash(), changed.definition_hash());
    }

    #[test]
    fn test_metadata_does_not_move_hash() {
        // The hash covers only the definition subtree by construction: two
        // documents differing in name/state share the definition hash.
        let def = fixture_definition();
        let h1 = def.definition_hash();
        let h2 = def.clone().definition_hash();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_tier_consistency() {
        let def = fixture_definition();
        assert!(def.tier_consistent());
        let mut bad = def;
        bad.tier = Tier::Custom;
        assert!(!bad.tier_consistent());
    }
}
