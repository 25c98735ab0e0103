//! Append-only learning records distilled from validations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::StrategyId;

/// Analytical dimension an insight is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightDimension {
    EdgeMechanism,
    RegimeSensitivity,
    RiskProfile,
    Implementation,
    DataQuality,
    PortfolioFit,
}

/// One structured insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub dimension: InsightDimension,
    pub statement: String,
    /// Persona that produced the insight, if any.
    pub attributed_to: Option<String>,
}

/// Append-only learning record linking one or more validations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRecord {
    pub strategy_id: StrategyId,
    /// Definition hashes of the validations this learning draws on.
    pub validation_refs: Vec<String>,
    pub created: DateTime<Utc>,
    /// Factors the strategy aligns with, for the learning index.
    pub factors: Vec<String>,
    pub insights: Vec<Insight>,
}
