//! Extracted strategy drafts awaiting quality filtering.
//!
//! A draft is the structured output of source extraction: partial strategy
//! fields plus the evidence the source offers. Drafts arrive as YAML files
//! in the workspace inbox; the raw source text rides along for phrase-level
//! red-flag scanning.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use research_models::{
    sha256_hex, ContentHash, Hypothesis, SourceCredibility, StrategyDefinition,
};

/// Evidence the source offers about testing and realism.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftEvidence {
    /// Stated backtest period, e.g. "1927-2012".
    pub backtest_period: Option<String>,
    /// Backtest start date if stated precisely.
    pub backtest_start: Option<NaiveDate>,
    /// Source reports out-of-sample results.
    pub out_of_sample: bool,
    /// Number of distinct out-of-sample periods or replications.
    pub oos_periods: u32,
    pub transaction_costs_discussed: bool,
    pub drawdown_discussed: bool,
    /// Capacity or liquidity realism addressed.
    pub capacity_discussed: bool,
    /// Markets/geographies the source tested in.
    pub markets: Vec<String>,
    /// Regimes the evidence covers ("bull", "bear", ...).
    pub regimes_covered: Vec<String>,
    /// Independent observations (trades or periods) behind the claim.
    pub sample_size: Option<u32>,
    /// Source provides code or pseudocode.
    pub code_provided: bool,
    /// High-frequency context; relaxes the Sharpe ceiling flag.
    pub is_hft: bool,
}

/// An extracted strategy draft plus source metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDraft {
    pub name: String,
    /// Where the draft came from (title, citation, filename).
    pub reference: String,
    pub url: Option<String>,
    /// Key excerpt describing the strategy.
    pub excerpt: String,
    pub credibility: Option<SourceCredibility>,
    pub hypothesis: Hypothesis,
    /// Economic rationale as stated by the source, if any.
    pub rationale: Option<String>,
    /// Structured definition; absent when the source is too vague.
    pub definition: Option<StrategyDefinition>,
    #[serde(default)]
    pub evidence: DraftEvidence,
    /// Full source text for phrase-level scanning.
    #[serde(default)]
    pub raw_text: String,
}

impl StrategyDraft {
    /// Parse a draft from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse strategy draft")
    }

    /// Load a draft from an inbox file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read draft {:?}", path))?;
        Self::from_yaml(&text)
    }

    /// Ingestion idempotence key: hash of the raw source text when present,
    /// otherwise of the excerpt.
    pub fn source_hash(&self) -> ContentHash {
        if self.raw_text.is_empty() {
            sha256_hex(self.excerpt.as_bytes())
        } else {
            sha256_hex(self.raw_text.as_bytes())
        }
    }

    /// All prose the draft carries, lowercased, for keyword scans.
    pub fn searchable_text(&self) -> String {
        let mut text = String::new();
        for part in [
            &self.excerpt,
            &self.hypothesis.summary,
            &self.hypothesis.detail,
            &self.raw_text,
        ] {
            text.push_str(part);
            text.push('\n');
        }
        if let Some(rationale) = &self.rationale {
            text.push_str(rationale);
        }
        text.to_lowercase()
    }
}
