//! Workspace configuration (`research-kit.yaml`).
//!
//! Partial files deep-merge over defaults; the merged result is validated
//! before use so a bad threshold fails loudly at startup, not mid-pipeline.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use research_models::{Persona, ValidationGates};

/// Ingestion quality thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Minimum specificity score (0-8 scale).
    pub specificity_threshold: u8,
    /// Minimum trust score (0-100 scale).
    pub trust_threshold: u8,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            specificity_threshold: 4,
            trust_threshold: 50,
        }
    }
}

/// Trust score component ceilings. Must sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub economic_rationale: u8,
    pub out_of_sample: u8,
    pub implementation_realism: u8,
    pub source_credibility: u8,
    pub novelty: u8,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            economic_rationale: 30,
            out_of_sample: 25,
            implementation_realism: 20,
            source_credibility: 15,
            novelty: 10,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> u32 {
        self.economic_rationale as u32
            + self.out_of_sample as u32
            + self.implementation_realism as u32
            + self.source_credibility as u32
            + self.novelty as u32
    }
}

/// Verification engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub enabled: bool,
    /// Enabled checks; a strategy cannot proceed with any of these failing.
    pub checks: Vec<String>,
}

pub const VALID_CHECKS: &[&str] = &[
    "look_ahead_bias",
    "survivorship",
    "position_sizing",
    "data_availability",
    "parameter_sanity",
    "hardcoded_values",
];

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            checks: VALID_CHECKS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Walk-forward executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Number of non-overlapping windows.
    pub window_count: u32,
    /// Calendar years per window.
    pub window_span_years: u32,
    /// Concurrent window dispatches.
    pub parallelism: usize,
    /// Retries per window on backend timeout.
    pub max_retries: u32,
    /// Base backoff delay between retries, doubled per attempt.
    pub backoff_base_secs: u64,
    /// Per-dispatch deadline.
    pub dispatch_timeout_secs: u64,
    /// Validation fails outright when more windows than this error out.
    pub max_failed_windows: u32,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            window_count: 12,
            window_span_years: 3,
            parallelism: 4,
            max_retries: 3,
            backoff_base_secs: 2,
            dispatch_timeout_secs: 900,
            max_failed_windows: 3,
        }
    }
}

/// Persona orchestration settings.
///
/// The roster is typed against the closed persona set; an unrecognized
/// persona name in `research-kit.yaml` fails config load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Analysis personas dispatched in parallel.
    pub personas: Vec<Persona>,
    /// Minimum persona responses required for synthesis.
    pub quorum: usize,
    pub persona_timeout_secs: u64,
    /// Max accepted ideas per ideation run.
    pub max_ideas: usize,
    /// Token-bucket capacity for the LLM resource.
    pub rate_limit_per_minute: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            personas: Persona::ALL.to_vec(),
            quorum: 3,
            persona_timeout_secs: 120,
            max_ideas: 3,
            rate_limit_per_minute: 30,
        }
    }
}

/// Similarity metric weights and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    pub universe_weight: f64,
    pub entry_weight: f64,
    pub exit_weight: f64,
    pub sizing_weight: f64,
    pub duplicate_threshold: f64,
    pub variant_threshold: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            universe_weight: 0.30,
            entry_weight: 0.30,
            exit_weight: 0.25,
            sizing_weight: 0.15,
            duplicate_threshold: 0.95,
            variant_threshold: 0.70,
        }
    }
}

/// Complete workspace configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub gates: ValidationGates,
    pub ingestion: IngestionConfig,
    pub scoring: ScoringWeights,
    pub verification: VerificationConfig,
    pub walk_forward: WalkForwardConfig,
    pub synthesis: SynthesisConfig,
    pub similarity: SimilarityConfig,
    /// tracing filter directive for the file layer, e.g. "info".
    pub log_level: LogLevel,
}

/// Logging level for the rotating file layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl ResearchConfig {
    /// Load from a YAML file, deep-merging the file's values over defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let overlay: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("Invalid YAML in {:?}", path))?;
        let base = serde_yaml::to_value(ResearchConfig::default())
            .context("Failed to serialize default config")?;
        let merged = deep_merge(base, overlay);
        let config: ResearchConfig =
            serde_yaml::from_value(merged).with_context(|| format!("Invalid config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would silently corrupt scoring or gating.
    pub fn validate(&self) -> Result<()> {
        if self.scoring.total() != 100 {
            bail!(
                "scoring weights must sum to 100, got {}",
                self.scoring.total()
            );
        }
        if self.ingestion.specificity_threshold > 8 {
            bail!("specificity_threshold must be 0-8");
        }
        if self.ingestion.trust_threshold > 100 {
            bail!("trust_threshold must be 0-100");
        }
        for check in &self.verification.checks {
            if !VALID_CHECKS.contains(&check.as_str()) {
                bail!(
                    "unknown verification check '{}'; valid: {}",
                    check,
                    VALID_CHECKS.join(", ")
                );
            }
        }
        if !(0.0..=1.0).contains(&self.gates.min_consistency) {
            bail!("min_consistency must be within 0-1");
        }
        if !(0.0..=1.0).contains(&self.gates.adjusted_alpha) {
            bail!("adjusted_alpha must be within 0-1");
        }
        if self.walk_forward.window_count == 0 || self.walk_forward.window_span_years == 0 {
            bail!("walk_forward windows must be non-zero");
        }
        if self.synthesis.quorum == 0 || self.synthesis.quorum > self.synthesis.personas.len() {
            bail!(
                "quorum {} out of range for {} personas",
                self.synthesis.quorum,
                self.synthesis.personas.len()
            );
        }
        let sim = &self.similarity;
        let weight_sum =
            sim.universe_weight + sim.entry_weight + sim.exit_weight + sim.sizing_weight;
        if (weight_sum - 1.0).abs() > 1e-9 {
            bail!("similarity weights must sum to 1.0, got {weight_sum}");
        }
        if sim.duplicate_threshold < sim.variant_threshold {
            bail!("duplicate_threshold must be >= variant_threshold");
        }
        Ok(())
    }
}

/// Recursive merge of YAML mappings; scalars and sequences override.
fn deep_merge(base: serde_yaml::Value, overlay: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value;
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_validate() {
        ResearchConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("research-kit.yaml");
        std::fs::write(&path, "gates:\n  min_sharpe: 0.8\n").unwrap();
        let config = ResearchConfig::load(&path).unwrap();
        assert_eq!(config.gates.min_sharpe, 0.8);
        // Untouched sections keep defaults.
        assert_eq!(config.gates.min_trades, 30);
        assert_eq!(config.walk_forward.window_count, 12);
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut config = ResearchConfig::default();
        config.scoring.novelty = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_check_rejected() {
        let mut config = ResearchConfig::default();
        config.verification.checks.push("astrology".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quorum_bounds() {
        let mut config = ResearchConfig::default();
        config.synthesis.quorum = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_persona_fails_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("research-kit.yaml");
        std::fs::write(
            &path,
            "synthesis:\n  personas: [momentum-trader, astrologer]\n",
        )
        .unwrap();
        assert!(ResearchConfig::load(&path).is_err());
    }
}
